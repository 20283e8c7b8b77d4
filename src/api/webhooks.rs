// This file is part of the terraform-provider-dbtcloud project
//
// Copyright (C) ANEO, 2024-2024. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License")
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Webhook subscriptions (`v3 webhooks/`)

use serde::{Deserialize, Serialize};

use crate::client::{DbtCloudClient, Result};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Webhook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_identifier: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub client_url: String,
    #[serde(default)]
    pub event_types: Vec<String>,
    /// Sent and received as strings
    #[serde(default, with = "string_ids")]
    pub job_ids: Vec<i64>,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing)]
    pub hmac_secret: Option<String>,
    /// Last status code of the client URL, a string or a number
    #[serde(default, skip_serializing)]
    pub http_status_code: Option<serde_json::Value>,
}

impl Webhook {
    pub fn http_status_code(&self) -> Option<String> {
        match self.http_status_code.as_ref()? {
            serde_json::Value::String(code) => Some(code.clone()),
            serde_json::Value::Number(code) => Some(code.to_string()),
            _ => None,
        }
    }
}

mod string_ids {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ids: &[i64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(ids.iter().map(ToString::to_string))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<i64>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Id {
            Number(i64),
            String(String),
        }

        Option::<Vec<Id>>::deserialize(deserializer)?
            .unwrap_or_default()
            .into_iter()
            .map(|id| match id {
                Id::Number(id) => Ok(id),
                Id::String(id) => id.parse().map_err(serde::de::Error::custom),
            })
            .collect()
    }
}

impl DbtCloudClient {
    fn webhook_url(&self, webhook_id: &str) -> String {
        self.v3_url(&format!("webhooks/subscription/{webhook_id}"))
    }

    pub async fn create_webhook(&self, webhook: &Webhook) -> Result<Webhook> {
        self.post(&self.v3_url("webhooks/subscriptions"), webhook)
            .await
    }

    pub async fn get_webhook(&self, webhook_id: &str) -> Result<Option<Webhook>> {
        self.get_optional(&self.webhook_url(webhook_id)).await
    }

    pub async fn update_webhook(&self, webhook_id: &str, webhook: &Webhook) -> Result<Webhook> {
        self.put(&self.webhook_url(webhook_id), webhook).await
    }

    pub async fn delete_webhook(&self, webhook_id: &str) -> Result<()> {
        self.delete(&self.webhook_url(webhook_id)).await
    }
}
