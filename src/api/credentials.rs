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

//! Credential endpoints (`v3 projects/{project_id}/credentials/`)
//!
//! All credential kinds share one payload; fields that do not apply to a
//! kind are left out of the request.

use serde::{Deserialize, Serialize};

use crate::client::{state_active, DbtCloudClient, Result, STATE_DELETED};

use super::AdapterFields;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub account_id: i64,
    pub project_id: i64,
    #[serde(rename = "type")]
    pub credential_type: String,
    #[serde(default = "state_active")]
    pub state: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<i64>,

    // snowflake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_passphrase: Option<String>,

    // postgres and redshift
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    // legacy adapters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_details: Option<AdapterFields>,
}

impl DbtCloudClient {
    fn credential_url(&self, project_id: i64, credential_id: i64) -> String {
        self.v3_url(&format!("projects/{project_id}/credentials/{credential_id}/"))
    }

    pub async fn create_credential(&self, credential: &Credential) -> Result<Credential> {
        let url = self.v3_url(&format!("projects/{}/credentials/", credential.project_id));
        self.post(&url, credential).await
    }

    pub async fn get_credential(
        &self,
        project_id: i64,
        credential_id: i64,
    ) -> Result<Option<Credential>> {
        Ok(self
            .get_optional::<Credential>(&self.credential_url(project_id, credential_id))
            .await?
            .filter(|credential| credential.state != STATE_DELETED))
    }

    pub async fn update_credential(
        &self,
        credential_id: i64,
        credential: &Credential,
    ) -> Result<Credential> {
        let url = self.credential_url(credential.project_id, credential_id);
        self.post(&url, credential).await
    }

    pub async fn delete_credential(&self, project_id: i64, credential_id: i64) -> Result<()> {
        self.soft_delete(&self.credential_url(project_id, credential_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unused_fields_are_not_sent() {
        let credential = Credential {
            project_id: 4,
            credential_type: "postgres".into(),
            state: 1,
            threads: Some(4),
            username: Some("dbt".into()),
            default_schema: Some("analytics".into()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&credential).unwrap(),
            json!({
                "account_id": 0,
                "project_id": 4,
                "type": "postgres",
                "state": 1,
                "threads": 4,
                "username": "dbt",
                "default_schema": "analytics",
            })
        );
    }
}
