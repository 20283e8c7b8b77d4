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

//! Wire models of the dbt Cloud API and the client methods that use them

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod connections;
pub mod credentials;
pub mod environments;
pub mod jobs;
pub mod projects;
pub mod repositories;
pub mod service_tokens;
pub mod users;
pub mod webhooks;

/// Key/value fields of a legacy adapter connection or credential
///
/// Adapters describe their settings as `{"fields": {"<name>": {"value": ...}}}`
/// along with the order in which the UI displays them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdapterFields {
    #[serde(default)]
    pub fields: BTreeMap<String, AdapterField>,
    #[serde(default)]
    pub field_order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdapterField {
    #[serde(default)]
    pub value: serde_json::Value,
}

impl AdapterFields {
    pub fn insert(&mut self, name: &str, value: impl Into<serde_json::Value>) {
        if !self.field_order.iter().any(|field| field == name) {
            self.field_order.push(name.to_owned());
        }
        self.fields.insert(
            name.to_owned(),
            AdapterField {
                value: value.into(),
            },
        );
    }

    pub fn insert_opt<T: Into<serde_json::Value>>(&mut self, name: &str, value: Option<T>) {
        if let Some(value) = value {
            self.insert(name, value);
        }
    }

    /// Non-empty string value of a field
    pub fn str(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)?
            .value
            .as_str()
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    }

    /// Integer value of a field, some adapters send numbers as strings
    pub fn num(&self, name: &str) -> Option<i64> {
        let value = &self.fields.get(name)?.value;
        value
            .as_i64()
            .or_else(|| value.as_str()?.trim().parse().ok())
    }
}
