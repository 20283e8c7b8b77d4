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

//! Environment endpoints (`v3 projects/{project_id}/environments/`)

use serde::{Deserialize, Serialize};

use crate::client::{state_active, DbtCloudClient, Result, STATE_DELETED};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub account_id: i64,
    pub project_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub env_type: String,
    #[serde(default)]
    pub dbt_version: Option<String>,
    #[serde(default)]
    pub deployment_type: Option<String>,
    #[serde(default)]
    pub use_custom_branch: bool,
    #[serde(default)]
    pub custom_branch: Option<String>,
    #[serde(default)]
    pub credentials_id: Option<i64>,
    #[serde(default)]
    pub connection_id: Option<i64>,
    #[serde(default)]
    pub enable_model_query_history: bool,
    #[serde(default = "state_active")]
    pub state: i64,
}

impl DbtCloudClient {
    fn environment_url(&self, project_id: i64, environment_id: i64) -> String {
        self.v3_url(&format!(
            "projects/{project_id}/environments/{environment_id}/"
        ))
    }

    pub async fn create_environment(&self, environment: &Environment) -> Result<Environment> {
        let url = self.v3_url(&format!("projects/{}/environments/", environment.project_id));
        self.post(&url, environment).await
    }

    pub async fn get_environment(
        &self,
        project_id: i64,
        environment_id: i64,
    ) -> Result<Option<Environment>> {
        Ok(self
            .get_optional::<Environment>(&self.environment_url(project_id, environment_id))
            .await?
            .filter(|environment| environment.state != STATE_DELETED))
    }

    pub async fn update_environment(
        &self,
        environment_id: i64,
        environment: &Environment,
    ) -> Result<Environment> {
        let url = self.environment_url(environment.project_id, environment_id);
        self.post(&url, environment).await
    }

    pub async fn delete_environment(&self, project_id: i64, environment_id: i64) -> Result<()> {
        self.soft_delete(&self.environment_url(project_id, environment_id))
            .await
    }
}
