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

//! Project endpoints (`v3 projects/`)

use serde::{Deserialize, Serialize};

use crate::client::{state_active, DbtCloudClient, Result, STATE_DELETED};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub account_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dbt_project_subdirectory: Option<String>,
    #[serde(default)]
    pub connection_id: Option<i64>,
    #[serde(default)]
    pub repository_id: Option<i64>,
    #[serde(default = "state_active")]
    pub state: i64,
}

impl DbtCloudClient {
    fn project_url(&self, project_id: i64) -> String {
        self.v3_url(&format!("projects/{project_id}/"))
    }

    pub async fn create_project(&self, project: &Project) -> Result<Project> {
        self.post(&self.v3_url("projects/"), project).await
    }

    /// Get a live project, `None` if it does not exist or has been deleted
    pub async fn get_project(&self, project_id: i64) -> Result<Option<Project>> {
        Ok(self
            .get_optional::<Project>(&self.project_url(project_id))
            .await?
            .filter(|project| project.state != STATE_DELETED))
    }

    pub async fn update_project(&self, project_id: i64, project: &Project) -> Result<Project> {
        self.post(&self.project_url(project_id), project).await
    }

    pub async fn delete_project(&self, project_id: i64) -> Result<()> {
        self.soft_delete(&self.project_url(project_id)).await
    }
}
