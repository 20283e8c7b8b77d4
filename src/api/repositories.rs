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

//! Repository endpoints (`v3 projects/{project_id}/repositories/`)

use serde::{Deserialize, Serialize};

use crate::client::{state_active, DbtCloudClient, Result, STATE_DELETED};

pub const CLONE_DEPLOY_KEY: &str = "deploy_key";
pub const CLONE_GITHUB_APP: &str = "github_app";
pub const CLONE_DEPLOY_TOKEN: &str = "deploy_token";
pub const CLONE_AZURE_APP: &str = "azure_active_directory_app";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub account_id: i64,
    pub project_id: i64,
    pub remote_url: String,
    #[serde(default)]
    pub git_clone_strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_installation_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitlab_project_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_active_directory_project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_active_directory_repository_id: Option<String>,
    #[serde(default)]
    pub azure_bypass_webhook_registration_failure: bool,
    #[serde(default)]
    pub pull_request_url_template: Option<String>,
    #[serde(default, skip_serializing)]
    pub repository_credentials_id: Option<i64>,
    #[serde(default, skip_serializing)]
    pub deploy_key: Option<DeployKey>,
    #[serde(default = "state_active")]
    pub state: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeployKey {
    #[serde(default)]
    pub public_key: String,
}

impl DbtCloudClient {
    fn repository_url(&self, project_id: i64, repository_id: i64) -> String {
        self.v3_url(&format!("projects/{project_id}/repositories/{repository_id}/"))
    }

    pub async fn create_repository(&self, repository: &Repository) -> Result<Repository> {
        let url = self.v3_url(&format!("projects/{}/repositories/", repository.project_id));
        self.post(&url, repository).await
    }

    /// Get a repository along with its deploy key
    pub async fn get_repository(
        &self,
        project_id: i64,
        repository_id: i64,
    ) -> Result<Option<Repository>> {
        Ok(self
            .get_optional_with_query::<Repository>(
                &self.repository_url(project_id, repository_id),
                &[("include_related", "[\"deploy_key\"]")],
            )
            .await?
            .filter(|repository| repository.state != STATE_DELETED))
    }

    pub async fn update_repository(
        &self,
        repository_id: i64,
        repository: &Repository,
    ) -> Result<Repository> {
        let url = self.repository_url(repository.project_id, repository_id);
        self.post(&url, repository).await
    }

    pub async fn delete_repository(&self, project_id: i64, repository_id: i64) -> Result<()> {
        self.delete(&self.repository_url(project_id, repository_id))
            .await
    }
}
