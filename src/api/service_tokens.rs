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

//! Service tokens and their permissions (`v3 service-tokens/`)

use serde::{Deserialize, Serialize};

use crate::client::{state_active, DbtCloudClient, Result};

/// Permission sets a service token can be granted
pub const PERMISSION_SETS: &[&str] = &[
    "account_admin",
    "admin",
    "account_viewer",
    "analyst",
    "billing_admin",
    "database_admin",
    "developer",
    "git_admin",
    "job_admin",
    "job_runner",
    "job_viewer",
    "manage_marketplace_apps",
    "member",
    "metadata_only",
    "owner",
    "project_creator",
    "read_only",
    "security_admin",
    "semantic_layer_only",
    "stakeholder",
    "team_admin",
    "webhooks_only",
];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub account_id: i64,
    pub name: String,
    #[serde(default, skip_serializing)]
    pub uid: Option<String>,
    #[serde(default = "state_active")]
    pub state: i64,
    /// Only returned when the token is created
    #[serde(default, skip_serializing)]
    pub token_string: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ServiceTokenPermission {
    pub permission_set: String,
    #[serde(default)]
    pub all_projects: bool,
    #[serde(default)]
    pub project_id: Option<i64>,
}

#[derive(Serialize)]
struct PermissionGrant<'a> {
    account_id: i64,
    service_token_id: i64,
    #[serde(flatten)]
    permission: &'a ServiceTokenPermission,
}

impl DbtCloudClient {
    fn service_token_url(&self, token_id: i64) -> String {
        self.v3_url(&format!("service-tokens/{token_id}/"))
    }

    fn service_token_permissions_url(&self, token_id: i64) -> String {
        self.v3_url(&format!("service-tokens/{token_id}/permissions/"))
    }

    pub async fn create_service_token(&self, token: &ServiceToken) -> Result<ServiceToken> {
        self.post(&self.v3_url("service-tokens/"), token).await
    }

    /// Get a token and its permissions, both fetched concurrently
    pub async fn get_service_token(
        &self,
        token_id: i64,
    ) -> Result<Option<(ServiceToken, Vec<ServiceTokenPermission>)>> {
        let token_url = self.service_token_url(token_id);
        let permissions_url = self.service_token_permissions_url(token_id);
        let (token, permissions) = futures::try_join!(
            self.get_optional::<ServiceToken>(&token_url),
            self.get_optional::<Vec<ServiceTokenPermission>>(&permissions_url),
        )?;
        Ok(token.map(|token| (token, permissions.unwrap_or_default())))
    }

    pub async fn update_service_token(
        &self,
        token_id: i64,
        token: &ServiceToken,
    ) -> Result<ServiceToken> {
        self.post(&self.service_token_url(token_id), token).await
    }

    /// Replace the whole permission set of a token
    pub async fn set_service_token_permissions(
        &self,
        token_id: i64,
        permissions: &[ServiceTokenPermission],
    ) -> Result<Vec<ServiceTokenPermission>> {
        let grants = permissions
            .iter()
            .map(|permission| PermissionGrant {
                account_id: self.account_id(),
                service_token_id: token_id,
                permission,
            })
            .collect::<Vec<_>>();
        self.post(&self.service_token_permissions_url(token_id), &grants)
            .await
    }

    pub async fn delete_service_token(&self, token_id: i64) -> Result<()> {
        self.delete(&self.service_token_url(token_id)).await
    }
}
