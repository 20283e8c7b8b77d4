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

//! Users and their group membership

use serde::{Deserialize, Serialize};

use crate::client::{DbtCloudClient, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub permissions: Vec<UserPermission>,
}

/// Membership of a user in one account
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPermission {
    pub account_id: i64,
    #[serde(default)]
    pub groups: Vec<UserGroup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserGroup {
    pub id: i64,
}

#[derive(Serialize)]
struct AssignGroups<'a> {
    user_id: i64,
    desired_group_ids: &'a [i64],
}

impl DbtCloudClient {
    /// Groups of a user in the configured account, `None` if the user does not exist
    pub async fn get_user_groups(&self, user_id: i64) -> Result<Option<Vec<i64>>> {
        let url = self.v3_url(&format!("users/{user_id}/"));
        let Some(user) = self.get_optional::<User>(&url).await? else {
            return Ok(None);
        };
        let account_id = self.account_id();
        Ok(Some(
            user.permissions
                .into_iter()
                .filter(|permission| permission.account_id == account_id)
                .flat_map(|permission| permission.groups)
                .map(|group| group.id)
                .collect(),
        ))
    }

    /// Make `group_ids` the exact set of groups of the user
    pub async fn assign_user_groups(&self, user_id: i64, group_ids: &[i64]) -> Result<()> {
        let body = AssignGroups {
            user_id,
            desired_group_ids: group_ids,
        };
        self.post::<_, serde_json::Value>(&self.v3_url("assign-groups/"), &body)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::client::test_client;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn groups_of_other_accounts_are_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/accounts/1/users/42/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "id": 42,
                    "permissions": [
                        {"account_id": 1, "groups": [{"id": 7}, {"id": 8}]},
                        {"account_id": 2, "groups": [{"id": 99}]},
                    ]
                }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        assert_eq!(client.get_user_groups(42).await.unwrap(), Some(vec![7, 8]));
    }

    #[tokio::test]
    async fn assign_posts_desired_groups() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/accounts/1/assign-groups/"))
            .and(body_json(json!({"user_id": 42, "desired_group_ids": [7]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client.assign_user_groups(42, &[7]).await.unwrap();
    }
}
