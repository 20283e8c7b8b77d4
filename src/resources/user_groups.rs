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

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::map;
use tf_provider::schema::{AttributeConstraint, AttributeType, Schema};
use tf_provider::value::{Value, ValueNumber, ValueSet, ValueString};
use tf_provider::{AttributePath, Diagnostics};

use crate::client::DbtCloudClient;
use crate::id;
use crate::utils::{
    attribute, computed, num_set, num_set_value, number_set, replace_on_change, req_num, req_str,
    schema, str_value,
};

use super::ApiResource;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct UserGroupsState<'a> {
    pub id: ValueString<'a>,
    pub user_id: ValueNumber,
    pub group_ids: ValueSet<ValueNumber>,
}

impl<'a> UserGroupsState<'a> {
    fn user_id(&self) -> Result<i64> {
        let [user_id] = id::decode(&req_str(&self.id, "id")?, "user_id")?;
        Ok(user_id)
    }

    fn new(user_id: i64, group_ids: Vec<i64>) -> Self {
        Self {
            id: str_value(user_id.to_string()),
            user_id: Value::Value(user_id),
            group_ids: num_set_value(group_ids),
        }
    }
}

/// Groups of a user in the account
///
/// The resource owns the full membership: groups not listed are removed, and
/// destroying it leaves the user without any group.
#[derive(Debug, Default)]
pub struct UserGroupsResource;

#[async_trait]
impl ApiResource for UserGroupsResource {
    const NAME: &'static str = "user_groups";
    type State<'a> = UserGroupsState<'a>;

    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Required};
        schema(
            "Group membership of a dbt Cloud user",
            map! {
                "id" => attribute(AttributeType::String, Computed, "ID of the user"),
                "user_id" => attribute(AttributeType::Number, Required, "User to assign"),
                "group_ids" => attribute(number_set(), Required, "Groups of the user"),
            },
        )
    }

    fn plan<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior: Option<&UserGroupsState<'a>>,
        state: &mut UserGroupsState<'a>,
    ) {
        computed(&mut state.id);
    }

    fn requires_replace(
        &self,
        prior: &UserGroupsState<'_>,
        planned: &UserGroupsState<'_>,
    ) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_on_change(&mut paths, "user_id", &prior.user_id, &planned.user_id);
        paths
    }

    async fn create<'a>(
        &self,
        client: &DbtCloudClient,
        planned: &UserGroupsState<'a>,
    ) -> Result<UserGroupsState<'a>> {
        let user_id = req_num(&planned.user_id, "user_id")?;
        let group_ids = num_set(&planned.group_ids);
        client.assign_user_groups(user_id, &group_ids).await?;
        Ok(UserGroupsState::new(user_id, group_ids))
    }

    async fn read<'a>(
        &self,
        client: &DbtCloudClient,
        state: &UserGroupsState<'a>,
    ) -> Result<Option<UserGroupsState<'a>>> {
        let user_id = state.user_id()?;
        Ok(client
            .get_user_groups(user_id)
            .await?
            .map(|group_ids| UserGroupsState::new(user_id, group_ids)))
    }

    async fn update<'a>(
        &self,
        client: &DbtCloudClient,
        _prior: &UserGroupsState<'a>,
        planned: &UserGroupsState<'a>,
    ) -> Result<UserGroupsState<'a>> {
        self.create(client, planned).await
    }

    async fn delete<'a>(
        &self,
        client: &DbtCloudClient,
        state: &UserGroupsState<'a>,
    ) -> Result<()> {
        Ok(client.assign_user_groups(state.user_id()?, &[]).await?)
    }

    fn import<'a>(&self, id: &str) -> Result<UserGroupsState<'a>> {
        let [user_id] = id::decode(id, "user_id")?;
        Ok(UserGroupsState {
            id: str_value(user_id.to_string()),
            user_id: Value::Value(user_id),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_client;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn create_assigns_exact_set() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/accounts/1/assign-groups/"))
            .and(body_json(json!({"user_id": 42, "desired_group_ids": [7, 8]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let planned = UserGroupsState {
            user_id: Value::Value(42),
            group_ids: num_set_value([8, 7]),
            ..Default::default()
        };
        let state = UserGroupsResource.create(&client, &planned).await.unwrap();
        assert_eq!(state.id, str_value("42"));
        assert_eq!(state.group_ids, num_set_value([7, 8]));
    }

    #[tokio::test]
    async fn delete_removes_every_group() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/accounts/1/assign-groups/"))
            .and(body_json(json!({"user_id": 42, "desired_group_ids": []})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let state = UserGroupsResource.import("42").unwrap();
        UserGroupsResource.delete(&client, &state).await.unwrap();
    }

    #[tokio::test]
    async fn missing_user_is_gone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/accounts/1/users/42/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let state = UserGroupsResource.import("42").unwrap();
        assert!(UserGroupsResource.read(&client, &state).await.unwrap().is_none());
    }

    #[test]
    fn changing_user_forces_new() {
        let prior = UserGroupsState::new(42, vec![7]);
        let planned = UserGroupsState::new(43, vec![7]);
        assert_eq!(
            UserGroupsResource.requires_replace(&prior, &planned),
            vec![AttributePath::new("user_id")]
        );
    }
}
