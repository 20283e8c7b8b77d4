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

use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::map;
use tf_provider::schema::{AttributeConstraint, AttributeType, Schema};
use tf_provider::value::{Value, ValueBool, ValueNumber, ValueSet, ValueString};
use tf_provider::{AttributePath, Diagnostics};

use crate::api::service_tokens::{ServiceToken, ServiceTokenPermission, PERMISSION_SETS};
use crate::client::{DbtCloudClient, STATE_ACTIVE};
use crate::id;
use crate::utils::{
    attribute, bool_or, computed, default_to, non_empty_value, opt_num, req_str, schema,
    sensitive, str_value, validate_one_of,
};

use super::ApiResource;

const STATE_INACTIVE: i64 = 2;

#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionState<'a> {
    pub permission_set: ValueString<'a>,
    pub all_projects: ValueBool,
    pub project_id: ValueNumber,
}

impl<'a> PermissionState<'a> {
    fn to_api(&self) -> Result<ServiceTokenPermission> {
        let all_projects = bool_or(&self.all_projects, false);
        Ok(ServiceTokenPermission {
            permission_set: req_str(&self.permission_set, "permission_set")?,
            all_projects,
            project_id: if all_projects {
                None
            } else {
                opt_num(&self.project_id)
            },
        })
    }

    fn from_api(permission: ServiceTokenPermission) -> Self {
        Self {
            permission_set: str_value(permission.permission_set),
            all_projects: Value::Value(permission.all_projects),
            project_id: match permission.project_id {
                Some(project_id) if !permission.all_projects => Value::Value(project_id),
                _ => Value::Null,
            },
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ServiceTokenState<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub state: ValueNumber,
    pub uid: ValueString<'a>,
    pub token_string: ValueString<'a>,
    pub service_token_permissions: ValueSet<Value<PermissionState<'a>>>,
}

impl<'a> ServiceTokenState<'a> {
    fn token_id(&self) -> Result<i64> {
        let [token_id] = id::decode(&req_str(&self.id, "id")?, "service_token_id")?;
        Ok(token_id)
    }

    fn to_api(&self, account_id: i64) -> Result<ServiceToken> {
        Ok(ServiceToken {
            account_id,
            name: req_str(&self.name, "name")?,
            state: opt_num(&self.state).unwrap_or(STATE_ACTIVE),
            ..Default::default()
        })
    }

    fn permissions(&self) -> Result<Vec<ServiceTokenPermission>> {
        self.service_token_permissions
            .iter()
            .flatten()
            .filter_map(Value::as_ref_option)
            .map(PermissionState::to_api)
            .collect()
    }

    fn from_api(
        token: ServiceToken,
        permissions: Vec<ServiceTokenPermission>,
        prior: &Self,
    ) -> Result<Self> {
        let token_id = token
            .id
            .ok_or_else(|| anyhow!("dbt Cloud returned a service token without id"))?;
        let token_string = match token.token_string {
            Some(token_string) if !token_string.is_empty() => str_value(token_string),
            _ => match &prior.token_string {
                Value::Unknown => Value::Null,
                token_string => token_string.clone(),
            },
        };
        let service_token_permissions = if permissions.is_empty()
            && !prior.service_token_permissions.is_value()
        {
            Value::Null
        } else {
            Value::Value(
                permissions
                    .into_iter()
                    .map(|permission| Value::Value(PermissionState::from_api(permission)))
                    .collect::<BTreeSet<_>>(),
            )
        };
        Ok(Self {
            id: str_value(token_id.to_string()),
            name: str_value(token.name),
            state: Value::Value(token.state),
            uid: non_empty_value(token.uid),
            token_string,
            service_token_permissions,
        })
    }
}

#[derive(Debug, Default)]
pub struct ServiceTokenResource;

#[async_trait]
impl ApiResource for ServiceTokenResource {
    const NAME: &'static str = "service_token";
    type State<'a> = ServiceTokenState<'a>;

    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};
        schema(
            "Service token of the dbt Cloud account.\n\n\
             The token itself is only known right after creation.",
            map! {
                "id" => attribute(AttributeType::String, Computed, "ID of the service token"),
                "name" => attribute(AttributeType::String, Required, "Name of the service token"),
                "state" => attribute(AttributeType::Number, OptionalComputed, "1 for active (default), 2 for inactive"),
                "uid" => attribute(AttributeType::String, Computed, "Public part of the token"),
                "token_string" => sensitive(attribute(AttributeType::String, Computed, "Token value")),
                "service_token_permissions" => attribute(
                    AttributeType::AttributeSet(map! {
                        "permission_set" => attribute(AttributeType::String, Required, "Permission set granted"),
                        "all_projects" => attribute(AttributeType::Bool, Required, "Grant on every project"),
                        "project_id" => attribute(
                            AttributeType::Number,
                            Optional,
                            "Project the grant is limited to, unset with `all_projects`",
                        ),
                    }),
                    Optional,
                    "Permissions of the token",
                ),
            },
        )
    }

    fn validate(&self, diags: &mut Diagnostics, config: &ServiceTokenState<'_>) {
        if let Value::Value(state) = config.state {
            if state != STATE_ACTIVE && state != STATE_INACTIVE {
                diags.error(
                    "Invalid state",
                    format!("state must be {STATE_ACTIVE} or {STATE_INACTIVE}, not {state}"),
                    AttributePath::new("state"),
                );
            }
        }

        let permissions = config
            .service_token_permissions
            .iter()
            .flatten()
            .filter_map(Value::as_ref_option);
        for permission in permissions {
            let path = AttributePath::new("service_token_permissions");
            validate_one_of(
                diags,
                path.clone().attribute("permission_set"),
                &permission.permission_set,
                PERMISSION_SETS,
            );
            if permission.all_projects == Value::Value(true) && permission.project_id.is_value() {
                diags.error(
                    "Unexpected `project_id`",
                    "`project_id` cannot be set when `all_projects` is true",
                    path.attribute("project_id"),
                );
            }
        }
    }

    fn plan<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior: Option<&ServiceTokenState<'a>>,
        state: &mut ServiceTokenState<'a>,
    ) {
        computed(&mut state.id);
        computed(&mut state.uid);
        computed(&mut state.token_string);
        default_to(&mut state.state, STATE_ACTIVE);
    }

    async fn create<'a>(
        &self,
        client: &DbtCloudClient,
        planned: &ServiceTokenState<'a>,
    ) -> Result<ServiceTokenState<'a>> {
        let permissions = planned.permissions()?;
        let created = client
            .create_service_token(&planned.to_api(client.account_id())?)
            .await?;
        let token_id = created
            .id
            .ok_or_else(|| anyhow!("dbt Cloud returned a service token without id"))?;
        let permissions = if permissions.is_empty() {
            permissions
        } else {
            client
                .set_service_token_permissions(token_id, &permissions)
                .await?
        };
        ServiceTokenState::from_api(created, permissions, planned)
    }

    async fn read<'a>(
        &self,
        client: &DbtCloudClient,
        state: &ServiceTokenState<'a>,
    ) -> Result<Option<ServiceTokenState<'a>>> {
        client
            .get_service_token(state.token_id()?)
            .await?
            .map(|(token, permissions)| ServiceTokenState::from_api(token, permissions, state))
            .transpose()
    }

    async fn update<'a>(
        &self,
        client: &DbtCloudClient,
        prior: &ServiceTokenState<'a>,
        planned: &ServiceTokenState<'a>,
    ) -> Result<ServiceTokenState<'a>> {
        let token_id = prior.token_id()?;
        let token = ServiceToken {
            id: Some(token_id),
            ..planned.to_api(client.account_id())?
        };
        let updated = client.update_service_token(token_id, &token).await?;

        let permissions = planned.permissions()?;
        let permissions = if planned.service_token_permissions == prior.service_token_permissions {
            client
                .get_service_token(token_id)
                .await?
                .map(|(_, permissions)| permissions)
                .unwrap_or(permissions)
        } else {
            client
                .set_service_token_permissions(token_id, &permissions)
                .await?
        };
        ServiceTokenState::from_api(updated, permissions, planned)
    }

    async fn delete<'a>(
        &self,
        client: &DbtCloudClient,
        state: &ServiceTokenState<'a>,
    ) -> Result<()> {
        Ok(client.delete_service_token(state.token_id()?).await?)
    }

    fn import<'a>(&self, id: &str) -> Result<ServiceTokenState<'a>> {
        let [token_id] = id::decode(id, "service_token_id")?;
        Ok(ServiceTokenState {
            id: str_value(token_id.to_string()),
            ..Default::default()
        })
    }
}
