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

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::map;
use tf_provider::schema::{AttributeConstraint, AttributeType, Schema};
use tf_provider::value::{Value, ValueBool, ValueNumber, ValueString};
use tf_provider::{AttributePath, Diagnostics};

use crate::api::environments::Environment;
use crate::client::{DbtCloudClient, STATE_ACTIVE};
use crate::id;
use crate::utils::{
    attribute, bool_or, computed, default_to, non_empty_value, opt_num, opt_str, replace_on_change,
    req_num, req_str, schema, str_value, validate_conflicts_if, validate_one_of,
    validate_required_if,
};

use super::{ApiDataSource, ApiResource};

pub const ENVIRONMENT_TYPES: &[&str] = &["development", "deployment"];
pub const DEPLOYMENT_TYPES: &[&str] = &["production", "staging"];
const DEFAULT_DBT_VERSION: &str = "latest";

/// `latest` and `versionless` name the same release track
fn same_dbt_version(a: &str, b: &str) -> bool {
    const VERSIONLESS: [&str; 2] = ["latest", "versionless"];
    a == b || (VERSIONLESS.contains(&a) && VERSIONLESS.contains(&b))
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EnvironmentState<'a> {
    pub id: ValueString<'a>,
    pub environment_id: ValueNumber,
    pub project_id: ValueNumber,
    pub name: ValueString<'a>,
    #[serde(rename = "type")]
    pub env_type: ValueString<'a>,
    pub dbt_version: ValueString<'a>,
    pub deployment_type: ValueString<'a>,
    pub use_custom_branch: ValueBool,
    pub custom_branch: ValueString<'a>,
    pub credential_id: ValueNumber,
    pub connection_id: ValueNumber,
    pub enable_model_query_history: ValueBool,
}

impl<'a> EnvironmentState<'a> {
    fn keys(&self) -> Result<(i64, i64)> {
        let [project_id, environment_id] =
            id::decode(&req_str(&self.id, "id")?, "project_id:environment_id")?;
        Ok((project_id, environment_id))
    }

    fn to_api(&self, account_id: i64) -> Result<Environment> {
        Ok(Environment {
            account_id,
            project_id: req_num(&self.project_id, "project_id")?,
            name: req_str(&self.name, "name")?,
            env_type: req_str(&self.env_type, "type")?,
            dbt_version: Some(opt_str(&self.dbt_version).unwrap_or_else(|| DEFAULT_DBT_VERSION.to_owned())),
            deployment_type: opt_str(&self.deployment_type),
            use_custom_branch: bool_or(&self.use_custom_branch, false),
            custom_branch: opt_str(&self.custom_branch),
            credentials_id: opt_num(&self.credential_id),
            connection_id: opt_num(&self.connection_id),
            enable_model_query_history: bool_or(&self.enable_model_query_history, false),
            state: STATE_ACTIVE,
            ..Default::default()
        })
    }

    /// State of a remote environment, `prior` keeps equivalent dbt versions stable
    fn from_api(environment: Environment, prior: Option<&Self>) -> Result<Self> {
        let environment_id = environment
            .id
            .ok_or_else(|| anyhow!("dbt Cloud returned an environment without id"))?;
        let dbt_version = match (prior.and_then(|prior| opt_str(&prior.dbt_version)), environment.dbt_version) {
            (Some(prior), Some(remote)) if same_dbt_version(&prior, &remote) => Some(prior),
            (_, remote) => remote,
        };
        Ok(Self {
            id: str_value(id::encode(&[environment.project_id, environment_id])),
            environment_id: Value::Value(environment_id),
            project_id: Value::Value(environment.project_id),
            name: str_value(environment.name),
            env_type: str_value(environment.env_type),
            dbt_version: non_empty_value(dbt_version),
            deployment_type: non_empty_value(environment.deployment_type),
            use_custom_branch: Value::Value(environment.use_custom_branch),
            custom_branch: non_empty_value(environment.custom_branch),
            credential_id: environment.credentials_id.into(),
            connection_id: environment.connection_id.into(),
            enable_model_query_history: Value::Value(environment.enable_model_query_history),
        })
    }
}

#[derive(Debug, Default)]
pub struct EnvironmentResource;

#[async_trait]
impl ApiResource for EnvironmentResource {
    const NAME: &'static str = "environment";
    type State<'a> = EnvironmentState<'a>;

    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};
        schema(
            "A dbt Cloud environment of a project",
            map! {
                "id" => attribute(AttributeType::String, Computed, "`project_id:environment_id`"),
                "environment_id" => attribute(AttributeType::Number, Computed, "ID of the environment"),
                "project_id" => attribute(AttributeType::Number, Required, "Project of the environment"),
                "name" => attribute(AttributeType::String, Required, "Name of the environment"),
                "type" => attribute(AttributeType::String, Required, "`development` or `deployment`"),
                "dbt_version" => attribute(
                    AttributeType::String,
                    OptionalComputed,
                    "dbt version used by the environment, `latest` by default",
                ),
                "deployment_type" => attribute(
                    AttributeType::String,
                    Optional,
                    "`production` or `staging`, only for deployment environments",
                ),
                "use_custom_branch" => attribute(
                    AttributeType::Bool,
                    OptionalComputed,
                    "Whether to run on `custom_branch` instead of the default branch",
                ),
                "custom_branch" => attribute(AttributeType::String, Optional, "Branch to run on"),
                "credential_id" => attribute(AttributeType::Number, Optional, "Credential of the environment"),
                "connection_id" => attribute(AttributeType::Number, Optional, "Connection of the environment"),
                "enable_model_query_history" => attribute(
                    AttributeType::Bool,
                    OptionalComputed,
                    "Whether to collect the query history of models",
                ),
            },
        )
    }

    fn validate(&self, diags: &mut Diagnostics, config: &EnvironmentState<'_>) {
        validate_one_of(diags, AttributePath::new("type"), &config.env_type, ENVIRONMENT_TYPES);
        validate_one_of(
            diags,
            AttributePath::new("deployment_type"),
            &config.deployment_type,
            DEPLOYMENT_TYPES,
        );
        validate_conflicts_if(
            diags,
            "deployment_type",
            &config.deployment_type,
            config.env_type.as_deref_option() == Some("development"),
            "`type` is `development`",
        );
        validate_required_if(
            diags,
            "custom_branch",
            &config.custom_branch,
            config.use_custom_branch == Value::Value(true),
            "`use_custom_branch` is true",
        );
    }

    fn plan<'a>(
        &self,
        _diags: &mut Diagnostics,
        prior: Option<&EnvironmentState<'a>>,
        state: &mut EnvironmentState<'a>,
    ) {
        computed(&mut state.id);
        computed(&mut state.environment_id);
        default_to(&mut state.dbt_version, DEFAULT_DBT_VERSION.into());
        default_to(&mut state.use_custom_branch, false);
        default_to(&mut state.enable_model_query_history, false);

        if let (Some(prior), Value::Value(planned)) = (prior, &state.dbt_version) {
            if let Value::Value(prior_version) = &prior.dbt_version {
                if same_dbt_version(prior_version, planned) {
                    state.dbt_version = prior.dbt_version.clone();
                }
            }
        }
    }

    fn requires_replace(
        &self,
        prior: &EnvironmentState<'_>,
        planned: &EnvironmentState<'_>,
    ) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_on_change(&mut paths, "project_id", &prior.project_id, &planned.project_id);
        replace_on_change(&mut paths, "type", &prior.env_type, &planned.env_type);
        paths
    }

    async fn create<'a>(
        &self,
        client: &DbtCloudClient,
        planned: &EnvironmentState<'a>,
    ) -> Result<EnvironmentState<'a>> {
        let environment = planned.to_api(client.account_id())?;
        let created = client.create_environment(&environment).await?;
        EnvironmentState::from_api(created, Some(planned))
    }

    async fn read<'a>(
        &self,
        client: &DbtCloudClient,
        state: &EnvironmentState<'a>,
    ) -> Result<Option<EnvironmentState<'a>>> {
        let (project_id, environment_id) = state.keys()?;
        client
            .get_environment(project_id, environment_id)
            .await?
            .map(|environment| EnvironmentState::from_api(environment, Some(state)))
            .transpose()
    }

    async fn update<'a>(
        &self,
        client: &DbtCloudClient,
        prior: &EnvironmentState<'a>,
        planned: &EnvironmentState<'a>,
    ) -> Result<EnvironmentState<'a>> {
        let (_, environment_id) = prior.keys()?;
        let environment = Environment {
            id: Some(environment_id),
            ..planned.to_api(client.account_id())?
        };
        let updated = client.update_environment(environment_id, &environment).await?;
        EnvironmentState::from_api(updated, Some(planned))
    }

    async fn delete<'a>(
        &self,
        client: &DbtCloudClient,
        state: &EnvironmentState<'a>,
    ) -> Result<()> {
        let (project_id, environment_id) = state.keys()?;
        Ok(client.delete_environment(project_id, environment_id).await?)
    }

    fn import<'a>(&self, id: &str) -> Result<EnvironmentState<'a>> {
        let [project_id, environment_id] = id::decode(id, "project_id:environment_id")?;
        Ok(EnvironmentState {
            id: str_value(id::encode(&[project_id, environment_id])),
            environment_id: Value::Value(environment_id),
            project_id: Value::Value(project_id),
            ..Default::default()
        })
    }
}

impl ApiDataSource for EnvironmentResource {
    const LOOKUP_KEYS: &'static [&'static str] = &["project_id", "environment_id"];

    fn lookup<'a>(&self, config: &Self::State<'a>) -> Result<Self::State<'a>> {
        let project_id = req_num(&config.project_id, "project_id")?;
        let environment_id = req_num(&config.environment_id, "environment_id")?;
        self.import(&id::encode(&[project_id, environment_id]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_client;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn planned() -> EnvironmentState<'static> {
        EnvironmentState {
            project_id: Value::Value(3),
            name: str_value("Production"),
            env_type: str_value("deployment"),
            deployment_type: str_value("production"),
            ..Default::default()
        }
    }

    #[test]
    fn plan_keeps_equivalent_dbt_version() {
        let prior = EnvironmentState {
            dbt_version: str_value("versionless"),
            ..planned()
        };
        let mut state = EnvironmentState {
            dbt_version: str_value("latest"),
            ..planned()
        };
        EnvironmentResource.plan(&mut Diagnostics::default(), Some(&prior), &mut state);
        assert_eq!(state.dbt_version, str_value("versionless"));

        let mut state = EnvironmentState {
            dbt_version: str_value("1.7.0-latest"),
            ..planned()
        };
        EnvironmentResource.plan(&mut Diagnostics::default(), Some(&prior), &mut state);
        assert_eq!(state.dbt_version, str_value("1.7.0-latest"));
    }

    #[test]
    fn plan_fills_defaults() {
        let mut state = planned();
        EnvironmentResource.plan(&mut Diagnostics::default(), None, &mut state);
        assert_eq!(state.dbt_version, str_value("latest"));
        assert_eq!(state.use_custom_branch, Value::Value(false));
        assert!(state.id.is_unknown());
    }

    #[test]
    fn validation() {
        let mut diags = Diagnostics::default();
        EnvironmentResource.validate(&mut diags, &planned());
        assert!(diags.errors.is_empty());

        let config = EnvironmentState {
            env_type: str_value("development"),
            use_custom_branch: Value::Value(true),
            ..planned()
        };
        let mut diags = Diagnostics::default();
        EnvironmentResource.validate(&mut diags, &config);
        assert_eq!(diags.errors.len(), 2);
    }

    #[test]
    fn type_change_forces_replacement() {
        let prior = planned();
        let planned = EnvironmentState {
            env_type: str_value("development"),
            ..planned()
        };
        assert_eq!(
            EnvironmentResource.requires_replace(&prior, &planned),
            vec![AttributePath::new("type")]
        );
    }

    #[tokio::test]
    async fn create_then_read_keeps_latest() {
        let server = MockServer::start().await;
        let remote = json!({
            "id": 9,
            "account_id": 1,
            "project_id": 3,
            "name": "Production",
            "type": "deployment",
            "dbt_version": "versionless",
            "deployment_type": "production",
            "use_custom_branch": false,
            "custom_branch": null,
            "credentials_id": null,
            "connection_id": 4,
            "enable_model_query_history": false,
            "state": 1,
        });
        Mock::given(method("POST"))
            .and(path("/v3/accounts/1/projects/3/environments/"))
            .and(body_partial_json(json!({"type": "deployment", "dbt_version": "latest"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": remote})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v3/accounts/1/projects/3/environments/9/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": remote})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let mut planned = planned();
        EnvironmentResource.plan(&mut Diagnostics::default(), None, &mut planned);
        let state = EnvironmentResource.create(&client, &planned).await.unwrap();
        assert_eq!(state.id, str_value("3:9"));
        assert_eq!(state.dbt_version, str_value("latest"));
        assert_eq!(state.connection_id, Value::Value(4));

        let state = EnvironmentResource.read(&client, &state).await.unwrap().unwrap();
        assert_eq!(state.dbt_version, str_value("latest"));
    }

    #[test]
    fn import_parses_composite_id() {
        let state = EnvironmentResource.import("3:9").unwrap();
        assert_eq!(state.project_id, Value::Value(3));
        assert_eq!(state.environment_id, Value::Value(9));
        assert!(EnvironmentResource.import("9").is_err());
    }

    #[test]
    fn lookup_needs_both_keys() {
        let config = EnvironmentState {
            project_id: Value::Value(3),
            environment_id: Value::Value(9),
            ..Default::default()
        };
        let state = EnvironmentResource.lookup(&config).unwrap();
        assert_eq!(state.id, str_value("3:9"));

        let config = EnvironmentState {
            environment_id: Value::Value(9),
            ..Default::default()
        };
        assert!(EnvironmentResource.lookup(&config).is_err());
    }
}
