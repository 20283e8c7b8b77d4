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
use tf_provider::value::{Value, ValueNumber, ValueString};
use tf_provider::{AttributePath, Diagnostics};

use crate::api::credentials::Credential;
use crate::api::AdapterFields;
use crate::client::{DbtCloudClient, STATE_ACTIVE};
use crate::id;
use crate::utils::{
    attribute, computed, default_to, non_empty_value, opt_str, replace_on_change, req_num, req_str, schema,
    sensitive, str_value, validate_conflicts_if, validate_one_of,
};

use super::super::ApiResource;
use super::{credential_id, import_keys, keys};

pub const ADAPTER_TYPES: &[&str] = &["databricks", "spark"];
const DEFAULT_ADAPTER_TYPE: &str = "databricks";
const DEFAULT_TARGET_NAME: &str = "default";

fn adapter_version(adapter_type: &str) -> String {
    format!("{adapter_type}_v0")
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DatabricksCredentialState<'a> {
    pub id: ValueString<'a>,
    pub credential_id: ValueNumber,
    pub project_id: ValueNumber,
    pub token: ValueString<'a>,
    pub schema: ValueString<'a>,
    pub catalog: ValueString<'a>,
    pub target_name: ValueString<'a>,
    pub adapter_type: ValueString<'a>,
}

impl<'a> DatabricksCredentialState<'a> {
    fn to_api(&self, account_id: i64) -> Result<Credential> {
        let adapter_type =
            opt_str(&self.adapter_type).unwrap_or_else(|| DEFAULT_ADAPTER_TYPE.to_owned());
        let mut fields = AdapterFields::default();
        fields.insert("token", req_str(&self.token, "token")?);
        fields.insert("schema", req_str(&self.schema, "schema")?);
        fields.insert(
            "target_name",
            opt_str(&self.target_name).unwrap_or_else(|| DEFAULT_TARGET_NAME.to_owned()),
        );
        if adapter_type == "databricks" {
            fields.insert_opt("catalog", opt_str(&self.catalog));
        }

        Ok(Credential {
            account_id,
            project_id: req_num(&self.project_id, "project_id")?,
            credential_type: "adapter".to_owned(),
            state: STATE_ACTIVE,
            adapter_version: Some(adapter_version(&adapter_type)),
            credential_details: Some(fields),
            ..Default::default()
        })
    }

    fn from_api(credential: Credential, prior: &Self) -> Result<Self> {
        let credential_id = credential_id(&credential)?;
        let fields = credential.credential_details.unwrap_or_default();
        let adapter_type = credential
            .adapter_version
            .as_deref()
            .and_then(|version| version.strip_suffix("_v0"))
            .map(|adapter_type| str_value(adapter_type.to_owned()))
            .unwrap_or_else(|| prior.adapter_type.clone());
        Ok(Self {
            id: str_value(id::encode(&[credential.project_id, credential_id])),
            credential_id: Value::Value(credential_id),
            project_id: Value::Value(credential.project_id),
            token: prior.token.clone(),
            schema: non_empty_value(fields.str("schema")),
            catalog: non_empty_value(fields.str("catalog")),
            target_name: non_empty_value(fields.str("target_name")),
            adapter_type,
        })
    }
}

#[derive(Debug, Default)]
pub struct DatabricksCredentialResource;

#[async_trait]
impl ApiResource for DatabricksCredentialResource {
    const NAME: &'static str = "databricks_credential";
    type State<'a> = DatabricksCredentialState<'a>;

    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};
        schema(
            "Databricks or Spark credential of a dbt Cloud project",
            map! {
                "id" => attribute(AttributeType::String, Computed, "`project_id:credential_id`"),
                "credential_id" => attribute(AttributeType::Number, Computed, "ID of the credential"),
                "project_id" => attribute(AttributeType::Number, Required, "Project of the credential"),
                "token" => sensitive(attribute(AttributeType::String, Required, "Personal access token")),
                "schema" => attribute(AttributeType::String, Required, "Default schema"),
                "catalog" => attribute(AttributeType::String, Optional, "Unity catalog, Databricks only"),
                "target_name" => attribute(
                    AttributeType::String,
                    OptionalComputed,
                    "dbt target name, `default` by default",
                ),
                "adapter_type" => attribute(
                    AttributeType::String,
                    OptionalComputed,
                    "`databricks` (default) or `spark`",
                ),
            },
        )
    }

    fn validate(&self, diags: &mut Diagnostics, config: &DatabricksCredentialState<'_>) {
        validate_one_of(
            diags,
            AttributePath::new("adapter_type"),
            &config.adapter_type,
            ADAPTER_TYPES,
        );
        validate_conflicts_if(
            diags,
            "catalog",
            &config.catalog,
            config.adapter_type.as_deref_option() == Some("spark"),
            "`adapter_type` is `spark`",
        );
    }

    fn plan<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior: Option<&DatabricksCredentialState<'a>>,
        state: &mut DatabricksCredentialState<'a>,
    ) {
        computed(&mut state.id);
        computed(&mut state.credential_id);
        default_to(&mut state.target_name, DEFAULT_TARGET_NAME.into());
        default_to(&mut state.adapter_type, DEFAULT_ADAPTER_TYPE.into());
    }

    fn requires_replace(
        &self,
        prior: &DatabricksCredentialState<'_>,
        planned: &DatabricksCredentialState<'_>,
    ) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_on_change(&mut paths, "project_id", &prior.project_id, &planned.project_id);
        replace_on_change(&mut paths, "adapter_type", &prior.adapter_type, &planned.adapter_type);
        paths
    }

    async fn create<'a>(
        &self,
        client: &DbtCloudClient,
        planned: &DatabricksCredentialState<'a>,
    ) -> Result<DatabricksCredentialState<'a>> {
        let created = client
            .create_credential(&planned.to_api(client.account_id())?)
            .await?;
        DatabricksCredentialState::from_api(created, planned)
    }

    async fn read<'a>(
        &self,
        client: &DbtCloudClient,
        state: &DatabricksCredentialState<'a>,
    ) -> Result<Option<DatabricksCredentialState<'a>>> {
        let (project_id, credential_id) = keys(&state.id)?;
        client
            .get_credential(project_id, credential_id)
            .await?
            .map(|credential| DatabricksCredentialState::from_api(credential, state))
            .transpose()
    }

    async fn update<'a>(
        &self,
        client: &DbtCloudClient,
        prior: &DatabricksCredentialState<'a>,
        planned: &DatabricksCredentialState<'a>,
    ) -> Result<DatabricksCredentialState<'a>> {
        let (_, credential_id) = keys(&prior.id)?;
        let credential = Credential {
            id: Some(credential_id),
            ..planned.to_api(client.account_id())?
        };
        let updated = client.update_credential(credential_id, &credential).await?;
        DatabricksCredentialState::from_api(updated, planned)
    }

    async fn delete<'a>(
        &self,
        client: &DbtCloudClient,
        state: &DatabricksCredentialState<'a>,
    ) -> Result<()> {
        let (project_id, credential_id) = keys(&state.id)?;
        Ok(client.delete_credential(project_id, credential_id).await?)
    }

    fn import<'a>(&self, id: &str) -> Result<DatabricksCredentialState<'a>> {
        let (id, project_id, credential_id) = import_keys(id)?;
        Ok(DatabricksCredentialState {
            id: str_value(id),
            credential_id: Value::Value(credential_id),
            project_id: Value::Value(project_id),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_client;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn spark_sends_no_catalog() {
        let state = DatabricksCredentialState {
            project_id: Value::Value(3),
            token: str_value("dapi"),
            schema: str_value("analytics"),
            catalog: str_value("main"),
            adapter_type: str_value("spark"),
            ..Default::default()
        };
        let credential = state.to_api(1).unwrap();
        assert_eq!(credential.adapter_version.as_deref(), Some("spark_v0"));
        let fields = credential.credential_details.unwrap();
        assert_eq!(fields.str("catalog"), None);
        assert_eq!(fields.str("target_name").as_deref(), Some("default"));

        let mut diags = Diagnostics::default();
        DatabricksCredentialResource.validate(&mut diags, &state);
        assert_eq!(diags.errors.len(), 1);
    }

    #[tokio::test]
    async fn create_maps_adapter_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/accounts/1/projects/3/credentials/"))
            .and(body_partial_json(json!({
                "type": "adapter",
                "adapter_version": "databricks_v0",
                "credential_details": {"fields": {"token": {"value": "dapi"}}},
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": {
                "id": 30,
                "project_id": 3,
                "type": "adapter",
                "state": 1,
                "adapter_version": "databricks_v0",
                "credential_details": {"fields": {
                    "token": {"value": "**********"},
                    "schema": {"value": "analytics"},
                    "target_name": {"value": "default"},
                    "catalog": {"value": "main"},
                }},
            }})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let mut planned = DatabricksCredentialState {
            project_id: Value::Value(3),
            token: str_value("dapi"),
            schema: str_value("analytics"),
            catalog: str_value("main"),
            ..Default::default()
        };
        DatabricksCredentialResource.plan(&mut Diagnostics::default(), None, &mut planned);
        let state = DatabricksCredentialResource
            .create(&client, &planned)
            .await
            .unwrap();
        assert_eq!(state.id, str_value("3:30"));
        assert_eq!(state.token, str_value("dapi"));
        assert_eq!(state.catalog, str_value("main"));
        assert_eq!(state.adapter_type, str_value("databricks"));
    }
}
