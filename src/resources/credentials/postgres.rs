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
use crate::client::{DbtCloudClient, STATE_ACTIVE};
use crate::id;
use crate::utils::{
    attribute, computed, non_empty_value, opt_str, replace_on_change, req_num, req_str, schema,
    sensitive, str_value, validate_one_of,
};

use super::super::ApiResource;
use super::{credential_id, import_keys, keys};

pub const POSTGRES_TYPES: &[&str] = &["postgres", "redshift"];

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PostgresCredentialState<'a> {
    pub id: ValueString<'a>,
    pub credential_id: ValueNumber,
    pub project_id: ValueNumber,
    #[serde(rename = "type")]
    pub kind: ValueString<'a>,
    pub default_schema: ValueString<'a>,
    pub username: ValueString<'a>,
    pub password: ValueString<'a>,
    pub num_threads: ValueNumber,
}

impl<'a> PostgresCredentialState<'a> {
    fn to_api(&self, account_id: i64) -> Result<Credential> {
        Ok(Credential {
            account_id,
            project_id: req_num(&self.project_id, "project_id")?,
            credential_type: req_str(&self.kind, "type")?,
            state: STATE_ACTIVE,
            threads: Some(req_num(&self.num_threads, "num_threads")?),
            default_schema: Some(req_str(&self.default_schema, "default_schema")?),
            username: Some(req_str(&self.username, "username")?),
            password: opt_str(&self.password),
            ..Default::default()
        })
    }

    fn from_api(credential: Credential, prior: &Self) -> Result<Self> {
        let credential_id = credential_id(&credential)?;
        Ok(Self {
            id: str_value(id::encode(&[credential.project_id, credential_id])),
            credential_id: Value::Value(credential_id),
            project_id: Value::Value(credential.project_id),
            kind: str_value(credential.credential_type),
            default_schema: non_empty_value(credential.default_schema),
            username: non_empty_value(credential.username),
            password: prior.password.clone(),
            num_threads: credential.threads.into(),
        })
    }
}

#[derive(Debug, Default)]
pub struct PostgresCredentialResource;

#[async_trait]
impl ApiResource for PostgresCredentialResource {
    const NAME: &'static str = "postgres_credential";
    type State<'a> = PostgresCredentialState<'a>;

    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Optional, Required};
        schema(
            "Postgres or Redshift credential of a dbt Cloud project",
            map! {
                "id" => attribute(AttributeType::String, Computed, "`project_id:credential_id`"),
                "credential_id" => attribute(AttributeType::Number, Computed, "ID of the credential"),
                "project_id" => attribute(AttributeType::Number, Required, "Project of the credential"),
                "type" => attribute(AttributeType::String, Required, "`postgres` or `redshift`"),
                "default_schema" => attribute(AttributeType::String, Required, "Default schema"),
                "username" => attribute(AttributeType::String, Required, "Database user"),
                "password" => sensitive(attribute(AttributeType::String, Optional, "Password of the user")),
                "num_threads" => attribute(AttributeType::Number, Required, "Number of threads"),
            },
        )
    }

    fn validate(&self, diags: &mut Diagnostics, config: &PostgresCredentialState<'_>) {
        validate_one_of(diags, AttributePath::new("type"), &config.kind, POSTGRES_TYPES);
    }

    fn plan<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior: Option<&PostgresCredentialState<'a>>,
        state: &mut PostgresCredentialState<'a>,
    ) {
        computed(&mut state.id);
        computed(&mut state.credential_id);
    }

    fn requires_replace(
        &self,
        prior: &PostgresCredentialState<'_>,
        planned: &PostgresCredentialState<'_>,
    ) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_on_change(&mut paths, "project_id", &prior.project_id, &planned.project_id);
        replace_on_change(&mut paths, "type", &prior.kind, &planned.kind);
        paths
    }

    async fn create<'a>(
        &self,
        client: &DbtCloudClient,
        planned: &PostgresCredentialState<'a>,
    ) -> Result<PostgresCredentialState<'a>> {
        let created = client
            .create_credential(&planned.to_api(client.account_id())?)
            .await?;
        PostgresCredentialState::from_api(created, planned)
    }

    async fn read<'a>(
        &self,
        client: &DbtCloudClient,
        state: &PostgresCredentialState<'a>,
    ) -> Result<Option<PostgresCredentialState<'a>>> {
        let (project_id, credential_id) = keys(&state.id)?;
        client
            .get_credential(project_id, credential_id)
            .await?
            .map(|credential| PostgresCredentialState::from_api(credential, state))
            .transpose()
    }

    async fn update<'a>(
        &self,
        client: &DbtCloudClient,
        prior: &PostgresCredentialState<'a>,
        planned: &PostgresCredentialState<'a>,
    ) -> Result<PostgresCredentialState<'a>> {
        let (_, credential_id) = keys(&prior.id)?;
        let credential = Credential {
            id: Some(credential_id),
            ..planned.to_api(client.account_id())?
        };
        let updated = client.update_credential(credential_id, &credential).await?;
        PostgresCredentialState::from_api(updated, planned)
    }

    async fn delete<'a>(
        &self,
        client: &DbtCloudClient,
        state: &PostgresCredentialState<'a>,
    ) -> Result<()> {
        let (project_id, credential_id) = keys(&state.id)?;
        Ok(client.delete_credential(project_id, credential_id).await?)
    }

    fn import<'a>(&self, id: &str) -> Result<PostgresCredentialState<'a>> {
        let (id, project_id, credential_id) = import_keys(id)?;
        Ok(PostgresCredentialState {
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
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn read_restores_password_from_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/accounts/1/projects/3/credentials/21/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {
                "id": 21,
                "project_id": 3,
                "type": "redshift",
                "state": 1,
                "threads": 4,
                "username": "dbt",
                "default_schema": "dbt_prod",
                "password": null,
            }})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let state = PostgresCredentialState {
            password: str_value("hunter2"),
            ..PostgresCredentialResource.import("3:21").unwrap()
        };
        let state = PostgresCredentialResource
            .read(&client, &state)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.kind, str_value("redshift"));
        assert_eq!(state.password, str_value("hunter2"));
        assert_eq!(state.num_threads, Value::Value(4));
    }

    #[tokio::test]
    async fn deleted_credential_is_gone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {
                "id": 21,
                "project_id": 3,
                "type": "postgres",
                "state": 2,
            }})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let state = PostgresCredentialResource.import("3:21").unwrap();
        assert!(PostgresCredentialResource
            .read(&client, &state)
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn rejects_unknown_type() {
        let config = PostgresCredentialState {
            kind: str_value("mysql"),
            ..Default::default()
        };
        let mut diags = Diagnostics::default();
        PostgresCredentialResource.validate(&mut diags, &config);
        assert_eq!(diags.errors.len(), 1);
    }
}
