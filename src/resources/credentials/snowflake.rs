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
    sensitive, str_value, validate_conflicts_if, validate_one_of, validate_required_if,
};

use super::super::ApiResource;
use super::{credential_id, import_keys, keys};

pub const AUTH_TYPES: &[&str] = &["password", "keypair"];

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SnowflakeCredentialState<'a> {
    pub id: ValueString<'a>,
    pub credential_id: ValueNumber,
    pub project_id: ValueNumber,
    pub auth_type: ValueString<'a>,
    pub user: ValueString<'a>,
    pub password: ValueString<'a>,
    pub private_key: ValueString<'a>,
    pub private_key_passphrase: ValueString<'a>,
    pub schema: ValueString<'a>,
    pub num_threads: ValueNumber,
    pub database: ValueString<'a>,
    pub warehouse: ValueString<'a>,
    pub role: ValueString<'a>,
}

impl<'a> SnowflakeCredentialState<'a> {
    fn to_api(&self, account_id: i64) -> Result<Credential> {
        Ok(Credential {
            account_id,
            project_id: req_num(&self.project_id, "project_id")?,
            credential_type: "snowflake".to_owned(),
            state: STATE_ACTIVE,
            threads: Some(req_num(&self.num_threads, "num_threads")?),
            auth_type: Some(req_str(&self.auth_type, "auth_type")?),
            user: Some(req_str(&self.user, "user")?),
            password: opt_str(&self.password),
            private_key: opt_str(&self.private_key),
            private_key_passphrase: opt_str(&self.private_key_passphrase),
            schema: Some(req_str(&self.schema, "schema")?),
            database: opt_str(&self.database),
            warehouse: opt_str(&self.warehouse),
            role: opt_str(&self.role),
            ..Default::default()
        })
    }

    fn from_api(credential: Credential, prior: &Self) -> Result<Self> {
        let credential_id = credential_id(&credential)?;
        Ok(Self {
            id: str_value(id::encode(&[credential.project_id, credential_id])),
            credential_id: Value::Value(credential_id),
            project_id: Value::Value(credential.project_id),
            auth_type: non_empty_value(credential.auth_type).or(prior.auth_type.clone()),
            user: non_empty_value(credential.user),
            password: prior.password.clone(),
            private_key: prior.private_key.clone(),
            private_key_passphrase: prior.private_key_passphrase.clone(),
            schema: non_empty_value(credential.schema),
            num_threads: credential.threads.into(),
            database: non_empty_value(credential.database),
            warehouse: non_empty_value(credential.warehouse),
            role: non_empty_value(credential.role),
        })
    }
}

#[derive(Debug, Default)]
pub struct SnowflakeCredentialResource;

#[async_trait]
impl ApiResource for SnowflakeCredentialResource {
    const NAME: &'static str = "snowflake_credential";
    type State<'a> = SnowflakeCredentialState<'a>;

    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Optional, Required};
        schema(
            "Snowflake credential of a dbt Cloud project",
            map! {
                "id" => attribute(AttributeType::String, Computed, "`project_id:credential_id`"),
                "credential_id" => attribute(AttributeType::Number, Computed, "ID of the credential"),
                "project_id" => attribute(AttributeType::Number, Required, "Project of the credential"),
                "auth_type" => attribute(AttributeType::String, Required, "`password` or `keypair`"),
                "user" => attribute(AttributeType::String, Required, "Snowflake user"),
                "password" => sensitive(attribute(
                    AttributeType::String,
                    Optional,
                    "Password of the user, required with `password` authentication",
                )),
                "private_key" => sensitive(attribute(
                    AttributeType::String,
                    Optional,
                    "Private key of the user, for `keypair` authentication",
                )),
                "private_key_passphrase" => sensitive(attribute(
                    AttributeType::String,
                    Optional,
                    "Passphrase of the private key",
                )),
                "schema" => attribute(AttributeType::String, Required, "Default schema"),
                "num_threads" => attribute(AttributeType::Number, Required, "Number of threads"),
                "database" => attribute(AttributeType::String, Optional, "Default database"),
                "warehouse" => attribute(AttributeType::String, Optional, "Default warehouse"),
                "role" => attribute(AttributeType::String, Optional, "Default role"),
            },
        )
    }

    fn validate(&self, diags: &mut Diagnostics, config: &SnowflakeCredentialState<'_>) {
        validate_one_of(diags, AttributePath::new("auth_type"), &config.auth_type, AUTH_TYPES);
        let auth_type = config.auth_type.as_deref_option();
        let password = auth_type == Some("password");
        let keypair = auth_type == Some("keypair");
        validate_required_if(
            diags,
            "password",
            &config.password,
            password,
            "`auth_type` is `password`",
        );
        validate_conflicts_if(
            diags,
            "password",
            &config.password,
            keypair,
            "`auth_type` is `keypair`",
        );
        validate_required_if(
            diags,
            "private_key",
            &config.private_key,
            keypair,
            "`auth_type` is `keypair`",
        );
        validate_conflicts_if(
            diags,
            "private_key",
            &config.private_key,
            password,
            "`auth_type` is `password`",
        );
        validate_conflicts_if(
            diags,
            "private_key_passphrase",
            &config.private_key_passphrase,
            password,
            "`auth_type` is `password`",
        );
    }

    fn plan<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior: Option<&SnowflakeCredentialState<'a>>,
        state: &mut SnowflakeCredentialState<'a>,
    ) {
        computed(&mut state.id);
        computed(&mut state.credential_id);
    }

    fn requires_replace(
        &self,
        prior: &SnowflakeCredentialState<'_>,
        planned: &SnowflakeCredentialState<'_>,
    ) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_on_change(&mut paths, "project_id", &prior.project_id, &planned.project_id);
        paths
    }

    async fn create<'a>(
        &self,
        client: &DbtCloudClient,
        planned: &SnowflakeCredentialState<'a>,
    ) -> Result<SnowflakeCredentialState<'a>> {
        let created = client
            .create_credential(&planned.to_api(client.account_id())?)
            .await?;
        SnowflakeCredentialState::from_api(created, planned)
    }

    async fn read<'a>(
        &self,
        client: &DbtCloudClient,
        state: &SnowflakeCredentialState<'a>,
    ) -> Result<Option<SnowflakeCredentialState<'a>>> {
        let (project_id, credential_id) = keys(&state.id)?;
        client
            .get_credential(project_id, credential_id)
            .await?
            .map(|credential| SnowflakeCredentialState::from_api(credential, state))
            .transpose()
    }

    async fn update<'a>(
        &self,
        client: &DbtCloudClient,
        prior: &SnowflakeCredentialState<'a>,
        planned: &SnowflakeCredentialState<'a>,
    ) -> Result<SnowflakeCredentialState<'a>> {
        let (_, credential_id) = keys(&prior.id)?;
        let credential = Credential {
            id: Some(credential_id),
            ..planned.to_api(client.account_id())?
        };
        let updated = client.update_credential(credential_id, &credential).await?;
        SnowflakeCredentialState::from_api(updated, planned)
    }

    async fn delete<'a>(
        &self,
        client: &DbtCloudClient,
        state: &SnowflakeCredentialState<'a>,
    ) -> Result<()> {
        let (project_id, credential_id) = keys(&state.id)?;
        Ok(client.delete_credential(project_id, credential_id).await?)
    }

    fn import<'a>(&self, id: &str) -> Result<SnowflakeCredentialState<'a>> {
        let (id, project_id, credential_id) = import_keys(id)?;
        Ok(SnowflakeCredentialState {
            id: str_value(id),
            credential_id: Value::Value(credential_id),
            project_id: Value::Value(project_id),
            ..Default::default()
        })
    }
}
