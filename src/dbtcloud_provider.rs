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

use std::collections::HashMap;

use async_trait::async_trait;
use tf_provider::schema::{Block, Description, Schema};
use tf_provider::value::ValueEmpty;
use tf_provider::{map, Diagnostics, DynamicDataSource, DynamicResource, Provider};
use tracing::{info, warn};

use crate::client::{ClientHandle, DbtCloudClient};
use crate::config::ProviderConfig;
use crate::resources::connection::ConnectionResource;
use crate::resources::credentials::{
    DatabricksCredentialResource, PostgresCredentialResource, SnowflakeCredentialResource,
};
use crate::resources::environment::EnvironmentResource;
use crate::resources::job::JobResource;
use crate::resources::project::ProjectResource;
use crate::resources::project_link::{ProjectConnectionResource, ProjectRepositoryResource};
use crate::resources::repository::RepositoryResource;
use crate::resources::service_token::ServiceTokenResource;
use crate::resources::user_groups::UserGroupsResource;
use crate::resources::webhook::WebhookResource;
use crate::resources::{DbtDataSource, DbtResource};

#[derive(Debug, Default, Clone)]
pub struct DbtCloudProvider {
    client: ClientHandle,
}

#[async_trait]
impl Provider for DbtCloudProvider {
    type Config<'a> = ProviderConfig<'a>;
    type MetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(Schema {
            version: 1,
            block: Block {
                description: Description::markdown(
                    "Manage dbt Cloud projects, environments, jobs and their dependencies",
                ),
                attributes: ProviderConfig::attributes(),
                ..Default::default()
            },
        })
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::Config<'a>) -> Option<()> {
        config.validate(diags);
        Some(())
    }

    async fn configure<'a>(
        &self,
        diags: &mut Diagnostics,
        terraform_version: String,
        config: Self::Config<'a>,
    ) -> Option<()> {
        let settings = config.resolve(diags)?;
        let client = match DbtCloudClient::new(settings) {
            Ok(client) => client,
            Err(err) => {
                diags.root_error("Failed to create the dbt Cloud client", err.to_string());
                return None;
            }
        };

        if config.skip_credentials_validation.as_ref_option() != Some(&true) {
            if let Err(err) = client.check_credentials().await {
                warn!(error = %err, "credentials rejected");
                diags.root_error(
                    "Invalid dbt Cloud credentials",
                    format!(
                        "The token cannot access account {}: {err}",
                        client.account_id()
                    ),
                );
                return None;
            }
        }

        info!(
            terraform_version,
            account_id = client.account_id(),
            "dbtcloud provider configured"
        );
        self.client.set(client);
        Some(())
    }

    fn get_resources(
        &self,
        _diags: &mut Diagnostics,
    ) -> Option<HashMap<String, Box<dyn DynamicResource>>> {
        let client = &self.client;
        Some(map! {
            "project" => DbtResource::<ProjectResource>::new(client.clone()),
            "environment" => DbtResource::<EnvironmentResource>::new(client.clone()),
            "connection" => DbtResource::<ConnectionResource>::new(client.clone()),
            "snowflake_credential" => DbtResource::<SnowflakeCredentialResource>::new(client.clone()),
            "databricks_credential" => DbtResource::<DatabricksCredentialResource>::new(client.clone()),
            "postgres_credential" => DbtResource::<PostgresCredentialResource>::new(client.clone()),
            "job" => DbtResource::<JobResource>::new(client.clone()),
            "webhook" => DbtResource::<WebhookResource>::new(client.clone()),
            "repository" => DbtResource::<RepositoryResource>::new(client.clone()),
            "project_connection" => DbtResource::<ProjectConnectionResource>::new(client.clone()),
            "project_repository" => DbtResource::<ProjectRepositoryResource>::new(client.clone()),
            "service_token" => DbtResource::<ServiceTokenResource>::new(client.clone()),
            "user_groups" => DbtResource::<UserGroupsResource>::new(client.clone()),
        })
    }

    fn get_data_sources(
        &self,
        _diags: &mut Diagnostics,
    ) -> Option<HashMap<String, Box<dyn DynamicDataSource>>> {
        let client = &self.client;
        Some(map! {
            "project" => DbtDataSource::<ProjectResource>::new(client.clone()),
            "environment" => DbtDataSource::<EnvironmentResource>::new(client.clone()),
            "job" => DbtDataSource::<JobResource>::new(client.clone()),
        })
    }
}
