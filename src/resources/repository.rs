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

use crate::api::repositories::{
    Repository, CLONE_AZURE_APP, CLONE_DEPLOY_KEY, CLONE_DEPLOY_TOKEN, CLONE_GITHUB_APP,
};
use crate::client::{DbtCloudClient, STATE_ACTIVE};
use crate::id;
use crate::utils::{
    attribute, bool_or, computed, default_to, non_empty_value, opt_num, opt_str,
    replace_on_change, req_num, req_str, schema, str_value, validate_one_of, validate_required_if,
};

use super::ApiResource;

pub const CLONE_STRATEGIES: &[&str] = &[
    CLONE_DEPLOY_KEY,
    CLONE_GITHUB_APP,
    CLONE_DEPLOY_TOKEN,
    CLONE_AZURE_APP,
];
const ID_FORMAT: &str = "project_id:repository_id";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RepositoryState<'a> {
    pub id: ValueString<'a>,
    pub repository_id: ValueNumber,
    pub project_id: ValueNumber,
    pub remote_url: ValueString<'a>,
    pub git_clone_strategy: ValueString<'a>,
    pub github_installation_id: ValueNumber,
    pub gitlab_project_id: ValueNumber,
    pub azure_active_directory_project_id: ValueString<'a>,
    pub azure_active_directory_repository_id: ValueString<'a>,
    pub azure_bypass_webhook_registration_failure: ValueBool,
    pub pull_request_url_template: ValueString<'a>,
    pub fetch_deploy_key: ValueBool,
    pub deploy_key: ValueString<'a>,
    pub repository_credentials_id: ValueNumber,
}

impl<'a> RepositoryState<'a> {
    fn keys(&self) -> Result<(i64, i64)> {
        let [project_id, repository_id] = id::decode(&req_str(&self.id, "id")?, ID_FORMAT)?;
        Ok((project_id, repository_id))
    }

    fn to_api(&self, account_id: i64) -> Result<Repository> {
        Ok(Repository {
            account_id,
            project_id: req_num(&self.project_id, "project_id")?,
            remote_url: req_str(&self.remote_url, "remote_url")?,
            git_clone_strategy: opt_str(&self.git_clone_strategy)
                .unwrap_or_else(|| CLONE_DEPLOY_KEY.to_owned()),
            github_installation_id: opt_num(&self.github_installation_id),
            gitlab_project_id: opt_num(&self.gitlab_project_id),
            azure_active_directory_project_id: opt_str(&self.azure_active_directory_project_id),
            azure_active_directory_repository_id: opt_str(
                &self.azure_active_directory_repository_id,
            ),
            azure_bypass_webhook_registration_failure: bool_or(
                &self.azure_bypass_webhook_registration_failure,
                false,
            ),
            pull_request_url_template: opt_str(&self.pull_request_url_template),
            state: STATE_ACTIVE,
            ..Default::default()
        })
    }

    fn from_api(repository: Repository, prior: &Self) -> Result<Self> {
        let repository_id = repository
            .id
            .ok_or_else(|| anyhow!("dbt Cloud returned a repository without id"))?;
        let fetch_deploy_key = bool_or(&prior.fetch_deploy_key, false);
        let deploy_key = match repository.deploy_key {
            Some(key) if fetch_deploy_key => non_empty_value(Some(key.public_key)),
            _ => Value::Null,
        };
        Ok(Self {
            id: str_value(id::encode(&[repository.project_id, repository_id])),
            repository_id: Value::Value(repository_id),
            project_id: Value::Value(repository.project_id),
            remote_url: str_value(repository.remote_url),
            git_clone_strategy: non_empty_value(Some(repository.git_clone_strategy))
                .or(prior.git_clone_strategy.clone()),
            github_installation_id: repository.github_installation_id.into(),
            gitlab_project_id: repository.gitlab_project_id.into(),
            azure_active_directory_project_id: non_empty_value(
                repository.azure_active_directory_project_id,
            ),
            azure_active_directory_repository_id: non_empty_value(
                repository.azure_active_directory_repository_id,
            ),
            azure_bypass_webhook_registration_failure: Value::Value(
                repository.azure_bypass_webhook_registration_failure,
            ),
            pull_request_url_template: non_empty_value(repository.pull_request_url_template),
            fetch_deploy_key: Value::Value(fetch_deploy_key),
            deploy_key,
            repository_credentials_id: repository.repository_credentials_id.into(),
        })
    }
}

#[derive(Debug, Default)]
pub struct RepositoryResource;

#[async_trait]
impl ApiResource for RepositoryResource {
    const NAME: &'static str = "repository";
    type State<'a> = RepositoryState<'a>;

    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};
        schema(
            "Git repository of a dbt Cloud project.\n\n\
             Link it to its project with `dbtcloud_project_repository`.",
            map! {
                "id" => attribute(AttributeType::String, Computed, "`project_id:repository_id`"),
                "repository_id" => attribute(AttributeType::Number, Computed, "ID of the repository"),
                "project_id" => attribute(AttributeType::Number, Required, "Project of the repository"),
                "remote_url" => attribute(AttributeType::String, Required, "Git URL of the repository"),
                "git_clone_strategy" => attribute(
                    AttributeType::String,
                    OptionalComputed,
                    "`deploy_key` (default), `github_app`, `deploy_token` or `azure_active_directory_app`",
                ),
                "github_installation_id" => attribute(
                    AttributeType::Number,
                    Optional,
                    "GitHub app installation, for `github_app`",
                ),
                "gitlab_project_id" => attribute(
                    AttributeType::Number,
                    Optional,
                    "GitLab project, for `deploy_token`",
                ),
                "azure_active_directory_project_id" => attribute(
                    AttributeType::String,
                    Optional,
                    "Azure DevOps project, for `azure_active_directory_app`",
                ),
                "azure_active_directory_repository_id" => attribute(
                    AttributeType::String,
                    Optional,
                    "Azure DevOps repository, for `azure_active_directory_app`",
                ),
                "azure_bypass_webhook_registration_failure" => attribute(
                    AttributeType::Bool,
                    OptionalComputed,
                    "Create the repository even when Azure DevOps refuses the webhook",
                ),
                "pull_request_url_template" => attribute(
                    AttributeType::String,
                    Optional,
                    "URL template used to open pull requests",
                ),
                "fetch_deploy_key" => attribute(
                    AttributeType::Bool,
                    OptionalComputed,
                    "Expose the deploy key in `deploy_key`",
                ),
                "deploy_key" => attribute(AttributeType::String, Computed, "Public deploy key"),
                "repository_credentials_id" => attribute(
                    AttributeType::Number,
                    Computed,
                    "Credentials dbt Cloud uses to clone",
                ),
            },
        )
    }

    fn validate(&self, diags: &mut Diagnostics, config: &RepositoryState<'_>) {
        validate_one_of(
            diags,
            AttributePath::new("git_clone_strategy"),
            &config.git_clone_strategy,
            CLONE_STRATEGIES,
        );
        let strategy = config.git_clone_strategy.as_deref_option();
        validate_required_if(
            diags,
            "github_installation_id",
            &config.github_installation_id,
            strategy == Some(CLONE_GITHUB_APP),
            "`git_clone_strategy` is `github_app`",
        );
        validate_required_if(
            diags,
            "gitlab_project_id",
            &config.gitlab_project_id,
            strategy == Some(CLONE_DEPLOY_TOKEN),
            "`git_clone_strategy` is `deploy_token`",
        );
        let azure = strategy == Some(CLONE_AZURE_APP);
        let reason = "`git_clone_strategy` is `azure_active_directory_app`";
        validate_required_if(
            diags,
            "azure_active_directory_project_id",
            &config.azure_active_directory_project_id,
            azure,
            reason,
        );
        validate_required_if(
            diags,
            "azure_active_directory_repository_id",
            &config.azure_active_directory_repository_id,
            azure,
            reason,
        );
    }

    fn plan<'a>(
        &self,
        _diags: &mut Diagnostics,
        prior: Option<&RepositoryState<'a>>,
        state: &mut RepositoryState<'a>,
    ) {
        default_to(&mut state.git_clone_strategy, CLONE_DEPLOY_KEY.into());
        default_to(&mut state.azure_bypass_webhook_registration_failure, false);
        default_to(&mut state.fetch_deploy_key, false);
        computed(&mut state.id);
        computed(&mut state.repository_id);
        computed(&mut state.repository_credentials_id);

        let fetched = prior.is_some_and(|prior| prior.fetch_deploy_key == Value::Value(true));
        match state.fetch_deploy_key {
            Value::Value(false) => state.deploy_key = Value::Null,
            _ if fetched => (),
            _ => state.deploy_key = Value::Unknown,
        }
    }

    fn requires_replace(
        &self,
        prior: &RepositoryState<'_>,
        planned: &RepositoryState<'_>,
    ) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_on_change(&mut paths, "project_id", &prior.project_id, &planned.project_id);
        replace_on_change(&mut paths, "remote_url", &prior.remote_url, &planned.remote_url);
        replace_on_change(
            &mut paths,
            "git_clone_strategy",
            &prior.git_clone_strategy,
            &planned.git_clone_strategy,
        );
        replace_on_change(
            &mut paths,
            "github_installation_id",
            &prior.github_installation_id,
            &planned.github_installation_id,
        );
        replace_on_change(
            &mut paths,
            "gitlab_project_id",
            &prior.gitlab_project_id,
            &planned.gitlab_project_id,
        );
        replace_on_change(
            &mut paths,
            "azure_active_directory_project_id",
            &prior.azure_active_directory_project_id,
            &planned.azure_active_directory_project_id,
        );
        replace_on_change(
            &mut paths,
            "azure_active_directory_repository_id",
            &prior.azure_active_directory_repository_id,
            &planned.azure_active_directory_repository_id,
        );
        paths
    }

    async fn create<'a>(
        &self,
        client: &DbtCloudClient,
        planned: &RepositoryState<'a>,
    ) -> Result<RepositoryState<'a>> {
        let created = client
            .create_repository(&planned.to_api(client.account_id())?)
            .await?;
        let repository_id = created
            .id
            .ok_or_else(|| anyhow!("dbt Cloud returned a repository without id"))?;

        // The creation response does not carry the deploy key
        let repository = client
            .get_repository(created.project_id, repository_id)
            .await?
            .unwrap_or(created);
        RepositoryState::from_api(repository, planned)
    }

    async fn read<'a>(
        &self,
        client: &DbtCloudClient,
        state: &RepositoryState<'a>,
    ) -> Result<Option<RepositoryState<'a>>> {
        let (project_id, repository_id) = state.keys()?;
        client
            .get_repository(project_id, repository_id)
            .await?
            .map(|repository| RepositoryState::from_api(repository, state))
            .transpose()
    }

    async fn update<'a>(
        &self,
        client: &DbtCloudClient,
        prior: &RepositoryState<'a>,
        planned: &RepositoryState<'a>,
    ) -> Result<RepositoryState<'a>> {
        let (project_id, repository_id) = prior.keys()?;
        let repository = Repository {
            id: Some(repository_id),
            ..planned.to_api(client.account_id())?
        };
        client.update_repository(repository_id, &repository).await?;
        let updated = client
            .get_repository(project_id, repository_id)
            .await?
            .ok_or_else(|| anyhow!("repository {repository_id} disappeared during update"))?;
        RepositoryState::from_api(updated, planned)
    }

    async fn delete<'a>(
        &self,
        client: &DbtCloudClient,
        state: &RepositoryState<'a>,
    ) -> Result<()> {
        let (project_id, repository_id) = state.keys()?;
        Ok(client.delete_repository(project_id, repository_id).await?)
    }

    fn import<'a>(&self, id: &str) -> Result<RepositoryState<'a>> {
        let [project_id, repository_id] = id::decode(id, ID_FORMAT)?;
        Ok(RepositoryState {
            id: str_value(id::encode(&[project_id, repository_id])),
            repository_id: Value::Value(repository_id),
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

    fn remote() -> serde_json::Value {
        json!({
            "id": 8,
            "account_id": 1,
            "project_id": 3,
            "remote_url": "git@github.com:acme/analytics.git",
            "git_clone_strategy": "deploy_key",
            "repository_credentials_id": 21,
            "deploy_key": {"public_key": "ssh-rsa AAAA"},
            "pull_request_url_template": "",
            "state": 1,
        })
    }

    fn planned(fetch_deploy_key: bool) -> RepositoryState<'static> {
        let mut state = RepositoryState {
            project_id: Value::Value(3),
            remote_url: str_value("git@github.com:acme/analytics.git"),
            fetch_deploy_key: Value::Value(fetch_deploy_key),
            ..Default::default()
        };
        RepositoryResource.plan(&mut Diagnostics::default(), None, &mut state);
        state
    }

    #[test]
    fn strategies_require_their_ids() {
        let config = RepositoryState {
            git_clone_strategy: str_value(CLONE_AZURE_APP),
            azure_active_directory_project_id: str_value("proj"),
            ..planned(false)
        };
        let mut diags = Diagnostics::default();
        RepositoryResource.validate(&mut diags, &config);
        assert_eq!(diags.errors.len(), 1);

        let config = RepositoryState {
            git_clone_strategy: str_value(CLONE_GITHUB_APP),
            github_installation_id: Value::Value(42),
            ..planned(false)
        };
        let mut diags = Diagnostics::default();
        RepositoryResource.validate(&mut diags, &config);
        assert!(diags.errors.is_empty());
    }

    #[test]
    fn identity_changes_force_new() {
        let prior = RepositoryResource.import("3:8").unwrap();
        let prior = RepositoryState {
            remote_url: str_value("git@github.com:acme/analytics.git"),
            git_clone_strategy: str_value(CLONE_DEPLOY_KEY),
            ..prior
        };
        let planned = RepositoryState {
            remote_url: str_value("git@github.com:acme/warehouse.git"),
            pull_request_url_template: str_value("https://github.com/acme/pr"),
            ..prior.clone()
        };
        let paths = RepositoryResource.requires_replace(&prior, &planned);
        assert_eq!(paths, vec![AttributePath::new("remote_url")]);
    }

    #[tokio::test]
    async fn deploy_key_only_when_requested() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/accounts/1/projects/3/repositories/"))
            .and(body_partial_json(json!({"git_clone_strategy": "deploy_key"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": remote()})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v3/accounts/1/projects/3/repositories/8/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": remote()})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let state = RepositoryResource
            .create(&client, &planned(true))
            .await
            .unwrap();
        assert_eq!(state.id, str_value("3:8"));
        assert_eq!(state.deploy_key, str_value("ssh-rsa AAAA"));
        assert_eq!(state.repository_credentials_id, Value::Value(21));
        assert!(state.pull_request_url_template.is_null());

        let state = RepositoryResource
            .create(&client, &planned(false))
            .await
            .unwrap();
        assert!(state.deploy_key.is_null());
    }
}
