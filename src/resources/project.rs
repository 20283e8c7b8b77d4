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
use tf_provider::value::{Value, ValueNumber, ValueString};
use tf_provider::Diagnostics;

use crate::api::projects::Project;
use crate::client::{DbtCloudClient, STATE_ACTIVE};
use crate::id;
use crate::utils::{attribute, computed, non_empty_value, opt_str, req_str, schema, str_value};

use super::{ApiDataSource, ApiResource};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProjectState<'a> {
    pub id: ValueString<'a>,
    pub project_id: ValueNumber,
    pub name: ValueString<'a>,
    pub description: ValueString<'a>,
    pub dbt_project_subdirectory: ValueString<'a>,
}

impl<'a> ProjectState<'a> {
    fn from_api(project: Project) -> Result<Self> {
        let project_id = project
            .id
            .ok_or_else(|| anyhow!("dbt Cloud returned a project without id"))?;
        Ok(Self {
            id: str_value(project_id.to_string()),
            project_id: Value::Value(project_id),
            name: str_value(project.name),
            description: non_empty_value(project.description),
            dbt_project_subdirectory: non_empty_value(project.dbt_project_subdirectory),
        })
    }

    fn project_id(&self) -> Result<i64> {
        let [project_id] = id::decode(&req_str(&self.id, "id")?, "project_id")?;
        Ok(project_id)
    }
}

#[derive(Debug, Default)]
pub struct ProjectResource;

#[async_trait]
impl ApiResource for ProjectResource {
    const NAME: &'static str = "project";
    type State<'a> = ProjectState<'a>;

    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Optional, Required};
        schema(
            "A dbt Cloud project",
            map! {
                "id" => attribute(AttributeType::String, Computed, "ID of the project"),
                "project_id" => attribute(AttributeType::Number, Computed, "Numeric ID of the project"),
                "name" => attribute(AttributeType::String, Required, "Name of the project"),
                "description" => attribute(AttributeType::String, Optional, "Description of the project"),
                "dbt_project_subdirectory" => attribute(
                    AttributeType::String,
                    Optional,
                    "Subdirectory of the repository holding `dbt_project.yml`",
                ),
            },
        )
    }

    fn plan<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior: Option<&ProjectState<'a>>,
        state: &mut ProjectState<'a>,
    ) {
        computed(&mut state.id);
        computed(&mut state.project_id);
    }

    async fn create<'a>(
        &self,
        client: &DbtCloudClient,
        planned: &ProjectState<'a>,
    ) -> Result<ProjectState<'a>> {
        let project = Project {
            account_id: client.account_id(),
            name: req_str(&planned.name, "name")?,
            description: opt_str(&planned.description),
            dbt_project_subdirectory: opt_str(&planned.dbt_project_subdirectory),
            state: STATE_ACTIVE,
            ..Default::default()
        };
        ProjectState::from_api(client.create_project(&project).await?)
    }

    async fn read<'a>(
        &self,
        client: &DbtCloudClient,
        state: &ProjectState<'a>,
    ) -> Result<Option<ProjectState<'a>>> {
        client
            .get_project(state.project_id()?)
            .await?
            .map(ProjectState::from_api)
            .transpose()
    }

    async fn update<'a>(
        &self,
        client: &DbtCloudClient,
        prior: &ProjectState<'a>,
        planned: &ProjectState<'a>,
    ) -> Result<ProjectState<'a>> {
        let project_id = prior.project_id()?;
        // Links to connections and repositories are managed elsewhere and must survive
        let current = client
            .get_project(project_id)
            .await?
            .ok_or_else(|| anyhow!("project {project_id} no longer exists"))?;
        let project = Project {
            name: req_str(&planned.name, "name")?,
            description: opt_str(&planned.description),
            dbt_project_subdirectory: opt_str(&planned.dbt_project_subdirectory),
            ..current
        };
        ProjectState::from_api(client.update_project(project_id, &project).await?)
    }

    async fn delete<'a>(&self, client: &DbtCloudClient, state: &ProjectState<'a>) -> Result<()> {
        Ok(client.delete_project(state.project_id()?).await?)
    }

    fn import<'a>(&self, id: &str) -> Result<ProjectState<'a>> {
        let [project_id] = id::decode(id, "project_id")?;
        Ok(ProjectState {
            id: str_value(project_id.to_string()),
            project_id: Value::Value(project_id),
            ..Default::default()
        })
    }
}

impl ApiDataSource for ProjectResource {
    const LOOKUP_KEYS: &'static [&'static str] = &["project_id"];

    fn lookup<'a>(&self, config: &Self::State<'a>) -> Result<Self::State<'a>> {
        let project_id = config
            .project_id
            .as_ref_option()
            .ok_or_else(|| anyhow!("`project_id` must be known"))?;
        self.import(&project_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_client;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn project_json(name: &str, connection_id: Option<i64>) -> serde_json::Value {
        json!({
            "id": 12,
            "account_id": 1,
            "name": name,
            "description": "",
            "dbt_project_subdirectory": "analytics",
            "connection_id": connection_id,
            "repository_id": null,
            "state": 1,
        })
    }

    #[tokio::test]
    async fn create_posts_project() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/accounts/1/projects/"))
            .and(body_partial_json(json!({"name": "Analytics", "account_id": 1, "state": 1})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"data": project_json("Analytics", None)})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let planned = ProjectState {
            name: str_value("Analytics"),
            ..Default::default()
        };
        let state = ProjectResource.create(&client, &planned).await.unwrap();
        assert_eq!(state.id, str_value("12"));
        assert_eq!(state.project_id, Value::Value(12));
        assert!(state.description.is_null());
        assert_eq!(state.dbt_project_subdirectory, str_value("analytics"));
    }

    #[tokio::test]
    async fn deleted_project_reads_as_gone() {
        let server = MockServer::start().await;
        let mut deleted = project_json("Analytics", None);
        deleted["state"] = json!(2);
        Mock::given(method("GET"))
            .and(path("/v3/accounts/1/projects/12/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": deleted})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let state = ProjectResource.import("12").unwrap();
        assert!(ProjectResource.read(&client, &state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_keeps_connection_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/accounts/1/projects/12/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": project_json("Old", Some(5))})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/accounts/1/projects/12/"))
            .and(body_partial_json(json!({"name": "New", "connection_id": 5})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": project_json("New", Some(5))})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let prior = ProjectResource.import("12").unwrap();
        let planned = ProjectState {
            name: str_value("New"),
            ..prior.clone()
        };
        let state = ProjectResource.update(&client, &prior, &planned).await.unwrap();
        assert_eq!(state.name, str_value("New"));
    }

    #[test]
    fn import_rejects_composite_ids() {
        assert!(ProjectResource.import("1:2").is_err());
    }

    #[test]
    fn plan_marks_ids_unknown_on_create() {
        let mut state = ProjectState {
            name: str_value("Analytics"),
            ..Default::default()
        };
        ProjectResource.plan(&mut Diagnostics::default(), None, &mut state);
        assert!(state.id.is_unknown());
        assert!(state.project_id.is_unknown());
    }

    #[test]
    fn lookup_starts_from_project_id() {
        let config = ProjectState {
            project_id: Value::Value(12),
            ..Default::default()
        };
        let state = ProjectResource.lookup(&config).unwrap();
        assert_eq!(state.id, str_value("12"));
        assert_eq!(state.project_id, Value::Value(12));
        assert!(ProjectResource.lookup(&ProjectState::default()).is_err());
    }
}
