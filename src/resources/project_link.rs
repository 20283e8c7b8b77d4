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

//! Links between a project and its connection or repository
//!
//! A link has no remote object of its own: it is a field of the project,
//! set by re-posting the project and cleared on delete.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::map;
use tf_provider::schema::{AttributeConstraint, AttributeType, Schema};
use tf_provider::value::{Value, ValueNumber, ValueString};
use tf_provider::{AttributePath, Diagnostics};

use crate::api::projects::Project;
use crate::client::DbtCloudClient;
use crate::id;
use crate::utils::{attribute, computed, replace_on_change, req_num, req_str, schema, str_value};

use super::ApiResource;

/// Field of the project a link points at
#[derive(Debug, Clone, Copy)]
enum Target {
    Connection,
    Repository,
}

impl Target {
    fn get(self, project: &Project) -> Option<i64> {
        match self {
            Target::Connection => project.connection_id,
            Target::Repository => project.repository_id,
        }
    }

    fn set(self, project: &mut Project, target_id: Option<i64>) {
        match self {
            Target::Connection => project.connection_id = target_id,
            Target::Repository => project.repository_id = target_id,
        }
    }
}

/// Point `project_id` at `target_id`, or detach it when `None`
async fn link(
    client: &DbtCloudClient,
    target: Target,
    project_id: i64,
    target_id: Option<i64>,
) -> Result<Project> {
    let mut project = client
        .get_project(project_id)
        .await?
        .ok_or_else(|| anyhow!("project {project_id} not found"))?;
    target.set(&mut project, target_id);
    Ok(client.update_project(project_id, &project).await?)
}

/// Whether the project still points at `target_id`
async fn is_linked(
    client: &DbtCloudClient,
    target: Target,
    project_id: i64,
    target_id: i64,
) -> Result<bool> {
    let project = client.get_project(project_id).await?;
    Ok(project.is_some_and(|project| target.get(&project) == Some(target_id)))
}

fn link_schema(description: &str, target: &'static str) -> Schema {
    use AttributeConstraint::{Computed, Required};
    schema(
        description,
        map! {
            "id" => attribute(AttributeType::String, Computed, &format!("`project_id:{target}`")),
            "project_id" => attribute(AttributeType::Number, Required, "Project to link"),
            target => attribute(AttributeType::Number, Required, "Object linked to the project"),
        },
    )
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProjectConnectionState<'a> {
    pub id: ValueString<'a>,
    pub project_id: ValueNumber,
    pub connection_id: ValueNumber,
}

#[derive(Debug, Default)]
pub struct ProjectConnectionResource;

#[async_trait]
impl ApiResource for ProjectConnectionResource {
    const NAME: &'static str = "project_connection";
    type State<'a> = ProjectConnectionState<'a>;

    fn schema() -> Schema {
        link_schema("Connection used by a dbt Cloud project", "connection_id")
    }

    fn plan<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior: Option<&ProjectConnectionState<'a>>,
        state: &mut ProjectConnectionState<'a>,
    ) {
        computed(&mut state.id);
    }

    fn requires_replace(
        &self,
        prior: &ProjectConnectionState<'_>,
        planned: &ProjectConnectionState<'_>,
    ) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_on_change(&mut paths, "project_id", &prior.project_id, &planned.project_id);
        replace_on_change(&mut paths, "connection_id", &prior.connection_id, &planned.connection_id);
        paths
    }

    async fn create<'a>(
        &self,
        client: &DbtCloudClient,
        planned: &ProjectConnectionState<'a>,
    ) -> Result<ProjectConnectionState<'a>> {
        let project_id = req_num(&planned.project_id, "project_id")?;
        let connection_id = req_num(&planned.connection_id, "connection_id")?;
        link(client, Target::Connection, project_id, Some(connection_id)).await?;
        Ok(ProjectConnectionState {
            id: str_value(id::encode(&[project_id, connection_id])),
            project_id: Value::Value(project_id),
            connection_id: Value::Value(connection_id),
        })
    }

    async fn read<'a>(
        &self,
        client: &DbtCloudClient,
        state: &ProjectConnectionState<'a>,
    ) -> Result<Option<ProjectConnectionState<'a>>> {
        let [project_id, connection_id] =
            id::decode(&req_str(&state.id, "id")?, "project_id:connection_id")?;
        let linked = is_linked(client, Target::Connection, project_id, connection_id).await?;
        Ok(linked.then(|| state.clone()))
    }

    async fn update<'a>(
        &self,
        client: &DbtCloudClient,
        _prior: &ProjectConnectionState<'a>,
        planned: &ProjectConnectionState<'a>,
    ) -> Result<ProjectConnectionState<'a>> {
        self.create(client, planned).await
    }

    async fn delete<'a>(
        &self,
        client: &DbtCloudClient,
        state: &ProjectConnectionState<'a>,
    ) -> Result<()> {
        let project_id = req_num(&state.project_id, "project_id")?;
        link(client, Target::Connection, project_id, None).await?;
        Ok(())
    }

    fn import<'a>(&self, id: &str) -> Result<ProjectConnectionState<'a>> {
        let [project_id, connection_id] = id::decode(id, "project_id:connection_id")?;
        Ok(ProjectConnectionState {
            id: str_value(id::encode(&[project_id, connection_id])),
            project_id: Value::Value(project_id),
            connection_id: Value::Value(connection_id),
        })
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProjectRepositoryState<'a> {
    pub id: ValueString<'a>,
    pub project_id: ValueNumber,
    pub repository_id: ValueNumber,
}

#[derive(Debug, Default)]
pub struct ProjectRepositoryResource;

#[async_trait]
impl ApiResource for ProjectRepositoryResource {
    const NAME: &'static str = "project_repository";
    type State<'a> = ProjectRepositoryState<'a>;

    fn schema() -> Schema {
        link_schema("Repository used by a dbt Cloud project", "repository_id")
    }

    fn plan<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior: Option<&ProjectRepositoryState<'a>>,
        state: &mut ProjectRepositoryState<'a>,
    ) {
        computed(&mut state.id);
    }

    fn requires_replace(
        &self,
        prior: &ProjectRepositoryState<'_>,
        planned: &ProjectRepositoryState<'_>,
    ) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_on_change(&mut paths, "project_id", &prior.project_id, &planned.project_id);
        replace_on_change(&mut paths, "repository_id", &prior.repository_id, &planned.repository_id);
        paths
    }

    async fn create<'a>(
        &self,
        client: &DbtCloudClient,
        planned: &ProjectRepositoryState<'a>,
    ) -> Result<ProjectRepositoryState<'a>> {
        let project_id = req_num(&planned.project_id, "project_id")?;
        let repository_id = req_num(&planned.repository_id, "repository_id")?;
        link(client, Target::Repository, project_id, Some(repository_id)).await?;
        Ok(ProjectRepositoryState {
            id: str_value(id::encode(&[project_id, repository_id])),
            project_id: Value::Value(project_id),
            repository_id: Value::Value(repository_id),
        })
    }

    async fn read<'a>(
        &self,
        client: &DbtCloudClient,
        state: &ProjectRepositoryState<'a>,
    ) -> Result<Option<ProjectRepositoryState<'a>>> {
        let [project_id, repository_id] =
            id::decode(&req_str(&state.id, "id")?, "project_id:repository_id")?;
        let linked = is_linked(client, Target::Repository, project_id, repository_id).await?;
        Ok(linked.then(|| state.clone()))
    }

    async fn update<'a>(
        &self,
        client: &DbtCloudClient,
        _prior: &ProjectRepositoryState<'a>,
        planned: &ProjectRepositoryState<'a>,
    ) -> Result<ProjectRepositoryState<'a>> {
        self.create(client, planned).await
    }

    async fn delete<'a>(
        &self,
        client: &DbtCloudClient,
        state: &ProjectRepositoryState<'a>,
    ) -> Result<()> {
        let project_id = req_num(&state.project_id, "project_id")?;
        link(client, Target::Repository, project_id, None).await?;
        Ok(())
    }

    fn import<'a>(&self, id: &str) -> Result<ProjectRepositoryState<'a>> {
        let [project_id, repository_id] = id::decode(id, "project_id:repository_id")?;
        Ok(ProjectRepositoryState {
            id: str_value(id::encode(&[project_id, repository_id])),
            project_id: Value::Value(project_id),
            repository_id: Value::Value(repository_id),
        })
    }
}
