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

//! Terraform resources backed by the dbt Cloud API
//!
//! Every resource implements [`ApiResource`] and is exposed to Terraform
//! through the generic [`DbtResource`] adapter.

use std::collections::HashMap;
use std::fmt::Debug;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Schema};
use tf_provider::value::ValueEmpty;
use tf_provider::{AttributePath, DataSource, Diagnostics, Resource};
use tracing::{debug, warn};

use crate::client::{ClientHandle, DbtCloudClient};

pub mod connection;
pub mod credentials;
pub mod environment;
pub mod job;
pub mod project;
pub mod project_link;
pub mod repository;
pub mod service_token;
pub mod user_groups;
pub mod webhook;

#[async_trait]
pub trait ApiResource: Send + Sync + 'static + Default {
    /// Resource type without the provider prefix
    const NAME: &'static str;
    type State<'a>: Send
        + Sync
        + Clone
        + Debug
        + Default
        + Serialize
        + for<'de> Deserialize<'de>;

    fn schema() -> Schema;

    /// Check a configuration, unknown values must be accepted
    fn validate(&self, diags: &mut Diagnostics, config: &Self::State<'_>) {
        _ = diags;
        _ = config;
    }

    /// Fill defaults and computed values of a planned state
    ///
    /// `prior` is `None` when the resource is about to be created.
    fn plan<'a>(
        &self,
        diags: &mut Diagnostics,
        prior: Option<&Self::State<'a>>,
        state: &mut Self::State<'a>,
    );

    /// Attributes whose change cannot be applied in place
    fn requires_replace(
        &self,
        prior: &Self::State<'_>,
        planned: &Self::State<'_>,
    ) -> Vec<AttributePath> {
        _ = prior;
        _ = planned;
        Vec::new()
    }

    async fn create<'a>(
        &self,
        client: &DbtCloudClient,
        planned: &Self::State<'a>,
    ) -> Result<Self::State<'a>>;

    /// Refresh a state, `None` when the remote object is gone
    async fn read<'a>(
        &self,
        client: &DbtCloudClient,
        state: &Self::State<'a>,
    ) -> Result<Option<Self::State<'a>>>;

    async fn update<'a>(
        &self,
        client: &DbtCloudClient,
        prior: &Self::State<'a>,
        planned: &Self::State<'a>,
    ) -> Result<Self::State<'a>>;

    async fn delete<'a>(&self, client: &DbtCloudClient, state: &Self::State<'a>) -> Result<()>;

    /// Skeleton state from an import id, completed by a subsequent read
    fn import<'a>(&self, id: &str) -> Result<Self::State<'a>>;
}

/// A resource that can also be looked up as a data source
pub trait ApiDataSource: ApiResource {
    /// Attributes the user sets to find the object
    const LOOKUP_KEYS: &'static [&'static str];

    /// State that `read` accepts, built from the lookup keys
    fn lookup<'a>(&self, config: &Self::State<'a>) -> Result<Self::State<'a>>;
}

#[derive(Debug, Default)]
pub struct DbtResource<R: ApiResource> {
    client: ClientHandle,
    resource: R,
}

impl<R: ApiResource> DbtResource<R> {
    pub fn new(client: ClientHandle) -> Self {
        Self {
            client,
            resource: R::default(),
        }
    }
}

fn report(diags: &mut Diagnostics, op: &str, name: &str, err: anyhow::Error) {
    warn!(resource = name, error = %format!("{err:#}"), "failed to {op}");
    diags.root_error(format!("Failed to {op} dbtcloud_{name}"), format!("{err:#}"));
}

#[async_trait]
impl<R> Resource for DbtResource<R>
where
    R: ApiResource + Debug,
{
    type State<'a> = R::State<'a>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(R::schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        self.resource.validate(diags, &config);

        if diags.errors.is_empty() {
            Some(())
        } else {
            None
        }
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags)?;
        debug!(resource = R::NAME, "read");

        match self.resource.read(&client, &state).await {
            Ok(Some(state)) => Some((state, private_state)),
            Ok(None) => {
                // A missing state tells Terraform the object must be recreated
                diags.root_warning(
                    "Resource not found, removing from state",
                    format!("dbtcloud_{} no longer exists in dbt Cloud", R::NAME),
                );
                None
            }
            Err(err) => {
                report(diags, "read", R::NAME, err);
                Some((state, private_state))
            }
        }
    }

    async fn plan_create<'a>(
        &self,
        diags: &mut Diagnostics,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut state = proposed_state;
        self.resource.plan(diags, None, &mut state);

        Some((state, Default::default()))
    }

    async fn plan_update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>, Vec<AttributePath>)> {
        let mut state = proposed_state;
        self.resource.plan(diags, Some(&prior_state), &mut state);
        let trigger_replace = self.resource.requires_replace(&prior_state, &state);

        Some((state, prior_private_state, trigger_replace))
    }

    async fn plan_destroy<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::PrivateState<'a>> {
        Some(prior_private_state)
    }

    async fn create<'a>(
        &self,
        diags: &mut Diagnostics,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags)?;
        debug!(resource = R::NAME, "create");

        match self.resource.create(&client, &planned_state).await {
            Ok(state) => Some((state, planned_private_state)),
            Err(err) => {
                report(diags, "create", R::NAME, err);
                None
            }
        }
    }

    async fn update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags)?;
        debug!(resource = R::NAME, "update");

        match self
            .resource
            .update(&client, &prior_state, &planned_state)
            .await
        {
            Ok(state) => Some((state, planned_private_state)),
            Err(err) => {
                report(diags, "update", R::NAME, err);
                None
            }
        }
    }

    async fn destroy<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        _planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<()> {
        let client = self.client.get(diags)?;
        debug!(resource = R::NAME, "delete");

        match self.resource.delete(&client, &prior_state).await {
            Ok(()) => Some(()),
            Err(err) => {
                report(diags, "delete", R::NAME, err);
                None
            }
        }
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        debug!(resource = R::NAME, id, "import");
        match self.resource.import(&id) {
            Ok(state) => Some((state, Default::default())),
            Err(err) => {
                report(diags, "import", R::NAME, err);
                None
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct DbtDataSource<R: ApiDataSource> {
    client: ClientHandle,
    resource: R,
}

impl<R: ApiDataSource> DbtDataSource<R> {
    pub fn new(client: ClientHandle) -> Self {
        Self {
            client,
            resource: R::default(),
        }
    }
}

#[async_trait]
impl<R> DataSource for DbtDataSource<R>
where
    R: ApiDataSource + Debug,
{
    type State<'a> = R::State<'a>;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        let mut schema = R::schema();
        schema.block.attributes = lookup_attributes(schema.block.attributes, R::LOOKUP_KEYS);
        Some(schema)
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        config: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::State<'a>> {
        let client = self.client.get(diags)?;
        debug!(data_source = R::NAME, "read");

        let found = match self.resource.lookup(&config) {
            Ok(state) => self.resource.read(&client, &state).await,
            Err(err) => Err(err),
        };
        match found {
            Ok(Some(state)) => Some(state),
            Ok(None) => {
                diags.root_error(
                    format!("dbtcloud_{} not found", R::NAME),
                    format!("No object matches {}", R::LOOKUP_KEYS.join(", ")),
                );
                None
            }
            Err(err) => {
                report(diags, "read", R::NAME, err);
                None
            }
        }
    }
}

/// Make the lookup keys required and every other attribute computed
fn lookup_attributes(
    attributes: HashMap<String, Attribute>,
    keys: &[&str],
) -> HashMap<String, Attribute> {
    attributes
        .into_iter()
        .map(|(name, attr)| {
            let attr = if keys.contains(&name.as_str()) {
                Attribute {
                    constraint: AttributeConstraint::Required,
                    ..attr
                }
            } else {
                computed_attribute(attr)
            };
            (name, attr)
        })
        .collect()
}

fn computed_attribute(attr: Attribute) -> Attribute {
    let attr_type = match attr.attr_type {
        AttributeType::AttributeSingle(nested) => {
            AttributeType::AttributeSingle(computed_nested(nested))
        }
        AttributeType::AttributeList(nested) => AttributeType::AttributeList(computed_nested(nested)),
        AttributeType::AttributeSet(nested) => AttributeType::AttributeSet(computed_nested(nested)),
        AttributeType::AttributeMap(nested) => AttributeType::AttributeMap(computed_nested(nested)),
        attr_type => attr_type,
    };
    Attribute {
        attr_type,
        constraint: AttributeConstraint::Computed,
        ..attr
    }
}

fn computed_nested(nested: HashMap<String, Attribute>) -> HashMap<String, Attribute> {
    nested
        .into_iter()
        .map(|(name, attr)| (name, computed_attribute(attr)))
        .collect()
}
