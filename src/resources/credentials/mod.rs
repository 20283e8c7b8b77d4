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

//! Warehouse credentials used by environments
//!
//! Secrets are write only: dbt Cloud never returns them, so a refreshed state
//! keeps the secret values of the prior state.

use anyhow::{anyhow, Result};
use tf_provider::value::ValueString;

use crate::api::credentials::Credential;
use crate::id;
use crate::utils::req_str;

pub mod databricks;
pub mod postgres;
pub mod snowflake;

pub use databricks::DatabricksCredentialResource;
pub use postgres::PostgresCredentialResource;
pub use snowflake::SnowflakeCredentialResource;

const ID_FORMAT: &str = "project_id:credential_id";

fn keys(id: &ValueString<'_>) -> Result<(i64, i64)> {
    let [project_id, credential_id] = id::decode(&req_str(id, "id")?, ID_FORMAT)?;
    Ok((project_id, credential_id))
}

fn import_keys(id: &str) -> Result<(String, i64, i64)> {
    let [project_id, credential_id] = id::decode(id, ID_FORMAT)?;
    Ok((id::encode(&[project_id, credential_id]), project_id, credential_id))
}

fn credential_id(credential: &Credential) -> Result<i64> {
    credential
        .id
        .ok_or_else(|| anyhow!("dbt Cloud returned a credential without id"))
}
