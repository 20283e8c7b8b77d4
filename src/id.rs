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

//! Composite identifiers: several numeric keys joined by [`DELIMITER`]

use anyhow::{anyhow, bail, Result};

use crate::utils::DisplayJoinable;

pub const DELIMITER: &str = ":";

/// Join the numeric keys of a resource into a Terraform id
pub fn encode(parts: &[i64]) -> String {
    parts.iter().join_with(DELIMITER).to_string()
}

/// Split a Terraform id into exactly `N` numeric keys
///
/// `format` is only used to describe the expected layout in error messages,
/// e.g. `project_id:environment_id`.
pub fn decode<const N: usize>(id: &str, format: &str) -> Result<[i64; N]> {
    let parts = id.split(DELIMITER).collect::<Vec<_>>();
    if parts.len() != N {
        bail!("Invalid ID `{id}`: expected the format `{format}`");
    }

    let mut keys = [0; N];
    for (key, part) in keys.iter_mut().zip(parts) {
        if part.trim() != part {
            bail!("Invalid ID `{id}`: `{part}` has surrounding whitespace (expected `{format}`)");
        }
        *key = part
            .parse()
            .map_err(|_| anyhow!("Invalid ID `{id}`: `{part}` is not a number (expected `{format}`)"))?;
    }
    Ok(keys)
}
