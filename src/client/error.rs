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

use std::fmt;

/// Error raised by the dbt Cloud API client
#[derive(Debug)]
pub enum ApiError {
    /// The HTTP request could not be sent or its body not received
    Http(reqwest::Error),
    /// The API answered with a non-success status code
    Api { status: u16, message: String },
    /// The body of a successful response could not be decoded
    Decode {
        context: String,
        source: serde_json::Error,
    },
    /// The client could not be built
    Config(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Http(err) => write!(f, "HTTP request failed: {err}"),
            ApiError::Api { status, message } => {
                write!(f, "dbt Cloud API error (status {status}): {message}")
            }
            ApiError::Decode { context, source } => {
                write!(f, "Failed to decode the response of {context}: {source}")
            }
            ApiError::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Http(err) => Some(err),
            ApiError::Decode { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Http(err)
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = ApiError::Api {
            status: 400,
            message: "Invalid name".into(),
        };
        assert_eq!(
            err.to_string(),
            "dbt Cloud API error (status 400): Invalid name"
        );
    }
}
