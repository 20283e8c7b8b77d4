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
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType};
use tf_provider::value::{Value, ValueBool, ValueNumber, ValueString};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::client::ClientSettings;
use crate::utils::{attribute, sensitive};

pub const DEFAULT_HOST_URL: &str = "https://cloud.getdbt.com/api";
pub const DEFAULT_MAX_RETRIES: i64 = 3;
pub const DEFAULT_RETRY_INTERVAL_SECONDS: i64 = 10;
pub const DEFAULT_TIMEOUT_SECONDS: i64 = 30;

pub mod env {
    pub const TOKEN: &str = "DBT_CLOUD_TOKEN";
    pub const ACCOUNT_ID: &str = "DBT_CLOUD_ACCOUNT_ID";
    pub const HOST_URL: &str = "DBT_CLOUD_HOST_URL";
    pub const MAX_RETRIES: &str = "DBT_CLOUD_MAX_RETRIES";
    pub const RETRY_INTERVAL_SECONDS: &str = "DBT_CLOUD_RETRY_INTERVAL_SECONDS";
    pub const TIMEOUT_SECONDS: &str = "DBT_CLOUD_TIMEOUT_SECONDS";
}

/// Content of the `provider "dbtcloud"` block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig<'a> {
    #[serde(borrow = "'a")]
    pub token: ValueString<'a>,
    pub account_id: ValueNumber,
    pub host_url: ValueString<'a>,
    pub max_retries: ValueNumber,
    pub retry_interval_seconds: ValueNumber,
    pub timeout_seconds: ValueNumber,
    pub skip_credentials_validation: ValueBool,
}

impl<'a> ProviderConfig<'a> {
    pub fn attributes() -> HashMap<String, Attribute> {
        use AttributeConstraint::Optional;
        map! {
            "token" => sensitive(attribute(
                AttributeType::String,
                Optional,
                "API token of a dbt Cloud user or service token. Defaults to `DBT_CLOUD_TOKEN`",
            )),
            "account_id" => attribute(
                AttributeType::Number,
                Optional,
                "dbt Cloud account ID. Defaults to `DBT_CLOUD_ACCOUNT_ID`",
            ),
            "host_url" => attribute(
                AttributeType::String,
                Optional,
                "URL of the dbt Cloud API, e.g. `https://cloud.getdbt.com/api`. Defaults to `DBT_CLOUD_HOST_URL`",
            ),
            "max_retries" => attribute(
                AttributeType::Number,
                Optional,
                "Number of retries of rate limited or failed requests. Defaults to `DBT_CLOUD_MAX_RETRIES` or 3",
            ),
            "retry_interval_seconds" => attribute(
                AttributeType::Number,
                Optional,
                "Seconds between two retries. Defaults to `DBT_CLOUD_RETRY_INTERVAL_SECONDS` or 10",
            ),
            "timeout_seconds" => attribute(
                AttributeType::Number,
                Optional,
                "Timeout of a single request. Defaults to `DBT_CLOUD_TIMEOUT_SECONDS` or 30",
            ),
            "skip_credentials_validation" => attribute(
                AttributeType::Bool,
                Optional,
                "Do not check the token against the account when configuring the provider",
            ),
        }
    }

    pub fn validate(&self, diags: &mut Diagnostics) {
        let non_negative = [
            ("max_retries", &self.max_retries),
            ("retry_interval_seconds", &self.retry_interval_seconds),
        ];
        for (name, value) in non_negative {
            if let Value::Value(value) = value {
                if *value < 0 {
                    diags.error_short(format!("`{name}` must not be negative"), AttributePath::new(name));
                }
            }
        }
        if let Value::Value(timeout) = self.timeout_seconds {
            if timeout <= 0 {
                diags.error_short(
                    "`timeout_seconds` must be positive",
                    AttributePath::new("timeout_seconds"),
                );
            }
        }
        if let Value::Value(host_url) = &self.host_url {
            validate_host_url(diags, host_url);
        }
    }

    /// Resolve the settings of the client from the block and the environment
    pub fn resolve(&self, diags: &mut Diagnostics) -> Option<ClientSettings> {
        self.resolve_with(diags, |name| std::env::var(name).ok())
    }

    pub fn resolve_with<F>(&self, diags: &mut Diagnostics, lookup: F) -> Option<ClientSettings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = self
            .token
            .as_deref_option()
            .map(ToOwned::to_owned)
            .or_else(|| lookup(env::TOKEN).filter(|token| !token.is_empty()));
        let host_url = self
            .host_url
            .as_deref_option()
            .map(ToOwned::to_owned)
            .or_else(|| lookup(env::HOST_URL).filter(|url| !url.is_empty()))
            .unwrap_or_else(|| DEFAULT_HOST_URL.to_owned());
        validate_host_url(diags, &host_url);

        let account_id = number(diags, &self.account_id, env::ACCOUNT_ID, &lookup);
        let max_retries = number(diags, &self.max_retries, env::MAX_RETRIES, &lookup)
            .unwrap_or(DEFAULT_MAX_RETRIES);
        let retry_interval = number(
            diags,
            &self.retry_interval_seconds,
            env::RETRY_INTERVAL_SECONDS,
            &lookup,
        )
        .unwrap_or(DEFAULT_RETRY_INTERVAL_SECONDS);
        let timeout = number(diags, &self.timeout_seconds, env::TIMEOUT_SECONDS, &lookup)
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);

        if token.is_none() {
            diags.error(
                "Missing dbt Cloud token",
                format!("Set `token` in the provider block or the `{}` environment variable.", env::TOKEN),
                AttributePath::new("token"),
            );
        }
        if account_id.is_none() {
            diags.error(
                "Missing dbt Cloud account ID",
                format!(
                    "Set `account_id` in the provider block or the `{}` environment variable.",
                    env::ACCOUNT_ID
                ),
                AttributePath::new("account_id"),
            );
        }
        if !diags.errors.is_empty() {
            return None;
        }

        Some(ClientSettings {
            token: token?,
            account_id: account_id?,
            host_url: host_url.trim_end_matches('/').to_owned(),
            max_retries: u32::try_from(max_retries).unwrap_or(0),
            retry_interval: Duration::from_secs(u64::try_from(retry_interval).unwrap_or(0)),
            timeout: Duration::from_secs(u64::try_from(timeout).unwrap_or(1).max(1)),
        })
    }
}

fn validate_host_url(diags: &mut Diagnostics, host_url: &str) {
    if !host_url.starts_with("https://") && !host_url.starts_with("http://") {
        diags.error(
            "Invalid `host_url`",
            format!("`{host_url}` must start with `https://` or `http://`"),
            AttributePath::new("host_url"),
        );
    }
}

fn number<F>(diags: &mut Diagnostics, value: &ValueNumber, var: &str, lookup: &F) -> Option<i64>
where
    F: Fn(&str) -> Option<String>,
{
    if let Value::Value(value) = value {
        return Some(*value);
    }
    let raw = lookup(var).filter(|raw| !raw.is_empty())?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            diags.root_error(
                format!("Invalid `{var}` environment variable"),
                format!("`{raw}` is not a number"),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::str_value;

    fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            vars.iter()
                .find(|(var, _)| *var == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn block_wins_over_environment() {
        let config = ProviderConfig {
            token: str_value("from-block"),
            account_id: Value::Value(7),
            ..Default::default()
        };
        let mut diags = Diagnostics::default();
        let settings = config
            .resolve_with(
                &mut diags,
                lookup(&[(env::TOKEN, "from-env"), (env::ACCOUNT_ID, "9")]),
            )
            .unwrap();
        assert_eq!(settings.token, "from-block");
        assert_eq!(settings.account_id, 7);
        assert_eq!(settings.host_url, DEFAULT_HOST_URL);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.retry_interval, Duration::from_secs(10));
    }

    #[test]
    fn environment_fills_missing_values() {
        let mut diags = Diagnostics::default();
        let settings = ProviderConfig::default()
            .resolve_with(
                &mut diags,
                lookup(&[
                    (env::TOKEN, "from-env"),
                    (env::ACCOUNT_ID, "9"),
                    (env::HOST_URL, "https://emea.dbt.com/api/"),
                    (env::MAX_RETRIES, "0"),
                ]),
            )
            .unwrap();
        assert_eq!(settings.token, "from-env");
        assert_eq!(settings.account_id, 9);
        assert_eq!(settings.host_url, "https://emea.dbt.com/api");
        assert_eq!(settings.max_retries, 0);
    }

    #[test]
    fn missing_credentials_are_reported() {
        let mut diags = Diagnostics::default();
        assert!(ProviderConfig::default()
            .resolve_with(&mut diags, lookup(&[]))
            .is_none());
        assert_eq!(diags.errors.len(), 2);
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let mut diags = Diagnostics::default();
        assert!(ProviderConfig::default()
            .resolve_with(
                &mut diags,
                lookup(&[(env::TOKEN, "t"), (env::ACCOUNT_ID, "abc")]),
            )
            .is_none());
        assert!(!diags.errors.is_empty());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = ProviderConfig {
            host_url: str_value("cloud.getdbt.com"),
            max_retries: Value::Value(-1),
            timeout_seconds: Value::Value(0),
            ..Default::default()
        };
        let mut diags = Diagnostics::default();
        config.validate(&mut diags);
        assert_eq!(diags.errors.len(), 3);
    }
}
