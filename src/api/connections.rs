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

//! Project connection endpoints (`v3 projects/{project_id}/connections/`)
//!
//! A connection stores its warehouse settings in `details`, whose shape
//! depends on the connection `type`. Snowflake, Redshift and Postgres have a
//! native shape while Databricks and Fabric go through the legacy `adapter`
//! type, discriminated by `adapter_version`.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::client::{state_active, DbtCloudClient, Result, STATE_DELETED};

use super::AdapterFields;

pub const DATABRICKS_ADAPTER: &str = "databricks_v0";
pub const FABRIC_ADAPTER: &str = "fabric_v0";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Connection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub account_id: i64,
    pub project_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub connection_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_id: Option<i64>,
    #[serde(default)]
    pub private_link_endpoint_id: Option<String>,
    #[serde(default = "state_active")]
    pub state: i64,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SnowflakeDetails {
    pub account: String,
    pub database: String,
    pub warehouse: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub allow_sso: bool,
    #[serde(default)]
    pub client_session_keep_alive: bool,
    #[serde(default)]
    pub oauth_client_id: Option<String>,
    #[serde(default)]
    pub oauth_client_secret: Option<String>,
}

/// Details of Postgres compatible warehouses
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WarehouseDetails {
    pub hostname: String,
    pub dbname: String,
    pub port: i64,
    #[serde(default)]
    pub tunnel_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatabricksDetails {
    pub host: String,
    pub http_path: String,
    pub catalog: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FabricDetails {
    pub server: String,
    pub port: i64,
    pub database: String,
    pub retries: i64,
    pub login_timeout: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionDetails {
    Snowflake(SnowflakeDetails),
    Redshift(WarehouseDetails),
    Postgres(WarehouseDetails),
    Databricks(DatabricksDetails),
    Fabric(FabricDetails),
}

#[derive(Serialize, Deserialize, Default)]
struct AdapterDetails {
    #[serde(default)]
    connection_details: AdapterFields,
}

impl ConnectionDetails {
    /// Connection type as exposed to Terraform users
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionDetails::Snowflake(_) => "snowflake",
            ConnectionDetails::Redshift(_) => "redshift",
            ConnectionDetails::Postgres(_) => "postgres",
            ConnectionDetails::Databricks(_) => "databricks",
            ConnectionDetails::Fabric(_) => "fabric",
        }
    }

    /// Wire `type`, `adapter_version` and `details`
    fn to_wire(&self) -> serde_json::Result<(&'static str, Option<&'static str>, serde_json::Value)> {
        Ok(match self {
            ConnectionDetails::Snowflake(details) => {
                ("snowflake", None, serde_json::to_value(details)?)
            }
            ConnectionDetails::Redshift(details) => {
                ("redshift", None, serde_json::to_value(details)?)
            }
            ConnectionDetails::Postgres(details) => {
                ("postgres", None, serde_json::to_value(details)?)
            }
            ConnectionDetails::Databricks(details) => {
                let mut fields = AdapterFields::default();
                fields.insert("type", "databricks");
                fields.insert("host", details.host.as_str());
                fields.insert("http_path", details.http_path.as_str());
                fields.insert_opt("catalog", details.catalog.clone());
                (
                    "adapter",
                    Some(DATABRICKS_ADAPTER),
                    serde_json::to_value(AdapterDetails {
                        connection_details: fields,
                    })?,
                )
            }
            ConnectionDetails::Fabric(details) => {
                let mut fields = AdapterFields::default();
                fields.insert("server", details.server.as_str());
                fields.insert("port", details.port);
                fields.insert("database", details.database.as_str());
                fields.insert("retries", details.retries);
                fields.insert("login_timeout", details.login_timeout);
                (
                    "adapter",
                    Some(FABRIC_ADAPTER),
                    serde_json::to_value(AdapterDetails {
                        connection_details: fields,
                    })?,
                )
            }
        })
    }

    fn from_wire(
        connection_type: &str,
        adapter_version: Option<&str>,
        details: serde_json::Value,
    ) -> anyhow::Result<Self> {
        let parse_context = || format!("invalid details for a `{connection_type}` connection");
        Ok(match (connection_type, adapter_version) {
            ("snowflake", _) => Self::Snowflake(serde_json::from_value(details).with_context(parse_context)?),
            ("redshift", _) => Self::Redshift(serde_json::from_value(details).with_context(parse_context)?),
            ("postgres", _) => Self::Postgres(serde_json::from_value(details).with_context(parse_context)?),
            ("adapter", Some(DATABRICKS_ADAPTER)) => {
                let fields = adapter_fields(details).with_context(parse_context)?;
                Self::Databricks(DatabricksDetails {
                    host: fields.str("host").unwrap_or_default(),
                    http_path: fields.str("http_path").unwrap_or_default(),
                    catalog: fields.str("catalog"),
                })
            }
            ("adapter", Some(FABRIC_ADAPTER)) => {
                let fields = adapter_fields(details).with_context(parse_context)?;
                Self::Fabric(FabricDetails {
                    server: fields.str("server").unwrap_or_default(),
                    port: fields.num("port").unwrap_or_default(),
                    database: fields.str("database").unwrap_or_default(),
                    retries: fields.num("retries").unwrap_or_default(),
                    login_timeout: fields.num("login_timeout").unwrap_or_default(),
                })
            }
            (connection_type, adapter_version) => bail!(
                "Unsupported connection type `{connection_type}` (adapter `{}`)",
                adapter_version.unwrap_or("none")
            ),
        })
    }
}

fn adapter_fields(details: serde_json::Value) -> serde_json::Result<AdapterFields> {
    if details.is_null() {
        return Ok(Default::default());
    }
    serde_json::from_value::<AdapterDetails>(details).map(|details| details.connection_details)
}

impl Connection {
    pub fn new(
        account_id: i64,
        project_id: i64,
        name: String,
        details: &ConnectionDetails,
    ) -> serde_json::Result<Self> {
        let (connection_type, adapter_version, details) = details.to_wire()?;
        Ok(Self {
            account_id,
            project_id,
            name,
            connection_type: connection_type.to_owned(),
            adapter_version: adapter_version.map(ToOwned::to_owned),
            details,
            ..Default::default()
        })
    }

    pub fn details(&self) -> anyhow::Result<ConnectionDetails> {
        ConnectionDetails::from_wire(
            &self.connection_type,
            self.adapter_version.as_deref(),
            self.details.clone(),
        )
    }
}

impl DbtCloudClient {
    fn connection_url(&self, project_id: i64, connection_id: i64) -> String {
        self.v3_url(&format!("projects/{project_id}/connections/{connection_id}/"))
    }

    pub async fn create_connection(&self, connection: &Connection) -> Result<Connection> {
        let url = self.v3_url(&format!("projects/{}/connections/", connection.project_id));
        self.post(&url, connection).await
    }

    pub async fn get_connection(
        &self,
        project_id: i64,
        connection_id: i64,
    ) -> Result<Option<Connection>> {
        Ok(self
            .get_optional::<Connection>(&self.connection_url(project_id, connection_id))
            .await?
            .filter(|connection| connection.state != STATE_DELETED))
    }

    pub async fn update_connection(
        &self,
        connection_id: i64,
        connection: &Connection,
    ) -> Result<Connection> {
        let url = self.connection_url(connection.project_id, connection_id);
        self.post(&url, connection).await
    }

    pub async fn delete_connection(&self, project_id: i64, connection_id: i64) -> Result<()> {
        self.soft_delete(&self.connection_url(project_id, connection_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn databricks_uses_legacy_adapter() {
        let details = ConnectionDetails::Databricks(DatabricksDetails {
            host: "dbc.cloud.databricks.com".into(),
            http_path: "/sql/1.0/warehouses/abc".into(),
            catalog: None,
        });
        let connection = Connection::new(1, 2, "lake".into(), &details).unwrap();
        assert_eq!(connection.connection_type, "adapter");
        assert_eq!(connection.adapter_version.as_deref(), Some(DATABRICKS_ADAPTER));
        assert_eq!(
            connection.details["connection_details"]["fields"]["type"]["value"],
            "databricks"
        );
        assert!(connection.details["connection_details"]["fields"]
            .get("catalog")
            .is_none());
        assert_eq!(connection.details().unwrap(), details);
    }

    #[test]
    fn snowflake_details_are_native() {
        let connection: Connection = serde_json::from_value(json!({
            "id": 3,
            "project_id": 2,
            "name": "sf",
            "type": "snowflake",
            "state": 1,
            "details": {
                "account": "acme",
                "database": "analytics",
                "warehouse": "transforming",
                "role": null,
                "allow_sso": true,
                "client_session_keep_alive": false,
            },
        }))
        .unwrap();
        let ConnectionDetails::Snowflake(details) = connection.details().unwrap() else {
            panic!("expected a snowflake connection");
        };
        assert_eq!(details.account, "acme");
        assert!(details.allow_sso);
        assert!(details.oauth_client_secret.is_none());
    }

    #[test]
    fn fabric_reads_string_numbers() {
        let details = json!({"connection_details": {"fields": {
            "server": {"value": "fabric.example.com"},
            "port": {"value": "1433"},
            "database": {"value": "dw"},
            "retries": {"value": 3},
            "login_timeout": {"value": 0},
        }}});
        let details =
            ConnectionDetails::from_wire("adapter", Some(FABRIC_ADAPTER), details).unwrap();
        assert_eq!(
            details,
            ConnectionDetails::Fabric(FabricDetails {
                server: "fabric.example.com".into(),
                port: 1433,
                database: "dw".into(),
                retries: 3,
                login_timeout: 0,
            })
        );
    }

    #[test]
    fn unknown_adapters_are_rejected() {
        let err = ConnectionDetails::from_wire("adapter", Some("spark_v0"), json!({})).unwrap_err();
        assert!(err.to_string().contains("spark_v0"));
    }
}
