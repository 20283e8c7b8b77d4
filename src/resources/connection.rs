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

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::map;
use tf_provider::schema::{AttributeConstraint, AttributeType, Schema};
use tf_provider::value::{Value, ValueBool, ValueNumber, ValueString};
use tf_provider::{AttributePath, Diagnostics};

use crate::api::connections::{
    Connection, ConnectionDetails, DatabricksDetails, FabricDetails, SnowflakeDetails,
    WarehouseDetails,
};
use crate::client::DbtCloudClient;
use crate::id;
use crate::utils::{
    attribute, bool_or, computed, default_to, non_empty_value, opt_num, opt_str, replace_on_change,
    req_num, req_str, schema, sensitive, str_value, validate_one_of, DisplayJoinable,
};

use super::ApiResource;

pub const CONNECTION_TYPES: &[&str] = &["snowflake", "redshift", "postgres", "databricks", "fabric"];

/// Attributes that only make sense for some connection types
const TYPE_FIELDS: &[(&str, &[&str])] = &[
    ("account", &["snowflake"]),
    ("warehouse", &["snowflake"]),
    ("role", &["snowflake"]),
    ("allow_sso", &["snowflake"]),
    ("client_session_keep_alive", &["snowflake"]),
    ("oauth_client_id", &["snowflake"]),
    ("oauth_client_secret", &["snowflake"]),
    ("database", &["snowflake", "redshift", "postgres", "fabric"]),
    ("host_name", &["redshift", "postgres", "databricks"]),
    ("port", &["redshift", "postgres", "fabric"]),
    ("tunnel_enabled", &["redshift", "postgres"]),
    ("http_path", &["databricks"]),
    ("catalog", &["databricks"]),
    ("server", &["fabric"]),
    ("retries", &["fabric"]),
    ("login_timeout", &["fabric"]),
];

fn required_fields(kind: &str) -> &'static [&'static str] {
    match kind {
        "snowflake" => &["account", "database", "warehouse"],
        "redshift" | "postgres" => &["host_name", "database"],
        "databricks" => &["host_name", "http_path"],
        "fabric" => &["server", "database"],
        _ => &[],
    }
}

fn default_port(kind: &str) -> Option<i64> {
    match kind {
        "redshift" => Some(5439),
        "postgres" => Some(5432),
        "fabric" => Some(1433),
        _ => None,
    }
}

fn is_adapter(kind: &str) -> bool {
    matches!(kind, "databricks" | "fabric")
}

const DEFAULT_FABRIC_RETRIES: i64 = 1;
const DEFAULT_FABRIC_LOGIN_TIMEOUT: i64 = 0;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ConnectionState<'a> {
    pub id: ValueString<'a>,
    pub connection_id: ValueNumber,
    pub adapter_id: ValueNumber,
    pub project_id: ValueNumber,
    pub name: ValueString<'a>,
    #[serde(rename = "type")]
    pub kind: ValueString<'a>,
    pub private_link_endpoint_id: ValueString<'a>,
    pub account: ValueString<'a>,
    pub database: ValueString<'a>,
    pub warehouse: ValueString<'a>,
    pub role: ValueString<'a>,
    pub allow_sso: ValueBool,
    pub client_session_keep_alive: ValueBool,
    pub oauth_client_id: ValueString<'a>,
    pub oauth_client_secret: ValueString<'a>,
    pub host_name: ValueString<'a>,
    pub port: ValueNumber,
    pub tunnel_enabled: ValueBool,
    pub http_path: ValueString<'a>,
    pub catalog: ValueString<'a>,
    pub server: ValueString<'a>,
    pub retries: ValueNumber,
    pub login_timeout: ValueNumber,
}

impl<'a> ConnectionState<'a> {
    fn keys(&self) -> Result<(i64, i64)> {
        let [project_id, connection_id] =
            id::decode(&req_str(&self.id, "id")?, "project_id:connection_id")?;
        Ok((project_id, connection_id))
    }

    /// Whether each type specific attribute is set, `None` when unknown
    fn field_presence(&self) -> [(&'static str, Option<bool>); 16] {
        fn presence<T>(value: &Value<T>) -> Option<bool> {
            match value {
                Value::Value(_) => Some(true),
                Value::Null => Some(false),
                Value::Unknown => None,
            }
        }
        [
            ("account", presence(&self.account)),
            ("warehouse", presence(&self.warehouse)),
            ("role", presence(&self.role)),
            ("allow_sso", presence(&self.allow_sso)),
            ("client_session_keep_alive", presence(&self.client_session_keep_alive)),
            ("oauth_client_id", presence(&self.oauth_client_id)),
            ("oauth_client_secret", presence(&self.oauth_client_secret)),
            ("database", presence(&self.database)),
            ("host_name", presence(&self.host_name)),
            ("port", presence(&self.port)),
            ("tunnel_enabled", presence(&self.tunnel_enabled)),
            ("http_path", presence(&self.http_path)),
            ("catalog", presence(&self.catalog)),
            ("server", presence(&self.server)),
            ("retries", presence(&self.retries)),
            ("login_timeout", presence(&self.login_timeout)),
        ]
    }

    fn details(&self) -> Result<ConnectionDetails> {
        let kind = req_str(&self.kind, "type")?;
        Ok(match kind.as_str() {
            "snowflake" => ConnectionDetails::Snowflake(SnowflakeDetails {
                account: req_str(&self.account, "account")?,
                database: req_str(&self.database, "database")?,
                warehouse: req_str(&self.warehouse, "warehouse")?,
                role: opt_str(&self.role),
                allow_sso: bool_or(&self.allow_sso, false),
                client_session_keep_alive: bool_or(&self.client_session_keep_alive, false),
                oauth_client_id: opt_str(&self.oauth_client_id),
                oauth_client_secret: opt_str(&self.oauth_client_secret),
            }),
            "redshift" | "postgres" => {
                let details = WarehouseDetails {
                    hostname: req_str(&self.host_name, "host_name")?,
                    dbname: req_str(&self.database, "database")?,
                    port: opt_num(&self.port)
                        .or_else(|| default_port(&kind))
                        .unwrap_or_default(),
                    tunnel_enabled: bool_or(&self.tunnel_enabled, false),
                };
                if kind == "redshift" {
                    ConnectionDetails::Redshift(details)
                } else {
                    ConnectionDetails::Postgres(details)
                }
            }
            "databricks" => ConnectionDetails::Databricks(DatabricksDetails {
                host: req_str(&self.host_name, "host_name")?,
                http_path: req_str(&self.http_path, "http_path")?,
                catalog: opt_str(&self.catalog),
            }),
            "fabric" => ConnectionDetails::Fabric(FabricDetails {
                server: req_str(&self.server, "server")?,
                port: opt_num(&self.port)
                    .or_else(|| default_port(&kind))
                    .unwrap_or_default(),
                database: req_str(&self.database, "database")?,
                retries: opt_num(&self.retries).unwrap_or(DEFAULT_FABRIC_RETRIES),
                login_timeout: opt_num(&self.login_timeout).unwrap_or(DEFAULT_FABRIC_LOGIN_TIMEOUT),
            }),
            kind => bail!("Unsupported connection type `{kind}`"),
        })
    }

    fn to_api(&self, account_id: i64) -> Result<Connection> {
        let mut connection = Connection::new(
            account_id,
            req_num(&self.project_id, "project_id")?,
            req_str(&self.name, "name")?,
            &self.details()?,
        )?;
        connection.private_link_endpoint_id = opt_str(&self.private_link_endpoint_id);
        Ok(connection)
    }

    /// State of a remote connection, secrets are taken from `prior`
    fn from_api(connection: Connection, prior: &Self) -> Result<Self> {
        let connection_id = connection
            .id
            .ok_or_else(|| anyhow!("dbt Cloud returned a connection without id"))?;
        let details = connection.details()?;
        let mut state = Self {
            id: str_value(id::encode(&[connection.project_id, connection_id])),
            connection_id: Value::Value(connection_id),
            adapter_id: if is_adapter(details.kind()) {
                connection.adapter_id.into()
            } else {
                Value::Null
            },
            project_id: Value::Value(connection.project_id),
            name: str_value(connection.name),
            kind: str_value(details.kind()),
            private_link_endpoint_id: non_empty_value(connection.private_link_endpoint_id),
            ..Default::default()
        };

        match details {
            ConnectionDetails::Snowflake(details) => {
                state.account = str_value(details.account);
                state.database = str_value(details.database);
                state.warehouse = str_value(details.warehouse);
                state.role = non_empty_value(details.role);
                state.allow_sso = Value::Value(details.allow_sso);
                state.client_session_keep_alive = Value::Value(details.client_session_keep_alive);
                state.oauth_client_id = non_empty_value(details.oauth_client_id)
                    .or(prior.oauth_client_id.clone());
                state.oauth_client_secret = prior.oauth_client_secret.clone();
            }
            ConnectionDetails::Redshift(details) | ConnectionDetails::Postgres(details) => {
                state.host_name = str_value(details.hostname);
                state.database = str_value(details.dbname);
                state.port = Value::Value(details.port);
                state.tunnel_enabled = Value::Value(details.tunnel_enabled);
            }
            ConnectionDetails::Databricks(details) => {
                state.host_name = str_value(details.host);
                state.http_path = str_value(details.http_path);
                state.catalog = non_empty_value(details.catalog);
            }
            ConnectionDetails::Fabric(details) => {
                state.server = str_value(details.server);
                state.port = Value::Value(details.port);
                state.database = str_value(details.database);
                state.retries = Value::Value(details.retries);
                state.login_timeout = Value::Value(details.login_timeout);
            }
        }
        Ok(state)
    }
}

#[derive(Debug, Default)]
pub struct ConnectionResource;

#[async_trait]
impl ApiResource for ConnectionResource {
    const NAME: &'static str = "connection";
    type State<'a> = ConnectionState<'a>;

    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};
        schema(
            "A warehouse connection of a dbt Cloud project.\n\n\
             The attributes to set depend on `type`; setting an attribute of another type is an error.",
            map! {
                "id" => attribute(AttributeType::String, Computed, "`project_id:connection_id`"),
                "connection_id" => attribute(AttributeType::Number, Computed, "ID of the connection"),
                "adapter_id" => attribute(
                    AttributeType::Number,
                    Computed,
                    "ID of the adapter of `databricks` and `fabric` connections",
                ),
                "project_id" => attribute(AttributeType::Number, Required, "Project of the connection"),
                "name" => attribute(AttributeType::String, Required, "Name of the connection"),
                "type" => attribute(
                    AttributeType::String,
                    Required,
                    "One of `snowflake`, `redshift`, `postgres`, `databricks` or `fabric`",
                ),
                "private_link_endpoint_id" => attribute(
                    AttributeType::String,
                    Optional,
                    "PrivateLink endpoint used to reach the warehouse",
                ),
                "account" => attribute(AttributeType::String, Optional, "Snowflake account"),
                "database" => attribute(AttributeType::String, Optional, "Database to connect to"),
                "warehouse" => attribute(AttributeType::String, Optional, "Snowflake warehouse"),
                "role" => attribute(AttributeType::String, Optional, "Snowflake role"),
                "allow_sso" => attribute(AttributeType::Bool, OptionalComputed, "Enable Snowflake SSO"),
                "client_session_keep_alive" => attribute(
                    AttributeType::Bool,
                    OptionalComputed,
                    "Keep Snowflake sessions alive",
                ),
                "oauth_client_id" => attribute(AttributeType::String, Optional, "Snowflake OAuth client ID"),
                "oauth_client_secret" => sensitive(attribute(
                    AttributeType::String,
                    Optional,
                    "Snowflake OAuth client secret",
                )),
                "host_name" => attribute(AttributeType::String, Optional, "Host of the warehouse"),
                "port" => attribute(
                    AttributeType::Number,
                    OptionalComputed,
                    "Port of the warehouse, 5439 for Redshift, 5432 for Postgres and 1433 for Fabric by default",
                ),
                "tunnel_enabled" => attribute(AttributeType::Bool, OptionalComputed, "Connect through an SSH tunnel"),
                "http_path" => attribute(AttributeType::String, Optional, "HTTP path of the Databricks cluster"),
                "catalog" => attribute(AttributeType::String, Optional, "Databricks Unity catalog"),
                "server" => attribute(AttributeType::String, Optional, "Fabric server"),
                "retries" => attribute(AttributeType::Number, OptionalComputed, "Fabric connection retries"),
                "login_timeout" => attribute(AttributeType::Number, OptionalComputed, "Fabric login timeout in seconds"),
            },
        )
    }

    fn validate(&self, diags: &mut Diagnostics, config: &ConnectionState<'_>) {
        validate_one_of(diags, AttributePath::new("type"), &config.kind, CONNECTION_TYPES);
        let Value::Value(kind) = &config.kind else {
            return;
        };
        let kind: &str = kind;
        if !CONNECTION_TYPES.contains(&kind) {
            return;
        }

        for (name, present) in config.field_presence() {
            let allowed = TYPE_FIELDS
                .iter()
                .find(|(field, _)| *field == name)
                .map(|(_, kinds)| *kinds)
                .unwrap_or_default();
            if present == Some(true) && !allowed.contains(&kind) {
                diags.error(
                    format!("`{name}` is not supported by `{kind}` connections"),
                    format!("`{name}` is only used by: {}", allowed.iter().join_with(", ")),
                    AttributePath::new(name),
                );
            }
            if present == Some(false) && required_fields(kind).contains(&name) {
                diags.error(
                    format!("Missing `{name}`"),
                    format!("`{name}` is required by `{kind}` connections"),
                    AttributePath::new(name),
                );
            }
        }
    }

    fn plan<'a>(
        &self,
        _diags: &mut Diagnostics,
        prior: Option<&ConnectionState<'a>>,
        state: &mut ConnectionState<'a>,
    ) {
        computed(&mut state.id);
        computed(&mut state.connection_id);

        let kind = state.kind.as_deref_option().unwrap_or_default().to_owned();
        match prior {
            Some(prior) if prior.kind == state.kind => state.adapter_id = prior.adapter_id,
            _ if is_adapter(&kind) || state.kind.is_unknown() => state.adapter_id = Value::Unknown,
            _ => state.adapter_id = Value::Null,
        }

        if let Some(port) = default_port(&kind) {
            default_to(&mut state.port, port);
        }
        match kind.as_str() {
            "snowflake" => {
                default_to(&mut state.allow_sso, false);
                default_to(&mut state.client_session_keep_alive, false);
            }
            "redshift" | "postgres" => default_to(&mut state.tunnel_enabled, false),
            "fabric" => {
                default_to(&mut state.retries, DEFAULT_FABRIC_RETRIES);
                default_to(&mut state.login_timeout, DEFAULT_FABRIC_LOGIN_TIMEOUT);
            }
            _ => (),
        }
    }

    fn requires_replace(
        &self,
        prior: &ConnectionState<'_>,
        planned: &ConnectionState<'_>,
    ) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_on_change(&mut paths, "project_id", &prior.project_id, &planned.project_id);
        replace_on_change(&mut paths, "type", &prior.kind, &planned.kind);
        paths
    }

    async fn create<'a>(
        &self,
        client: &DbtCloudClient,
        planned: &ConnectionState<'a>,
    ) -> Result<ConnectionState<'a>> {
        let connection = planned.to_api(client.account_id())?;
        let created = client.create_connection(&connection).await?;
        ConnectionState::from_api(created, planned)
    }

    async fn read<'a>(
        &self,
        client: &DbtCloudClient,
        state: &ConnectionState<'a>,
    ) -> Result<Option<ConnectionState<'a>>> {
        let (project_id, connection_id) = state.keys()?;
        client
            .get_connection(project_id, connection_id)
            .await?
            .map(|connection| ConnectionState::from_api(connection, state))
            .transpose()
    }

    async fn update<'a>(
        &self,
        client: &DbtCloudClient,
        prior: &ConnectionState<'a>,
        planned: &ConnectionState<'a>,
    ) -> Result<ConnectionState<'a>> {
        let (_, connection_id) = prior.keys()?;
        let connection = Connection {
            id: Some(connection_id),
            adapter_id: opt_num(&prior.adapter_id),
            ..planned.to_api(client.account_id())?
        };
        let updated = client.update_connection(connection_id, &connection).await?;
        ConnectionState::from_api(updated, planned)
    }

    async fn delete<'a>(&self, client: &DbtCloudClient, state: &ConnectionState<'a>) -> Result<()> {
        let (project_id, connection_id) = state.keys()?;
        Ok(client.delete_connection(project_id, connection_id).await?)
    }

    fn import<'a>(&self, id: &str) -> Result<ConnectionState<'a>> {
        let [project_id, connection_id] = id::decode(id, "project_id:connection_id")?;
        Ok(ConnectionState {
            id: str_value(id::encode(&[project_id, connection_id])),
            connection_id: Value::Value(connection_id),
            project_id: Value::Value(project_id),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::connections::DATABRICKS_ADAPTER;
    use crate::client::test_client;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn snowflake() -> ConnectionState<'static> {
        ConnectionState {
            project_id: Value::Value(3),
            name: str_value("Snowflake"),
            kind: str_value("snowflake"),
            account: str_value("acme"),
            database: str_value("analytics"),
            warehouse: str_value("transforming"),
            oauth_client_secret: str_value("s3cr3t"),
            ..Default::default()
        }
    }

    #[test]
    fn foreign_fields_are_rejected() {
        let mut diags = Diagnostics::default();
        ConnectionResource.validate(&mut diags, &snowflake());
        assert!(diags.errors.is_empty());

        let config = ConnectionState {
            http_path: str_value("/sql"),
            warehouse: Value::Null,
            ..snowflake()
        };
        let mut diags = Diagnostics::default();
        ConnectionResource.validate(&mut diags, &config);
        assert_eq!(diags.errors.len(), 2);
    }

    #[test]
    fn unknown_fields_are_accepted() {
        let config = ConnectionState {
            warehouse: Value::Unknown,
            ..snowflake()
        };
        let mut diags = Diagnostics::default();
        ConnectionResource.validate(&mut diags, &config);
        assert!(diags.errors.is_empty());
    }

    #[test]
    fn plan_defaults_port_per_type() {
        let mut state = ConnectionState {
            kind: str_value("redshift"),
            ..Default::default()
        };
        ConnectionResource.plan(&mut Diagnostics::default(), None, &mut state);
        assert_eq!(state.port, Value::Value(5439));
        assert_eq!(state.tunnel_enabled, Value::Value(false));
        assert!(state.adapter_id.is_null());

        let mut state = ConnectionState {
            kind: str_value("fabric"),
            ..Default::default()
        };
        ConnectionResource.plan(&mut Diagnostics::default(), None, &mut state);
        assert_eq!(state.port, Value::Value(1433));
        assert!(state.adapter_id.is_unknown());

        let mut state = snowflake();
        ConnectionResource.plan(&mut Diagnostics::default(), None, &mut state);
        assert!(state.port.is_null());
    }

    #[tokio::test]
    async fn databricks_round_trips_through_adapter() {
        let server = MockServer::start().await;
        let remote = json!({
            "id": 6,
            "account_id": 1,
            "project_id": 3,
            "name": "Lake",
            "type": "adapter",
            "adapter_version": DATABRICKS_ADAPTER,
            "adapter_id": 77,
            "state": 1,
            "details": {"connection_details": {"fields": {
                "type": {"value": "databricks"},
                "host": {"value": "dbc.cloud.databricks.com"},
                "http_path": {"value": "/sql/1.0/warehouses/abc"},
            }}},
        });
        Mock::given(method("POST"))
            .and(path("/v3/accounts/1/projects/3/connections/"))
            .and(body_partial_json(json!({"type": "adapter", "adapter_version": DATABRICKS_ADAPTER})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": remote})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let mut planned = ConnectionState {
            project_id: Value::Value(3),
            name: str_value("Lake"),
            kind: str_value("databricks"),
            host_name: str_value("dbc.cloud.databricks.com"),
            http_path: str_value("/sql/1.0/warehouses/abc"),
            ..Default::default()
        };
        ConnectionResource.plan(&mut Diagnostics::default(), None, &mut planned);
        let state = ConnectionResource.create(&client, &planned).await.unwrap();
        assert_eq!(state.id, str_value("3:6"));
        assert_eq!(state.kind, str_value("databricks"));
        assert_eq!(state.adapter_id, Value::Value(77));
        assert!(state.catalog.is_null());
    }

    #[tokio::test]
    async fn read_keeps_oauth_secret() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/accounts/1/projects/3/connections/6/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {
                "id": 6,
                "project_id": 3,
                "name": "Snowflake",
                "type": "snowflake",
                "state": 1,
                "details": {
                    "account": "acme",
                    "database": "analytics",
                    "warehouse": "transforming",
                    "allow_sso": false,
                    "client_session_keep_alive": false,
                },
            }})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let state = ConnectionState {
            id: str_value("3:6"),
            ..snowflake()
        };
        let state = ConnectionResource.read(&client, &state).await.unwrap().unwrap();
        assert_eq!(state.oauth_client_secret, str_value("s3cr3t"));
        assert_eq!(state.warehouse, str_value("transforming"));
        assert!(state.port.is_null());
    }

    #[test]
    fn type_change_forces_replacement() {
        let prior = snowflake();
        let planned = ConnectionState {
            kind: str_value("postgres"),
            ..snowflake()
        };
        assert_eq!(
            ConnectionResource.requires_replace(&prior, &planned),
            vec![AttributePath::new("type")]
        );
    }
}
