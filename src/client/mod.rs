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

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tf_provider::Diagnostics;
use tracing::{debug, warn};

mod error;

pub use error::{ApiError, Result};

/// `state` of a live object
pub const STATE_ACTIVE: i64 = 1;
/// `state` of a deleted object
pub const STATE_DELETED: i64 = 2;

pub(crate) fn state_active() -> i64 {
    STATE_ACTIVE
}

/// Resolved connection settings of the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub token: String,
    pub account_id: i64,
    pub host_url: String,
    pub max_retries: u32,
    pub retry_interval: Duration,
    pub timeout: Duration,
}

/// Every successful dbt Cloud response wraps its payload in `data`
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize, Default)]
struct ErrorEnvelope {
    #[serde(default)]
    status: ErrorStatus,
}

#[derive(Deserialize, Default)]
struct ErrorStatus {
    #[serde(default)]
    user_message: Option<String>,
    #[serde(default)]
    developer_message: Option<String>,
}

/// dbt Cloud API client
pub struct DbtCloudClient {
    http: reqwest::Client,
    token: String,
    account_id: i64,
    host_url: String,
    max_retries: u32,
    retry_interval: Duration,
}

impl std::fmt::Debug for DbtCloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbtCloudClient")
            .field("account_id", &self.account_id)
            .field("host_url", &self.host_url)
            .field("max_retries", &self.max_retries)
            .field("retry_interval", &self.retry_interval)
            .finish_non_exhaustive()
    }
}

impl DbtCloudClient {
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(
                "terraform-provider-dbtcloud/",
                env!("CARGO_PKG_VERSION")
            ))
            .connect_timeout(settings.timeout.min(Duration::from_secs(10)))
            .timeout(settings.timeout)
            .build()
            .map_err(|err| ApiError::Config(err.to_string()))?;

        Ok(Self {
            http,
            token: settings.token,
            account_id: settings.account_id,
            host_url: settings.host_url.trim_end_matches('/').to_owned(),
            max_retries: settings.max_retries,
            retry_interval: settings.retry_interval,
        })
    }

    pub fn account_id(&self) -> i64 {
        self.account_id
    }

    /// URL of an account scoped v2 endpoint
    pub(crate) fn v2_url(&self, path: &str) -> String {
        format!("{}/v2/accounts/{}/{}", self.host_url, self.account_id, path)
    }

    /// URL of an account scoped v3 endpoint
    pub(crate) fn v3_url(&self, path: &str) -> String {
        format!("{}/v3/accounts/{}/{}", self.host_url, self.account_id, path)
    }

    /// Fail when the token cannot access the configured account
    pub async fn check_credentials(&self) -> Result<()> {
        self.get::<serde_json::Value>(&self.v2_url("")).await?;
        Ok(())
    }

    async fn execute<B>(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Response>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut attempt = 0;
        loop {
            let mut request = self
                .http
                .request(method.clone(), url)
                .header(AUTHORIZATION, format!("Token {}", self.token))
                .header(ACCEPT, "application/json")
                .header(CONTENT_TYPE, "application/json");
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(%method, url, attempt, "dbt Cloud request");
            let delay = match request.send().await {
                Ok(response) if attempt < self.max_retries && is_retryable(response.status()) => {
                    warn!(%method, url, status = %response.status(), "retrying dbt Cloud request");
                    retry_after(&response).unwrap_or(self.retry_interval)
                }
                Ok(response) => return Ok(response),
                Err(err) if attempt < self.max_retries && (err.is_timeout() || err.is_connect()) => {
                    warn!(%method, url, error = %err, "retrying dbt Cloud request");
                    self.retry_interval
                }
                Err(err) => return Err(err.into()),
            };
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn parse<T: DeserializeOwned>(response: Response, context: &str) -> Result<T> {
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        serde_json::from_slice::<Envelope<T>>(&body)
            .map(|envelope| envelope.data)
            .map_err(|source| ApiError::Decode {
                context: context.to_owned(),
                source,
            })
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_optional(url).await?.ok_or_else(|| ApiError::Api {
            status: StatusCode::NOT_FOUND.as_u16(),
            message: format!("{url} not found"),
        })
    }

    /// GET an object, `None` when the API answers 404
    pub async fn get_optional<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        self.get_optional_with_query(url, &[]).await
    }

    pub async fn get_optional_with_query<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let response = self
            .execute::<()>(Method::GET, url, query, None)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::parse(response, url).await.map(Some)
    }

    pub async fn post<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self.execute(Method::POST, url, &[], Some(body)).await?;
        Self::parse(response, url).await
    }

    pub async fn put<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self.execute(Method::PUT, url, &[], Some(body)).await?;
        Self::parse(response, url).await
    }

    /// Hard delete, an already missing object is not an error
    pub async fn delete(&self, url: &str) -> Result<()> {
        let response = self
            .execute::<()>(Method::DELETE, url, &[], None)
            .await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.bytes().await?;
        Err(ApiError::Api {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    /// Delete an object by posting it back with `state = 2`
    pub async fn soft_delete(&self, url: &str) -> Result<()> {
        let Some(mut object) = self.get_optional::<serde_json::Value>(url).await? else {
            return Ok(());
        };
        let Some(fields) = object.as_object_mut() else {
            return Err(ApiError::Decode {
                context: url.to_owned(),
                source: serde::de::Error::custom("expected an object before soft delete"),
            });
        };
        if fields.get("state").and_then(serde_json::Value::as_i64) == Some(STATE_DELETED) {
            return Ok(());
        }
        fields.insert("state".to_owned(), STATE_DELETED.into());
        self.post::<_, serde_json::Value>(url, &object).await?;
        Ok(())
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}

fn error_message(body: &[u8]) -> String {
    let status = serde_json::from_slice::<ErrorEnvelope>(body)
        .unwrap_or_default()
        .status;
    status
        .user_message
        .filter(|msg| !msg.is_empty())
        .or(status.developer_message.filter(|msg| !msg.is_empty()))
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

/// Client shared between the provider and its resources
///
/// Resources are instantiated before Terraform configures the provider, so
/// they hold this handle and fetch the client when they need it.
#[derive(Debug, Clone, Default)]
pub struct ClientHandle(Arc<RwLock<Option<Arc<DbtCloudClient>>>>);

impl ClientHandle {
    pub fn set(&self, client: DbtCloudClient) {
        if let Ok(mut guard) = self.0.write() {
            *guard = Some(Arc::new(client));
        }
    }

    pub fn get(&self, diags: &mut Diagnostics) -> Option<Arc<DbtCloudClient>> {
        let client = self.0.read().ok().and_then(|guard| guard.clone());
        if client.is_none() {
            diags.root_error(
                "Provider not configured",
                "The dbtcloud provider must be configured before its resources can be used.",
            );
        }
        client
    }
}

#[cfg(test)]
pub(crate) fn test_client(uri: &str) -> DbtCloudClient {
    DbtCloudClient::new(ClientSettings {
        token: "test-token".into(),
        account_id: 1,
        host_url: uri.into(),
        max_retries: 2,
        retry_interval: Duration::ZERO,
        timeout: Duration::from_secs(5),
    })
    .expect("test client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn urls_are_account_scoped() {
        let client = test_client("http://dbt.local/api/");
        assert_eq!(
            client.v3_url("projects/"),
            "http://dbt.local/api/v3/accounts/1/projects/"
        );
        assert_eq!(client.v2_url("jobs/3/"), "http://dbt.local/api/v2/accounts/1/jobs/3/");
    }

    #[test]
    fn debug_hides_token() {
        let client = test_client("http://dbt.local/api");
        assert!(!format!("{client:?}").contains("test-token"));
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::NOT_IMPLEMENTED));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn error_message_prefers_user_message() {
        let body = json!({"status": {"user_message": "Bad", "developer_message": "dev"}});
        assert_eq!(error_message(body.to_string().as_bytes()), "Bad");
        let body = json!({"status": {"user_message": "", "developer_message": "dev"}});
        assert_eq!(error_message(body.to_string().as_bytes()), "dev");
        assert_eq!(error_message(b"gateway down"), "gateway down");
    }

    #[tokio::test]
    async fn get_unwraps_data_and_sends_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/accounts/1/projects/5/"))
            .and(header("Authorization", "Token test-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": {}, "data": {"id": 5}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let data: serde_json::Value = client.get(&client.v3_url("projects/5/")).await.unwrap();
        assert_eq!(data["id"], 5);
    }

    #[tokio::test]
    async fn get_optional_maps_404_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let data: Option<serde_json::Value> = client
            .get_optional(&client.v3_url("projects/5/"))
            .await
            .unwrap();
        assert!(data.is_none());
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": 1})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let data: i64 = client.get(&client.v2_url("")).await.unwrap();
        assert_eq!(data, 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .get::<serde_json::Value>(&client.v2_url(""))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn api_errors_carry_user_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                json!({"status": {"code": 400, "is_success": false, "user_message": "Name taken"}}),
            ))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .post::<_, serde_json::Value>(&client.v3_url("projects/"), &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "dbt Cloud API error (status 400): Name taken");
    }

    #[tokio::test]
    async fn soft_delete_posts_deleted_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/accounts/1/projects/5/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"id": 5, "name": "p", "state": 1}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/accounts/1/projects/5/"))
            .and(body_partial_json(json!({"id": 5, "name": "p", "state": 2})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"id": 5, "name": "p", "state": 2}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client
            .soft_delete(&client.v3_url("projects/5/"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn soft_delete_rejects_non_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/accounts/1/projects/5/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [5]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .soft_delete(&client.v3_url("projects/5/"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }), "{err}");
    }

    #[tokio::test]
    async fn handle_requires_configuration() {
        let handle = ClientHandle::default();
        let mut diags = Diagnostics::default();
        assert!(handle.get(&mut diags).is_none());
        assert_eq!(diags.errors.len(), 1);

        handle.set(test_client("http://dbt.local/api"));
        let mut diags = Diagnostics::default();
        assert!(handle.get(&mut diags).is_some());
        assert!(diags.errors.is_empty());
    }
}
