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
use tf_provider::value::{Value, ValueBool, ValueList, ValueNumber, ValueString};
use tf_provider::{AttributePath, Diagnostics};

use crate::api::webhooks::Webhook;
use crate::client::DbtCloudClient;
use crate::utils::{
    attribute, bool_or, computed, default_to, non_empty_value, num_list, num_list_value,
    number_list, opt_str, opt_str_value, req_str, schema, sensitive, str_list, str_list_value,
    str_value, string_list, validate_one_of,
};

use super::ApiResource;

pub const EVENT_TYPES: &[&str] = &["job.run.started", "job.run.completed", "job.run.errored"];

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct WebhookState<'a> {
    pub id: ValueString<'a>,
    pub webhook_id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub description: ValueString<'a>,
    pub client_url: ValueString<'a>,
    pub event_types: ValueList<ValueString<'a>>,
    pub job_ids: ValueList<ValueNumber>,
    pub active: ValueBool,
    pub hmac_secret: ValueString<'a>,
    pub http_status_code: ValueString<'a>,
    pub account_identifier: ValueString<'a>,
}

impl<'a> WebhookState<'a> {
    fn webhook_id(&self) -> Result<String> {
        req_str(&self.id, "id")
    }

    fn to_api(&self) -> Result<Webhook> {
        Ok(Webhook {
            name: req_str(&self.name, "name")?,
            description: opt_str(&self.description),
            client_url: req_str(&self.client_url, "client_url")?,
            event_types: str_list(&self.event_types),
            job_ids: num_list(&self.job_ids),
            active: bool_or(&self.active, true),
            ..Default::default()
        })
    }

    fn from_api(webhook: Webhook, prior: &Self) -> Result<Self> {
        let http_status_code = webhook.http_status_code();
        let webhook_id = webhook
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("dbt Cloud returned a webhook without id"))?;
        // The secret is only part of the creation response
        let hmac_secret = match webhook.hmac_secret {
            Some(secret) if !secret.is_empty() => str_value(secret),
            _ => prior.hmac_secret.clone(),
        };
        let job_ids = if webhook.job_ids.is_empty() && prior.job_ids.is_null() {
            Value::Null
        } else {
            num_list_value(webhook.job_ids)
        };
        Ok(Self {
            id: str_value(webhook_id.clone()),
            webhook_id: str_value(webhook_id),
            name: str_value(webhook.name),
            description: non_empty_value(webhook.description),
            client_url: str_value(webhook.client_url),
            event_types: str_list_value(webhook.event_types),
            job_ids,
            active: Value::Value(webhook.active),
            hmac_secret: match hmac_secret {
                Value::Unknown => Value::Null,
                secret => secret,
            },
            http_status_code: opt_str_value(http_status_code),
            account_identifier: non_empty_value(webhook.account_identifier),
        })
    }
}

#[derive(Debug, Default)]
pub struct WebhookResource;

#[async_trait]
impl ApiResource for WebhookResource {
    const NAME: &'static str = "webhook";
    type State<'a> = WebhookState<'a>;

    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};
        schema(
            "Webhook subscription notified of job run events",
            map! {
                "id" => attribute(AttributeType::String, Computed, "ID of the webhook"),
                "webhook_id" => attribute(AttributeType::String, Computed, "ID of the webhook"),
                "name" => attribute(AttributeType::String, Required, "Name of the webhook"),
                "description" => attribute(AttributeType::String, Optional, "Description of the webhook"),
                "client_url" => attribute(AttributeType::String, Required, "HTTPS endpoint receiving the events"),
                "event_types" => attribute(
                    string_list(),
                    Required,
                    "Events sent: `job.run.started`, `job.run.completed` or `job.run.errored`",
                ),
                "job_ids" => attribute(number_list(), Optional, "Jobs to notify about, every job when empty"),
                "active" => attribute(AttributeType::Bool, OptionalComputed, "Whether events are sent, true by default"),
                "hmac_secret" => sensitive(attribute(
                    AttributeType::String,
                    Computed,
                    "Secret used to sign the events",
                )),
                "http_status_code" => attribute(
                    AttributeType::String,
                    Computed,
                    "Status code of the last delivery",
                ),
                "account_identifier" => attribute(AttributeType::String, Computed, "Account identifier"),
            },
        )
    }

    fn validate(&self, diags: &mut Diagnostics, config: &WebhookState<'_>) {
        if let Value::Value(url) = &config.client_url {
            if !url.starts_with("https://") {
                diags.error(
                    "Invalid client_url",
                    format!("`{url}` must be an https URL"),
                    AttributePath::new("client_url"),
                );
            }
        }
        for (i, event_type) in config.event_types.iter().flatten().enumerate() {
            validate_one_of(
                diags,
                AttributePath::new("event_types").index(i as i64),
                event_type,
                EVENT_TYPES,
            );
        }
    }

    fn plan<'a>(
        &self,
        _diags: &mut Diagnostics,
        prior: Option<&WebhookState<'a>>,
        state: &mut WebhookState<'a>,
    ) {
        computed(&mut state.id);
        computed(&mut state.webhook_id);
        computed(&mut state.account_identifier);
        default_to(&mut state.active, true);
        // The last delivery status moves on its own between refresh and apply
        state.http_status_code = Value::Unknown;
        match prior {
            Some(prior) => state.hmac_secret = prior.hmac_secret.clone(),
            None => computed(&mut state.hmac_secret),
        }
    }

    async fn create<'a>(
        &self,
        client: &DbtCloudClient,
        planned: &WebhookState<'a>,
    ) -> Result<WebhookState<'a>> {
        let created = client.create_webhook(&planned.to_api()?).await?;
        WebhookState::from_api(created, planned)
    }

    async fn read<'a>(
        &self,
        client: &DbtCloudClient,
        state: &WebhookState<'a>,
    ) -> Result<Option<WebhookState<'a>>> {
        client
            .get_webhook(&state.webhook_id()?)
            .await?
            .map(|webhook| WebhookState::from_api(webhook, state))
            .transpose()
    }

    async fn update<'a>(
        &self,
        client: &DbtCloudClient,
        prior: &WebhookState<'a>,
        planned: &WebhookState<'a>,
    ) -> Result<WebhookState<'a>> {
        let webhook_id = prior.webhook_id()?;
        let updated = client
            .update_webhook(&webhook_id, &planned.to_api()?)
            .await?;
        WebhookState::from_api(updated, planned)
    }

    async fn delete<'a>(&self, client: &DbtCloudClient, state: &WebhookState<'a>) -> Result<()> {
        Ok(client.delete_webhook(&state.webhook_id()?).await?)
    }

    fn import<'a>(&self, id: &str) -> Result<WebhookState<'a>> {
        if id.is_empty() || id.contains(char::is_whitespace) {
            bail!("Invalid webhook id `{id}`");
        }
        Ok(WebhookState {
            id: str_value(id),
            webhook_id: str_value(id),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_client;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn planned() -> WebhookState<'static> {
        let mut state = WebhookState {
            name: str_value("alerts"),
            client_url: str_value("https://hooks.example.com/dbt"),
            event_types: str_list_value(vec!["job.run.errored".into()]),
            job_ids: num_list_value(vec![12]),
            ..Default::default()
        };
        WebhookResource.plan(&mut Diagnostics::default(), None, &mut state);
        state
    }

    #[test]
    fn url_and_events_are_checked() {
        let mut diags = Diagnostics::default();
        WebhookResource.validate(&mut diags, &planned());
        assert!(diags.errors.is_empty());

        let config = WebhookState {
            client_url: str_value("http://hooks.example.com"),
            event_types: str_list_value(vec!["job.run.errored".into(), "job.deleted".into()]),
            ..planned()
        };
        let mut diags = Diagnostics::default();
        WebhookResource.validate(&mut diags, &config);
        assert_eq!(diags.errors.len(), 2);
    }

    #[tokio::test]
    async fn secret_survives_later_reads() {
        let server = MockServer::start().await;
        let remote = json!({
            "id": "wsu_abc",
            "account_identifier": "act_1",
            "name": "alerts",
            "description": "",
            "client_url": "https://hooks.example.com/dbt",
            "event_types": ["job.run.errored"],
            "job_ids": ["12"],
            "active": true,
            "http_status_code": 200,
        });
        let mut created = remote.clone();
        created["hmac_secret"] = json!("s3cr3t");
        Mock::given(method("POST"))
            .and(path("/v3/accounts/1/webhooks/subscriptions"))
            .and(body_partial_json(json!({"job_ids": ["12"], "active": true})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": created})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v3/accounts/1/webhooks/subscription/wsu_abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": remote})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let state = WebhookResource.create(&client, &planned()).await.unwrap();
        assert_eq!(state.id, str_value("wsu_abc"));
        assert_eq!(state.hmac_secret, str_value("s3cr3t"));
        assert_eq!(state.http_status_code, str_value("200"));
        assert!(state.description.is_null());

        let state = WebhookResource.read(&client, &state).await.unwrap().unwrap();
        assert_eq!(state.hmac_secret, str_value("s3cr3t"));
        assert_eq!(state.job_ids, num_list_value(vec![12]));
    }

    #[tokio::test]
    async fn update_takes_latest_delivery_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v3/accounts/1/webhooks/subscription/wsu_abc"))
            .and(body_partial_json(json!({"name": "renamed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {
                "id": "wsu_abc",
                "account_identifier": "act_1",
                "name": "renamed",
                "description": "",
                "client_url": "https://hooks.example.com/dbt",
                "event_types": ["job.run.errored"],
                "job_ids": ["12"],
                "active": true,
                "http_status_code": 503,
            }})))
            .expect(1)
            .mount(&server)
            .await;

        let prior = WebhookState {
            id: str_value("wsu_abc"),
            webhook_id: str_value("wsu_abc"),
            hmac_secret: str_value("s3cr3t"),
            http_status_code: str_value("200"),
            account_identifier: str_value("act_1"),
            ..planned()
        };
        let mut state = WebhookState {
            name: str_value("renamed"),
            ..prior.clone()
        };
        WebhookResource.plan(&mut Diagnostics::default(), Some(&prior), &mut state);
        assert!(state.http_status_code.is_unknown());
        assert_eq!(state.hmac_secret, str_value("s3cr3t"));

        let client = test_client(&server.uri());
        let state = WebhookResource.update(&client, &prior, &state).await.unwrap();
        assert_eq!(state.http_status_code, str_value("503"));
        assert_eq!(state.hmac_secret, str_value("s3cr3t"));
        assert_eq!(state.name, str_value("renamed"));
    }

    #[tokio::test]
    async fn missing_webhook_is_gone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/accounts/1/webhooks/subscription/wsu_abc"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let state = WebhookResource.import("wsu_abc").unwrap();
        assert!(WebhookResource.read(&client, &state).await.unwrap().is_none());
    }
}
