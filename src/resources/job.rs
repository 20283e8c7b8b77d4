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

use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::map;
use tf_provider::schema::{AttributeConstraint, AttributeType, Schema};
use tf_provider::value::{Value, ValueBool, ValueList, ValueNumber, ValueSet, ValueString};
use tf_provider::{AttributePath, Diagnostics};

use crate::api::jobs::{
    run_status_code, run_status_name, Job, JobCompletionCondition, JobCompletionTrigger,
    JobExecution, JobSchedule, JobSettings, JobTriggers, RUN_STATUSES, SCHEDULE_CUSTOM_CRON,
    SCHEDULE_DAYS_OF_WEEK, SCHEDULE_EVERY_DAY,
};
use crate::client::{DbtCloudClient, STATE_ACTIVE};
use crate::id;
use crate::utils::{
    attribute, bool_or, computed, default_to, non_empty_value, num_list, num_list_value, opt_num,
    opt_str, replace_on_change, req_num, req_str, schema, str_list, str_list_value, str_value,
    string_list, number_list, validate_conflicts_if, validate_one_of, validate_required_if,
};

use super::{ApiDataSource, ApiResource};

pub const SCHEDULE_TYPES: &[&str] = &[SCHEDULE_EVERY_DAY, SCHEDULE_DAYS_OF_WEEK, SCHEDULE_CUSTOM_CRON];
const DEFAULT_TARGET_NAME: &str = "default";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTriggersState {
    pub github_webhook: ValueBool,
    pub git_provider_webhook: ValueBool,
    pub schedule: ValueBool,
    pub on_merge: ValueBool,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionTriggerState<'a> {
    pub job_id: ValueNumber,
    pub project_id: ValueNumber,
    pub statuses: ValueSet<ValueString<'a>>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct JobState<'a> {
    pub id: ValueString<'a>,
    pub job_id: ValueNumber,
    pub project_id: ValueNumber,
    pub environment_id: ValueNumber,
    pub name: ValueString<'a>,
    pub description: ValueString<'a>,
    pub execute_steps: ValueList<ValueString<'a>>,
    pub dbt_version: ValueString<'a>,
    pub num_threads: ValueNumber,
    pub target_name: ValueString<'a>,
    pub generate_docs: ValueBool,
    pub run_generate_sources: ValueBool,
    pub triggers: Value<JobTriggersState>,
    pub schedule_type: ValueString<'a>,
    pub schedule_interval: ValueNumber,
    pub schedule_hours: ValueList<ValueNumber>,
    pub schedule_days: ValueList<ValueNumber>,
    pub schedule_cron: ValueString<'a>,
    pub deferring_environment_id: ValueNumber,
    pub self_deferring: ValueBool,
    pub timeout_seconds: ValueNumber,
    pub triggers_on_draft_pr: ValueBool,
    pub job_completion_trigger_condition: Value<CompletionTriggerState<'a>>,
}

impl<'a> JobState<'a> {
    fn job_id(&self) -> Result<i64> {
        let [job_id] = id::decode(&req_str(&self.id, "id")?, "job_id")?;
        Ok(job_id)
    }

    fn to_api(&self, account_id: i64, job_id: Option<i64>) -> Result<Job> {
        let triggers = self
            .triggers
            .as_ref_option()
            .ok_or_else(|| anyhow!("`triggers` must be known"))?;
        let schedule_type =
            opt_str(&self.schedule_type).unwrap_or_else(|| SCHEDULE_EVERY_DAY.to_owned());
        let schedule_cron = opt_str(&self.schedule_cron);
        let completion_trigger = match &self.job_completion_trigger_condition {
            Value::Value(condition) => Some(JobCompletionTrigger {
                condition: JobCompletionCondition {
                    job_id: req_num(&condition.job_id, "job_completion_trigger_condition.job_id")?,
                    project_id: req_num(
                        &condition.project_id,
                        "job_completion_trigger_condition.project_id",
                    )?,
                    statuses: condition
                        .statuses
                        .iter()
                        .flatten()
                        .filter_map(|status| run_status_code(status.as_deref_option()?))
                        .collect(),
                },
            }),
            _ => None,
        };

        Ok(Job {
            id: job_id,
            account_id,
            project_id: req_num(&self.project_id, "project_id")?,
            environment_id: req_num(&self.environment_id, "environment_id")?,
            name: req_str(&self.name, "name")?,
            description: opt_str(&self.description),
            execute_steps: str_list(&self.execute_steps),
            dbt_version: opt_str(&self.dbt_version),
            generate_docs: bool_or(&self.generate_docs, false),
            run_generate_sources: bool_or(&self.run_generate_sources, false),
            settings: JobSettings {
                threads: opt_num(&self.num_threads).unwrap_or(1),
                target_name: opt_str(&self.target_name)
                    .unwrap_or_else(|| DEFAULT_TARGET_NAME.to_owned()),
            },
            triggers: JobTriggers {
                github_webhook: bool_or(&triggers.github_webhook, false),
                git_provider_webhook: bool_or(&triggers.git_provider_webhook, false),
                schedule: bool_or(&triggers.schedule, false),
                on_merge: bool_or(&triggers.on_merge, false),
            },
            schedule: JobSchedule::new(
                &schedule_type,
                opt_num(&self.schedule_interval).unwrap_or(1),
                &num_list(&self.schedule_hours),
                &num_list(&self.schedule_days),
                schedule_cron.as_deref(),
            ),
            execution: JobExecution {
                timeout_seconds: opt_num(&self.timeout_seconds).unwrap_or(0),
            },
            deferring_environment_id: opt_num(&self.deferring_environment_id),
            deferring_job_definition_id: match job_id {
                Some(job_id) if bool_or(&self.self_deferring, false) => Some(job_id),
                _ => None,
            },
            triggers_on_draft_pr: bool_or(&self.triggers_on_draft_pr, false),
            job_completion_trigger_condition: completion_trigger,
            state: STATE_ACTIVE,
        })
    }

    fn from_api(job: Job, prior: &Self) -> Result<Self> {
        let job_id = job
            .id
            .ok_or_else(|| anyhow!("dbt Cloud returned a job without id"))?;
        let schedule = job.schedule;
        let schedule_type = if schedule.date.date_type.is_empty() {
            SCHEDULE_EVERY_DAY.to_owned()
        } else {
            schedule.date.date_type
        };
        let schedule_hours = match schedule.time.hours {
            Some(hours) if schedule.time.time_type == "at_exact_hours" && !hours.is_empty() => {
                num_list_value(hours)
            }
            _ => Value::Null,
        };
        let schedule_days = match schedule.date.days {
            Some(days) if schedule_type == SCHEDULE_DAYS_OF_WEEK => num_list_value(days),
            _ => Value::Null,
        };
        let schedule_cron = if schedule_type == SCHEDULE_CUSTOM_CRON {
            non_empty_value(schedule.date.cron.or(Some(schedule.cron)))
        } else {
            Value::Null
        };
        let schedule_interval = schedule
            .time
            .interval
            .or_else(|| opt_num(&prior.schedule_interval))
            .unwrap_or(1);

        let completion_trigger = match job.job_completion_trigger_condition {
            Some(trigger) => Value::Value(CompletionTriggerState {
                job_id: Value::Value(trigger.condition.job_id),
                project_id: Value::Value(trigger.condition.project_id),
                statuses: Value::Value(
                    trigger
                        .condition
                        .statuses
                        .into_iter()
                        .filter_map(run_status_name)
                        .map(str_value)
                        .collect::<BTreeSet<_>>(),
                ),
            }),
            None => Value::Null,
        };

        Ok(Self {
            id: str_value(job_id.to_string()),
            job_id: Value::Value(job_id),
            project_id: Value::Value(job.project_id),
            environment_id: Value::Value(job.environment_id),
            name: str_value(job.name),
            description: non_empty_value(job.description),
            execute_steps: str_list_value(job.execute_steps),
            dbt_version: non_empty_value(job.dbt_version),
            num_threads: Value::Value(job.settings.threads),
            target_name: str_value(job.settings.target_name),
            generate_docs: Value::Value(job.generate_docs),
            run_generate_sources: Value::Value(job.run_generate_sources),
            triggers: Value::Value(JobTriggersState {
                github_webhook: Value::Value(job.triggers.github_webhook),
                git_provider_webhook: Value::Value(job.triggers.git_provider_webhook),
                schedule: Value::Value(job.triggers.schedule),
                on_merge: Value::Value(job.triggers.on_merge),
            }),
            schedule_type: str_value(schedule_type),
            schedule_interval: Value::Value(schedule_interval),
            schedule_hours,
            schedule_days,
            schedule_cron,
            deferring_environment_id: job.deferring_environment_id.into(),
            self_deferring: Value::Value(job.deferring_job_definition_id == Some(job_id)),
            timeout_seconds: Value::Value(job.execution.timeout_seconds),
            triggers_on_draft_pr: Value::Value(job.triggers_on_draft_pr),
            job_completion_trigger_condition: completion_trigger,
        })
    }
}

#[derive(Debug, Default)]
pub struct JobResource;

#[async_trait]
impl ApiResource for JobResource {
    const NAME: &'static str = "job";
    type State<'a> = JobState<'a>;

    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};
        let trigger = |description| attribute(AttributeType::Bool, OptionalComputed, description);
        schema(
            "A dbt Cloud job.\n\n\
             Scheduled jobs run every `schedule_interval` hours, or at `schedule_hours`, on the days \
             given by `schedule_type`.",
            map! {
                "id" => attribute(AttributeType::String, Computed, "ID of the job"),
                "job_id" => attribute(AttributeType::Number, Computed, "Numeric ID of the job"),
                "project_id" => attribute(AttributeType::Number, Required, "Project of the job"),
                "environment_id" => attribute(AttributeType::Number, Required, "Environment the job runs in"),
                "name" => attribute(AttributeType::String, Required, "Name of the job"),
                "description" => attribute(AttributeType::String, Optional, "Description of the job"),
                "execute_steps" => attribute(string_list(), Required, "dbt commands run by the job"),
                "dbt_version" => attribute(
                    AttributeType::String,
                    Optional,
                    "dbt version of the job, the environment version when unset",
                ),
                "num_threads" => attribute(AttributeType::Number, OptionalComputed, "Number of threads, 1 by default"),
                "target_name" => attribute(AttributeType::String, OptionalComputed, "dbt target name, `default` by default"),
                "generate_docs" => attribute(AttributeType::Bool, OptionalComputed, "Generate documentation"),
                "run_generate_sources" => attribute(AttributeType::Bool, OptionalComputed, "Check source freshness"),
                "triggers" => attribute(
                    AttributeType::AttributeSingle(map! {
                        "github_webhook" => trigger("Run on GitHub pull requests"),
                        "git_provider_webhook" => trigger("Run on GitLab or Azure DevOps pull requests"),
                        "schedule" => trigger("Run on the schedule"),
                        "on_merge" => trigger("Run when a pull request is merged"),
                    }),
                    Required,
                    "Events that start the job",
                ),
                "schedule_type" => attribute(
                    AttributeType::String,
                    OptionalComputed,
                    "`every_day` (default), `days_of_week` or `custom_cron`",
                ),
                "schedule_interval" => attribute(
                    AttributeType::Number,
                    OptionalComputed,
                    "Hours between two runs, 1 by default",
                ),
                "schedule_hours" => attribute(number_list(), Optional, "Hours of the day to run at"),
                "schedule_days" => attribute(number_list(), Optional, "Days of the week to run on, 0 is Sunday"),
                "schedule_cron" => attribute(AttributeType::String, Optional, "Cron expression of a `custom_cron` schedule"),
                "deferring_environment_id" => attribute(AttributeType::Number, Optional, "Environment to defer to"),
                "self_deferring" => attribute(AttributeType::Bool, OptionalComputed, "Defer to the previous run of this job"),
                "timeout_seconds" => attribute(AttributeType::Number, OptionalComputed, "Run timeout, 0 for none"),
                "triggers_on_draft_pr" => attribute(
                    AttributeType::Bool,
                    OptionalComputed,
                    "Also run on draft pull requests",
                ),
                "job_completion_trigger_condition" => attribute(
                    AttributeType::AttributeSingle(map! {
                        "job_id" => attribute(AttributeType::Number, Required, "Job to watch"),
                        "project_id" => attribute(AttributeType::Number, Required, "Project of the watched job"),
                        "statuses" => attribute(
                            AttributeType::Set(AttributeType::String.into()),
                            Required,
                            "Run statuses that trigger this job: `success`, `error` or `canceled`",
                        ),
                    }),
                    Optional,
                    "Run this job when another job completes",
                ),
            },
        )
    }

    fn validate(&self, diags: &mut Diagnostics, config: &JobState<'_>) {
        validate_one_of(
            diags,
            AttributePath::new("schedule_type"),
            &config.schedule_type,
            SCHEDULE_TYPES,
        );
        let schedule_type = config.schedule_type.as_deref_option();
        validate_required_if(
            diags,
            "schedule_cron",
            &config.schedule_cron,
            schedule_type == Some(SCHEDULE_CUSTOM_CRON),
            "`schedule_type` is `custom_cron`",
        );
        validate_required_if(
            diags,
            "schedule_days",
            &config.schedule_days,
            schedule_type == Some(SCHEDULE_DAYS_OF_WEEK),
            "`schedule_type` is `days_of_week`",
        );
        validate_conflicts_if(
            diags,
            "schedule_hours",
            &config.schedule_hours,
            matches!(config.schedule_interval, Value::Value(interval) if interval > 1),
            "`schedule_interval` is greater than 1",
        );
        validate_conflicts_if(
            diags,
            "deferring_environment_id",
            &config.deferring_environment_id,
            config.self_deferring == Value::Value(true),
            "`self_deferring` is true",
        );

        let ranges = [
            ("schedule_hours", &config.schedule_hours, 0..=23),
            ("schedule_days", &config.schedule_days, 0..=6),
        ];
        for (name, values, range) in ranges {
            for (i, value) in values.iter().flatten().enumerate() {
                if let Value::Value(value) = value {
                    if !range.contains(value) {
                        diags.error(
                            "Value out of range",
                            format!("{value} is not between {} and {}", range.start(), range.end()),
                            AttributePath::new(name).index(i as i64),
                        );
                    }
                }
            }
        }

        if let Value::Value(condition) = &config.job_completion_trigger_condition {
            let statuses = RUN_STATUSES.map(|(status, _)| status);
            for status in condition.statuses.iter().flatten() {
                validate_one_of(
                    diags,
                    AttributePath::new("job_completion_trigger_condition").attribute("statuses"),
                    status,
                    &statuses,
                );
            }
        }
    }

    fn plan<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior: Option<&JobState<'a>>,
        state: &mut JobState<'a>,
    ) {
        computed(&mut state.id);
        computed(&mut state.job_id);
        default_to(&mut state.num_threads, 1);
        default_to(&mut state.target_name, DEFAULT_TARGET_NAME.into());
        default_to(&mut state.generate_docs, false);
        default_to(&mut state.run_generate_sources, false);
        default_to(&mut state.schedule_type, SCHEDULE_EVERY_DAY.into());
        default_to(&mut state.schedule_interval, 1);
        default_to(&mut state.self_deferring, false);
        default_to(&mut state.timeout_seconds, 0);
        default_to(&mut state.triggers_on_draft_pr, false);
        if let Value::Value(triggers) = &mut state.triggers {
            default_to(&mut triggers.github_webhook, false);
            default_to(&mut triggers.git_provider_webhook, false);
            default_to(&mut triggers.schedule, false);
            default_to(&mut triggers.on_merge, false);
        }
    }

    fn requires_replace(&self, prior: &JobState<'_>, planned: &JobState<'_>) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_on_change(&mut paths, "project_id", &prior.project_id, &planned.project_id);
        paths
    }

    async fn create<'a>(
        &self,
        client: &DbtCloudClient,
        planned: &JobState<'a>,
    ) -> Result<JobState<'a>> {
        let job = planned.to_api(client.account_id(), None)?;
        let mut created = client.create_job(&job).await?;

        // A job can only defer to itself once its id is known
        if bool_or(&planned.self_deferring, false) {
            let job_id = created
                .id
                .ok_or_else(|| anyhow!("dbt Cloud returned a job without id"))?;
            let job = planned.to_api(client.account_id(), Some(job_id))?;
            created = client.update_job(job_id, &job).await?;
        }
        JobState::from_api(created, planned)
    }

    async fn read<'a>(
        &self,
        client: &DbtCloudClient,
        state: &JobState<'a>,
    ) -> Result<Option<JobState<'a>>> {
        client
            .get_job(state.job_id()?)
            .await?
            .map(|job| JobState::from_api(job, state))
            .transpose()
    }

    async fn update<'a>(
        &self,
        client: &DbtCloudClient,
        prior: &JobState<'a>,
        planned: &JobState<'a>,
    ) -> Result<JobState<'a>> {
        let job_id = prior.job_id()?;
        let job = planned.to_api(client.account_id(), Some(job_id))?;
        let updated = client.update_job(job_id, &job).await?;
        JobState::from_api(updated, planned)
    }

    async fn delete<'a>(&self, client: &DbtCloudClient, state: &JobState<'a>) -> Result<()> {
        Ok(client.delete_job(state.job_id()?).await?)
    }

    fn import<'a>(&self, id: &str) -> Result<JobState<'a>> {
        let [job_id] = id::decode(id, "job_id")?;
        Ok(JobState {
            id: str_value(job_id.to_string()),
            job_id: Value::Value(job_id),
            ..Default::default()
        })
    }
}

impl ApiDataSource for JobResource {
    const LOOKUP_KEYS: &'static [&'static str] = &["job_id"];

    fn lookup<'a>(&self, config: &Self::State<'a>) -> Result<Self::State<'a>> {
        let job_id = req_num(&config.job_id, "job_id")?;
        self.import(&job_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_client;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn planned() -> JobState<'static> {
        let mut state = JobState {
            project_id: Value::Value(3),
            environment_id: Value::Value(9),
            name: str_value("Nightly"),
            execute_steps: str_list_value(vec!["dbt build".into()]),
            triggers: Value::Value(JobTriggersState {
                schedule: Value::Value(true),
                ..Default::default()
            }),
            schedule_hours: num_list_value(vec![2]),
            ..Default::default()
        };
        JobResource.plan(&mut Diagnostics::default(), None, &mut state);
        state
    }

    fn remote(job_id: i64, deferring_job_definition_id: Option<i64>) -> serde_json::Value {
        json!({
            "id": job_id,
            "account_id": 1,
            "project_id": 3,
            "environment_id": 9,
            "name": "Nightly",
            "description": "",
            "execute_steps": ["dbt build"],
            "dbt_version": null,
            "generate_docs": false,
            "run_generate_sources": false,
            "settings": {"threads": 1, "target_name": "default"},
            "triggers": {"github_webhook": false, "git_provider_webhook": false, "schedule": true, "on_merge": false},
            "schedule": {
                "cron": "0 2 * * *",
                "date": {"type": "every_day"},
                "time": {"type": "at_exact_hours", "hours": [2]},
            },
            "execution": {"timeout_seconds": 0},
            "deferring_environment_id": null,
            "deferring_job_definition_id": deferring_job_definition_id,
            "triggers_on_draft_pr": false,
            "job_completion_trigger_condition": {"condition": {"job_id": 4, "project_id": 3, "statuses": [10, 20]}},
            "state": 1,
        })
    }

    #[test]
    fn plan_fills_trigger_defaults() {
        let state = planned();
        let triggers = state.triggers.as_ref_option().unwrap();
        assert_eq!(triggers.on_merge, Value::Value(false));
        assert_eq!(state.schedule_type, str_value("every_day"));
        assert_eq!(state.num_threads, Value::Value(1));
    }

    #[test]
    fn schedule_validation() {
        let mut diags = Diagnostics::default();
        JobResource.validate(&mut diags, &planned());
        assert!(diags.errors.is_empty());

        let config = JobState {
            schedule_interval: Value::Value(4),
            schedule_hours: num_list_value(vec![2, 25]),
            schedule_type: str_value("custom_cron"),
            ..planned()
        };
        let mut diags = Diagnostics::default();
        JobResource.validate(&mut diags, &config);
        // missing cron, hours with an interval, hour 25
        assert_eq!(diags.errors.len(), 3);
    }

    #[test]
    fn completion_statuses_map_to_codes() {
        let state = JobState {
            job_completion_trigger_condition: Value::Value(CompletionTriggerState {
                job_id: Value::Value(4),
                project_id: Value::Value(3),
                statuses: Value::Value(BTreeSet::from([str_value("success"), str_value("canceled")])),
            }),
            ..planned()
        };
        let job = state.to_api(1, None).unwrap();
        let mut statuses = job.job_completion_trigger_condition.unwrap().condition.statuses;
        statuses.sort();
        assert_eq!(statuses, vec![10, 30]);
        assert_eq!(job.schedule.cron, "0 2 * * *");
        assert_eq!(job.deferring_job_definition_id, None);
    }

    #[tokio::test]
    async fn self_deferring_job_is_updated_after_create() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/accounts/1/jobs/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": remote(50, None)})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/accounts/1/jobs/50/"))
            .and(body_partial_json(json!({"id": 50, "deferring_job_definition_id": 50})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": remote(50, Some(50))})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let planned = JobState {
            self_deferring: Value::Value(true),
            ..planned()
        };
        let state = JobResource.create(&client, &planned).await.unwrap();
        assert_eq!(state.id, str_value("50"));
        assert_eq!(state.self_deferring, Value::Value(true));
        assert_eq!(state.schedule_hours, num_list_value(vec![2]));
        assert!(state.description.is_null());
        let condition = state.job_completion_trigger_condition.as_ref_option().unwrap();
        assert_eq!(
            condition.statuses,
            Value::Value(BTreeSet::from([str_value("error"), str_value("success")]))
        );
    }

    #[tokio::test]
    async fn deleted_job_is_gone() {
        let server = MockServer::start().await;
        let mut deleted = remote(50, None);
        deleted["state"] = json!(2);
        Mock::given(method("GET"))
            .and(path("/v2/accounts/1/jobs/50/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": deleted})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let state = JobResource.import("50").unwrap();
        assert!(JobResource.read(&client, &state).await.unwrap().is_none());
    }

    #[test]
    fn lookup_starts_from_job_id() {
        let config = JobState {
            job_id: Value::Value(50),
            ..Default::default()
        };
        let state = JobResource.lookup(&config).unwrap();
        assert_eq!(state.id, str_value("50"));
        assert_eq!(state.job_id, Value::Value(50));
    }
}
