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

//! Job definitions (`v2 jobs/`)

use serde::{Deserialize, Serialize};

use crate::client::{state_active, DbtCloudClient, Result, STATE_DELETED};
use crate::utils::DisplayJoinable;

pub const SCHEDULE_EVERY_DAY: &str = "every_day";
pub const SCHEDULE_DAYS_OF_WEEK: &str = "days_of_week";
pub const SCHEDULE_CUSTOM_CRON: &str = "custom_cron";

/// Run statuses usable in a job completion trigger with their API codes
pub const RUN_STATUSES: [(&str, i64); 3] = [("success", 10), ("error", 20), ("canceled", 30)];

pub fn run_status_code(name: &str) -> Option<i64> {
    RUN_STATUSES
        .iter()
        .find(|(status, _)| *status == name)
        .map(|(_, code)| *code)
}

pub fn run_status_name(code: i64) -> Option<&'static str> {
    RUN_STATUSES
        .iter()
        .find(|(_, status_code)| *status_code == code)
        .map(|(name, _)| *name)
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Job {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub account_id: i64,
    pub project_id: i64,
    pub environment_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub execute_steps: Vec<String>,
    #[serde(default)]
    pub dbt_version: Option<String>,
    #[serde(default)]
    pub generate_docs: bool,
    #[serde(default)]
    pub run_generate_sources: bool,
    #[serde(default)]
    pub settings: JobSettings,
    #[serde(default)]
    pub triggers: JobTriggers,
    #[serde(default)]
    pub schedule: JobSchedule,
    #[serde(default)]
    pub execution: JobExecution,
    #[serde(default)]
    pub deferring_environment_id: Option<i64>,
    #[serde(default)]
    pub deferring_job_definition_id: Option<i64>,
    #[serde(default)]
    pub triggers_on_draft_pr: bool,
    #[serde(default)]
    pub job_completion_trigger_condition: Option<JobCompletionTrigger>,
    #[serde(default = "state_active")]
    pub state: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobSettings {
    pub threads: i64,
    pub target_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobTriggers {
    #[serde(default)]
    pub github_webhook: bool,
    #[serde(default)]
    pub git_provider_webhook: bool,
    #[serde(default)]
    pub schedule: bool,
    #[serde(default)]
    pub on_merge: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobSchedule {
    #[serde(default)]
    pub cron: String,
    #[serde(default)]
    pub date: ScheduleDate,
    #[serde(default)]
    pub time: ScheduleTime,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleDate {
    #[serde(rename = "type")]
    pub date_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleTime {
    #[serde(rename = "type")]
    pub time_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobExecution {
    #[serde(default)]
    pub timeout_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobCompletionTrigger {
    pub condition: JobCompletionCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobCompletionCondition {
    pub job_id: i64,
    pub project_id: i64,
    #[serde(default)]
    pub statuses: Vec<i64>,
}

impl JobSchedule {
    /// Build the schedule of a job
    ///
    /// Hours take precedence over the interval; the cron expression always
    /// fires at minute 0 unless a custom cron is given.
    pub fn new(
        schedule_type: &str,
        interval: i64,
        hours: &[i64],
        days: &[i64],
        custom_cron: Option<&str>,
    ) -> Self {
        let time = if hours.is_empty() {
            ScheduleTime {
                time_type: "every_hour".to_owned(),
                interval: Some(interval.max(1)),
                hours: None,
            }
        } else {
            ScheduleTime {
                time_type: "at_exact_hours".to_owned(),
                interval: None,
                hours: Some(hours.to_vec()),
            }
        };

        let (date, cron) = match schedule_type {
            SCHEDULE_CUSTOM_CRON => {
                let cron = custom_cron.unwrap_or_default().to_owned();
                (
                    ScheduleDate {
                        date_type: SCHEDULE_CUSTOM_CRON.to_owned(),
                        days: None,
                        cron: Some(cron.clone()),
                    },
                    cron,
                )
            }
            SCHEDULE_DAYS_OF_WEEK => (
                ScheduleDate {
                    date_type: SCHEDULE_DAYS_OF_WEEK.to_owned(),
                    days: Some(days.to_vec()),
                    cron: None,
                },
                cron_expression(&time, days),
            ),
            _ => (
                ScheduleDate {
                    date_type: SCHEDULE_EVERY_DAY.to_owned(),
                    days: None,
                    cron: None,
                },
                cron_expression(&time, &[]),
            ),
        };

        Self { cron, date, time }
    }
}

fn cron_expression(time: &ScheduleTime, days: &[i64]) -> String {
    let hours = match (&time.hours, time.interval) {
        (Some(hours), _) if !hours.is_empty() => hours.iter().join_with(",").to_string(),
        (_, Some(interval)) if interval > 1 => format!("*/{interval}"),
        _ => "*".to_owned(),
    };
    let days = if days.is_empty() {
        "*".to_owned()
    } else {
        days.iter().join_with(",").to_string()
    };
    format!("0 {hours} * * {days}")
}

impl DbtCloudClient {
    fn job_url(&self, job_id: i64) -> String {
        self.v2_url(&format!("jobs/{job_id}/"))
    }

    pub async fn create_job(&self, job: &Job) -> Result<Job> {
        self.post(&self.v2_url("jobs/"), job).await
    }

    pub async fn get_job(&self, job_id: i64) -> Result<Option<Job>> {
        Ok(self
            .get_optional::<Job>(&self.job_url(job_id))
            .await?
            .filter(|job| job.state != STATE_DELETED))
    }

    pub async fn update_job(&self, job_id: i64, job: &Job) -> Result<Job> {
        let job = Job {
            id: Some(job_id),
            ..job.clone()
        };
        self.post(&self.job_url(job_id), &job).await
    }

    pub async fn delete_job(&self, job_id: i64) -> Result<()> {
        self.soft_delete(&self.job_url(job_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_day_with_interval() {
        let schedule = JobSchedule::new(SCHEDULE_EVERY_DAY, 4, &[], &[], None);
        assert_eq!(schedule.cron, "0 */4 * * *");
        assert_eq!(schedule.time.time_type, "every_hour");
        assert_eq!(schedule.time.interval, Some(4));
        assert_eq!(schedule.date.date_type, "every_day");
    }

    #[test]
    fn days_of_week_at_exact_hours() {
        let schedule = JobSchedule::new(SCHEDULE_DAYS_OF_WEEK, 1, &[6, 18], &[1, 3, 5], None);
        assert_eq!(schedule.cron, "0 6,18 * * 1,3,5");
        assert_eq!(schedule.time.time_type, "at_exact_hours");
        assert_eq!(schedule.time.interval, None);
        assert_eq!(schedule.date.days, Some(vec![1, 3, 5]));
    }

    #[test]
    fn hourly_every_day() {
        assert_eq!(JobSchedule::new(SCHEDULE_EVERY_DAY, 1, &[], &[], None).cron, "0 * * * *");
    }

    #[test]
    fn custom_cron_is_passed_through() {
        let schedule = JobSchedule::new(SCHEDULE_CUSTOM_CRON, 1, &[], &[], Some("15 2 * * 1-5"));
        assert_eq!(schedule.cron, "15 2 * * 1-5");
        assert_eq!(schedule.date.cron.as_deref(), Some("15 2 * * 1-5"));
    }

    #[test]
    fn run_statuses_map_both_ways() {
        assert_eq!(run_status_code("error"), Some(20));
        assert_eq!(run_status_name(30), Some("canceled"));
        assert_eq!(run_status_code("running"), None);
        assert_eq!(run_status_name(1), None);
    }
}
