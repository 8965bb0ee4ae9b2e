use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Group used when a job is registered without one.
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// Identity of a job: unique name within a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub name: String,
    pub group: String,
}

impl JobKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    /// Key in [`DEFAULT_GROUP`].
    pub fn in_default_group(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_GROUP)
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// What a listener is told about one job run.
///
/// `data` is untyped JSON so listeners stay decoupled from job payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionContext {
    pub job_key: JobKey,
    /// Name of the trigger that fired the job, if any.
    pub trigger_name: Option<String>,
    pub fire_time: DateTime<Utc>,
    /// When the trigger was supposed to fire; differs from `fire_time` after a misfire.
    pub scheduled_fire_time: Option<DateTime<Utc>>,
    /// How many times this firing has been re-executed after a failure.
    pub refire_count: u32,
    pub data: serde_json::Value,
}

impl JobExecutionContext {
    pub fn new(job_key: JobKey) -> Self {
        Self {
            job_key,
            trigger_name: None,
            fire_time: Utc::now(),
            scheduled_fire_time: None,
            refire_count: 0,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_trigger(mut self, trigger_name: impl Into<String>) -> Self {
        self.trigger_name = Some(trigger_name.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// How a job run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum JobOutcome {
    Succeeded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
    },
    Failed {
        message: String,
        /// The scheduler will run the job again right away.
        #[serde(default)]
        refire_immediately: bool,
    },
}

impl JobOutcome {
    pub fn succeeded() -> Self {
        JobOutcome::Succeeded { result: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        JobOutcome::Failed {
            message: message.into(),
            refire_immediately: false,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }
}

/// Observer of job lifecycle events.
///
/// Callbacks run synchronously on the scheduler's thread, in registration
/// order. An `Err` stops the fan-out and is returned to whoever fired the
/// event. Every callback defaults to doing nothing.
pub trait JobListener: Send + Sync {
    /// Unique name used for removal and log correlation.
    fn name(&self) -> &str;

    /// The job is about to run.
    fn job_to_be_executed(&self, _ctx: &JobExecutionContext) -> Result<()> {
        Ok(())
    }

    /// A trigger listener vetoed the run; `job_was_executed` will not follow.
    fn job_execution_vetoed(&self, _ctx: &JobExecutionContext) -> Result<()> {
        Ok(())
    }

    fn job_was_executed(&self, _ctx: &JobExecutionContext, _outcome: &JobOutcome) -> Result<()> {
        Ok(())
    }
}
