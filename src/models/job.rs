use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use std::fmt::{Display, Formatter, Result};

/// Logical channels the pipeline owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Audit,
    Notification,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Audit => "audit",
            QueueName::Notification => "notification",
        }
    }

    pub const ALL: [QueueName; 2] = [QueueName::Audit, QueueName::Notification];
}

impl Display for QueueName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Log,
    Send,
    FlushBatch,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Log => "log",
            JobType::Send => "send",
            JobType::FlushBatch => "flush_batch",
        }
    }
}

impl Display for JobType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

/// Queue envelope. `attempts` counts executions so far; the envelope is
/// re-published with `attempts + 1` on handler failure until `max_attempts`
/// is exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub queue: QueueName,
    pub job_type: JobType,
    pub payload: JsonValue,
    pub attempts: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JobOptions {
    /// Overrides the queue-wide retry budget for this job.
    pub max_attempts: Option<u32>,
}

/// Payload of a `send` job: the record to deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendPayload {
    pub notification_id: Uuid,
}

/// A job that exhausted its retry budget. Retained for operator replay,
/// never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJob {
    pub job: Job,
    pub failure_reason: String,
    pub failed_at: DateTime<Utc>,
}
