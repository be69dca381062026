use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use std::fmt::{Display, Formatter, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Low => "low",
            AuditSeverity::Medium => "medium",
            AuditSeverity::High => "high",
            AuditSeverity::Critical => "critical",
        }
    }
}

impl Display for AuditSeverity {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
        }
    }
}

impl Display for AuditOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub target: String,
    pub old_value: Option<JsonValue>,
    pub new_value: Option<JsonValue>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub severity: AuditSeverity,
    pub outcome: AuditOutcome,
    pub error_message: Option<String>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// What a producer hands to `AuditService::log`. Persisted verbatim by the
/// audit writer, no transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAuditLog {
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub target: String,
    pub old_value: Option<JsonValue>,
    pub new_value: Option<JsonValue>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub severity: AuditSeverity,
    pub outcome: AuditOutcome,
    pub error_message: Option<String>,
    #[serde(default = "empty_metadata")]
    pub metadata: JsonValue,
}

fn empty_metadata() -> JsonValue {
    serde_json::json!({})
}

impl CreateAuditLog {
    pub fn new(action: impl Into<String>, target: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            actor_id: None,
            action: action.into(),
            target: target.into(),
            old_value: None,
            new_value: None,
            ip: None,
            user_agent: None,
            severity: AuditSeverity::default(),
            outcome,
            error_message: None,
            metadata: empty_metadata(),
        }
    }

    /// System actions carry no actor.
    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_diff(mut self, old_value: JsonValue, new_value: JsonValue) -> Self {
        self.old_value = Some(old_value);
        self.new_value = Some(new_value);
        self
    }

    pub fn with_provenance(mut self, ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}
