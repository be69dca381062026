use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use std::fmt::{Display, Formatter, Result};

/// Closed set of business events that produce a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    RecruitmentOpen,
    EventReminder,
    ApprovalRequired,
    RoleAssigned,
    SystemMaintenance,
    ClubAnnouncement,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::RecruitmentOpen => "recruitment_open",
            NotificationType::EventReminder => "event_reminder",
            NotificationType::ApprovalRequired => "approval_required",
            NotificationType::RoleAssigned => "role_assigned",
            NotificationType::SystemMaintenance => "system_maintenance",
            NotificationType::ClubAnnouncement => "club_announcement",
        }
    }
}

impl Display for NotificationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NotificationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "recruitment_open" => Ok(NotificationType::RecruitmentOpen),
            "event_reminder" => Ok(NotificationType::EventReminder),
            "approval_required" => Ok(NotificationType::ApprovalRequired),
            "role_assigned" => Ok(NotificationType::RoleAssigned),
            "system_maintenance" => Ok(NotificationType::SystemMaintenance),
            "club_announcement" => Ok(NotificationType::ClubAnnouncement),
            other => Err(anyhow::anyhow!("Unknown notification type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
}

impl Priority {
    /// URGENT/HIGH go out on the delivery job itself; MEDIUM/LOW wait for
    /// the next batch flush.
    pub fn is_immediate(&self) -> bool {
        matches!(self, Priority::Urgent | Priority::High)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(anyhow::anyhow!("Unknown priority '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationType,
    pub payload: JsonValue,
    pub priority: Priority,
    pub is_read: bool,
    pub queued_for_batch: bool,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Producer-side request; the store assigns id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    pub recipient_id: Uuid,
    pub kind: NotificationType,
    pub payload: JsonValue,
    pub priority: Priority,
}

impl CreateNotification {
    pub fn new(recipient_id: Uuid, kind: NotificationType, priority: Priority) -> Self {
        Self {
            recipient_id,
            kind,
            payload: serde_json::json!({}),
            priority,
        }
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = payload;
        self
    }

    /// role_assigned dedups on the assigned role as well, so a user getting
    /// two different roles in the same hour still sees both.
    pub fn dedup_role(&self) -> Option<&str> {
        if self.kind == NotificationType::RoleAssigned {
            self.payload.get("role").and_then(|v| v.as_str())
        } else {
            None
        }
    }
}
