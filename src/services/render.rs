use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::notification::{NotificationRecord, NotificationType};

pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

fn subject_for(kind: NotificationType) -> &'static str {
    match kind {
        NotificationType::RecruitmentOpen => "Recruitment is now open",
        NotificationType::EventReminder => "Upcoming event reminder",
        NotificationType::ApprovalRequired => "Your approval is required",
        NotificationType::RoleAssigned => "You have been assigned a new role",
        NotificationType::SystemMaintenance => "Scheduled system maintenance",
        NotificationType::ClubAnnouncement => "New club announcement",
    }
}

/// Producers may put a human-readable `message` (and for role_assigned a
/// `role`) into the payload; everything else in there is opaque to us.
fn body_line(record: &NotificationRecord) -> String {
    match record.payload.get("message").and_then(|v| v.as_str()) {
        Some(message) => message.to_string(),
        None => subject_for(record.kind).to_string(),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn render_single(record: &NotificationRecord) -> RenderedEmail {
    let subject = subject_for(record.kind).to_string();
    let line = body_line(record);

    let html = format!(
        "<html><body><p>{}</p><p><small>{}</small></p></body></html>",
        line,
        timestamp(record.created_at)
    );
    let text = format!("{}\n\n{}", line, timestamp(record.created_at));

    RenderedEmail {
        subject,
        html,
        text,
    }
}

/// One digest per recipient per flush cycle; every pending record gets a
/// line.
pub fn render_digest(records: &[NotificationRecord]) -> RenderedEmail {
    let subject = if records.len() == 1 {
        "You have 1 new notification".to_string()
    } else {
        format!("You have {} new notifications", records.len())
    };

    let mut html_items = String::new();
    let mut text_items = String::new();

    for record in records {
        let line = body_line(record);
        let at = timestamp(record.created_at);

        html_items.push_str(&format!(
            "<li><strong>{}</strong>: {} <small>({})</small></li>",
            record.kind, line, at
        ));
        text_items.push_str(&format!("- [{}] {} ({})\n", record.kind, line, at));
    }

    let html = format!("<html><body><ul>{}</ul></body></html>", html_items);
    let text = text_items;

    RenderedEmail {
        subject,
        html,
        text,
    }
}
