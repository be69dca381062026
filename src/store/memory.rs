use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::audit::{AuditLogEntry, CreateAuditLog};
use crate::models::notification::{CreateNotification, NotificationRecord};
use crate::store::{CreateOutcome, RecordStore};

struct Inner {
    notifications: Mutex<HashMap<Uuid, NotificationRecord>>,
    audit: Mutex<Vec<AuditLogEntry>>,
    audit_outage: AtomicBool,
}

/// In-memory store with the same atomicity contract as the Postgres one:
/// every trait method runs under one lock. Backs the integration tests.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                notifications: Mutex::new(HashMap::new()),
                audit: Mutex::new(Vec::new()),
                audit_outage: AtomicBool::new(false),
            }),
        }
    }

    /// While set, `insert_audit` fails as if the store were down.
    pub fn set_audit_outage(&self, down: bool) {
        self.inner.audit_outage.store(down, Ordering::SeqCst);
    }

    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.inner.audit.lock().unwrap().clone()
    }

    pub fn notification_count(&self) -> usize {
        self.inner.notifications.lock().unwrap().len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_or_reuse(
        &self,
        req: &CreateNotification,
        window: Duration,
    ) -> Result<CreateOutcome> {
        let mut notifications = self.inner.notifications.lock().unwrap();
        let now = Utc::now();
        let horizon = now - window;

        let duplicate = notifications
            .values()
            .filter(|record| {
                record.recipient_id == req.recipient_id
                    && record.kind == req.kind
                    && record.created_at >= horizon
            })
            .filter(|record| match req.dedup_role() {
                Some(role) => record.payload.get("role").and_then(|v| v.as_str()) == Some(role),
                None => true,
            })
            .max_by_key(|record| record.created_at)
            .cloned();

        if let Some(record) = duplicate {
            return Ok(CreateOutcome {
                record,
                created: false,
            });
        }

        let record = NotificationRecord {
            id: Uuid::new_v4(),
            recipient_id: req.recipient_id,
            kind: req.kind,
            payload: req.payload.clone(),
            priority: req.priority,
            is_read: false,
            queued_for_batch: false,
            email_sent: false,
            email_sent_at: None,
            claimed_at: None,
            created_at: now,
        };

        notifications.insert(record.id, record.clone());

        Ok(CreateOutcome {
            record,
            created: true,
        })
    }

    async fn notification(&self, id: Uuid) -> Result<Option<NotificationRecord>> {
        Ok(self.inner.notifications.lock().unwrap().get(&id).cloned())
    }

    async fn mark_queued_for_batch(&self, id: Uuid) -> Result<()> {
        let mut notifications = self.inner.notifications.lock().unwrap();

        let record = notifications
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Notification {} not found", id))?;
        record.queued_for_batch = true;

        Ok(())
    }

    async fn mark_email_sent(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<()> {
        let mut notifications = self.inner.notifications.lock().unwrap();

        for id in ids {
            if let Some(record) = notifications.get_mut(id) {
                if !record.email_sent {
                    record.email_sent = true;
                    record.email_sent_at = Some(at);
                }
            }
        }

        Ok(())
    }

    async fn claim_batch(&self, stale_after: Duration) -> Result<Vec<NotificationRecord>> {
        let mut notifications = self.inner.notifications.lock().unwrap();
        let now = Utc::now();
        let stale_horizon = now - stale_after;

        let mut claimed: Vec<NotificationRecord> = notifications
            .values_mut()
            .filter(|record| {
                record.queued_for_batch
                    && !record.email_sent
                    && !record.priority.is_immediate()
                    && record.claimed_at.is_none_or(|at| at < stale_horizon)
            })
            .map(|record| {
                record.claimed_at = Some(now);
                record.clone()
            })
            .collect();

        claimed.sort_by_key(|record| record.created_at);

        Ok(claimed)
    }

    async fn release_claim(&self, ids: &[Uuid]) -> Result<()> {
        let mut notifications = self.inner.notifications.lock().unwrap();

        for id in ids {
            if let Some(record) = notifications.get_mut(id) {
                record.claimed_at = None;
            }
        }

        Ok(())
    }

    async fn insert_audit(&self, entry: &CreateAuditLog) -> Result<Uuid> {
        if self.inner.audit_outage.load(Ordering::SeqCst) {
            return Err(anyhow!("Audit store unavailable"));
        }

        let stored = AuditLogEntry {
            id: Uuid::new_v4(),
            actor_id: entry.actor_id,
            action: entry.action.clone(),
            target: entry.target.clone(),
            old_value: entry.old_value.clone(),
            new_value: entry.new_value.clone(),
            ip: entry.ip.clone(),
            user_agent: entry.user_agent.clone(),
            severity: entry.severity,
            outcome: entry.outcome,
            error_message: entry.error_message.clone(),
            metadata: entry.metadata.clone(),
            created_at: Utc::now(),
        };

        let id = stored.id;
        self.inner.audit.lock().unwrap().push(stored);

        Ok(id)
    }
}
