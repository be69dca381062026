use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::audit::CreateAuditLog;
use crate::models::notification::{CreateNotification, NotificationRecord};

pub mod memory;
pub mod postgres;

/// Result of the dedup-gated create: either a fresh record or the recent
/// duplicate that absorbed the call.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub record: NotificationRecord,
    pub created: bool,
}

/// Persistence port for the two entity shapes the pipeline owns.
///
/// `create_or_reuse` and `claim_batch` are atomic against concurrent callers:
/// the dedup check-then-insert and the batch select-then-mark are single
/// operations here, not two.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the recent duplicate for (recipient, type) inside `window` if
    /// one exists, otherwise persists a new record. `role_assigned` also
    /// matches on `payload.role`.
    async fn create_or_reuse(
        &self,
        req: &CreateNotification,
        window: Duration,
    ) -> Result<CreateOutcome>;

    async fn notification(&self, id: Uuid) -> Result<Option<NotificationRecord>>;

    async fn mark_queued_for_batch(&self, id: Uuid) -> Result<()>;

    /// Flips `email_sent` for the given records. Guarded on
    /// `email_sent = false`, so the transition happens at most once per
    /// record regardless of redeliveries.
    async fn mark_email_sent(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<()>;

    /// Atomically claims every batch-pending MEDIUM/LOW record that is
    /// unclaimed or whose claim is older than `stale_after`. Two overlapping
    /// flush executions get disjoint sets.
    async fn claim_batch(&self, stale_after: Duration) -> Result<Vec<NotificationRecord>>;

    /// Returns claimed-but-unsent records to the pending pool so the next
    /// flush retries them.
    async fn release_claim(&self, ids: &[Uuid]) -> Result<()>;

    async fn insert_audit(&self, entry: &CreateAuditLog) -> Result<Uuid>;
}
