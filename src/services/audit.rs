use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::debug;

use crate::models::audit::CreateAuditLog;
use crate::models::job::{Job, JobOptions, JobType, QueueName};
use crate::queue::{JobHandler, JobQueue};
use crate::store::RecordStore;

/// Producer-facing entry point for audit logging. Enqueue failures surface
/// to the caller: audit loss is a compliance concern, never swallowed.
pub struct AuditService {
    queue: Arc<dyn JobQueue>,
}

impl AuditService {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    pub async fn log(&self, entry: CreateAuditLog) -> Result<()> {
        let payload = serde_json::to_value(&entry)
            .map_err(|e| anyhow!("Audit entry is not serializable: {}", e))?;

        let job_id = self
            .queue
            .enqueue(QueueName::Audit, JobType::Log, payload, JobOptions::default())
            .await?;

        debug!(job_id = %job_id, action = %entry.action, "Audit entry enqueued");

        Ok(())
    }
}

/// Consumer side: persists each entry exactly as submitted. A persistence
/// error propagates so the queue retries; exhausted jobs stay visible for
/// manual replay.
pub struct AuditWriter {
    store: Arc<dyn RecordStore>,
}

impl AuditWriter {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl JobHandler for AuditWriter {
    async fn handle(&self, job: &Job) -> Result<()> {
        let entry: CreateAuditLog = serde_json::from_value(job.payload.clone())?;

        let audit_id = self.store.insert_audit(&entry).await?;

        debug!(job_id = %job.id, audit_id = %audit_id, "Audit entry written");

        Ok(())
    }
}
