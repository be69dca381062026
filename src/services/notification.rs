use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::models::job::{JobOptions, JobType, QueueName, SendPayload};
use crate::models::notification::{CreateNotification, NotificationRecord};
use crate::queue::JobQueue;
use crate::store::RecordStore;

/// Producer-facing entry point for notifications: dedup gate, record
/// creation, delivery-job enqueue.
pub struct NotificationService {
    store: Arc<dyn RecordStore>,
    queue: Arc<dyn JobQueue>,
    dedup_window: Duration,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn JobQueue>,
        dedup_window: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            dedup_window,
        }
    }

    /// Standard wiring: the dedup window comes from `DEDUP_WINDOW_SECONDS`.
    pub fn from_config(
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn JobQueue>,
        config: &Config,
    ) -> Self {
        Self::new(store, queue, config.dedup_window())
    }

    /// Creates a notification record and enqueues its delivery job, unless a
    /// duplicate for the same (recipient, type) exists inside the dedup
    /// window, in which case the duplicate call is absorbed and the
    /// pre-existing record returned, with no new job.
    pub async fn create(&self, req: CreateNotification) -> Result<NotificationRecord> {
        let outcome = self.store.create_or_reuse(&req, self.dedup_window).await?;

        if !outcome.created {
            debug!(
                notification_id = %outcome.record.id,
                recipient_id = %req.recipient_id,
                kind = %req.kind,
                "Duplicate notification absorbed by dedup window"
            );
            return Ok(outcome.record);
        }

        let payload = serde_json::to_value(SendPayload {
            notification_id: outcome.record.id,
        })?;

        self.queue
            .enqueue(
                QueueName::Notification,
                JobType::Send,
                payload,
                JobOptions::default(),
            )
            .await?;

        info!(
            notification_id = %outcome.record.id,
            recipient_id = %req.recipient_id,
            kind = %req.kind,
            priority = %req.priority,
            "Notification created, delivery job enqueued"
        );

        Ok(outcome.record)
    }
}
