use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::clients::{directory::UserDirectory, mailer::Mailer};
use crate::models::job::{Job, SendPayload};
use crate::models::validation::validate_email;
use crate::queue::JobHandler;
use crate::services::render::render_single;
use crate::store::RecordStore;

/// Consumes `send` jobs. URGENT/HIGH go out immediately; MEDIUM/LOW are
/// parked for the batch flusher. Missing entities are permanent no-ops, not
/// retries.
pub struct DeliveryWorker {
    store: Arc<dyn RecordStore>,
    directory: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Mailer>,
}

impl DeliveryWorker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        directory: Arc<dyn UserDirectory>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            directory,
            mailer,
        }
    }
}

#[async_trait]
impl JobHandler for DeliveryWorker {
    async fn handle(&self, job: &Job) -> Result<()> {
        let send: SendPayload = serde_json::from_value(job.payload.clone())?;

        let Some(record) = self.store.notification(send.notification_id).await? else {
            info!(
                notification_id = %send.notification_id,
                "Notification no longer exists, skipping delivery"
            );
            return Ok(());
        };

        // At-least-once redelivery of a job whose record already went out.
        if record.email_sent {
            debug!(notification_id = %record.id, "Email already sent, skipping duplicate delivery");
            return Ok(());
        }

        let Some(email) = self.directory.contact_email(record.recipient_id).await? else {
            info!(
                notification_id = %record.id,
                recipient_id = %record.recipient_id,
                "Recipient has no contact email, skipping delivery"
            );
            return Ok(());
        };

        if let Err(e) = validate_email(&email) {
            warn!(
                notification_id = %record.id,
                recipient_id = %record.recipient_id,
                error = %e,
                "Stored contact email is invalid, skipping delivery"
            );
            return Ok(());
        }

        if record.priority.is_immediate() {
            let rendered = render_single(&record);

            self.mailer
                .send_email(&email, &rendered.subject, &rendered.html, &rendered.text)
                .await?;

            self.store.mark_email_sent(&[record.id], Utc::now()).await?;

            info!(
                notification_id = %record.id,
                recipient_id = %record.recipient_id,
                priority = %record.priority,
                "Notification email sent immediately"
            );
        } else {
            self.store.mark_queued_for_batch(record.id).await?;

            debug!(
                notification_id = %record.id,
                priority = %record.priority,
                "Notification deferred to batch flush"
            );
        }

        Ok(())
    }
}
