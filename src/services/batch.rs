use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clients::{directory::UserDirectory, mailer::Mailer};
use crate::models::job::Job;
use crate::models::notification::NotificationRecord;
use crate::models::validation::validate_email;
use crate::queue::JobHandler;
use crate::services::render::render_digest;
use crate::store::RecordStore;

/// Consumes the recurring `flush_batch` job: claims every deferred record,
/// sends one digest per recipient, marks the included records sent.
///
/// The claim step is atomic, so an overlapping flush (second instance, or a
/// duplicate recurring firing) gets an empty or disjoint set and no recipient
/// receives the same digest twice.
pub struct BatchFlusher {
    store: Arc<dyn RecordStore>,
    directory: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Mailer>,
    claim_stale: Duration,
}

impl BatchFlusher {
    pub fn new(
        store: Arc<dyn RecordStore>,
        directory: Arc<dyn UserDirectory>,
        mailer: Arc<dyn Mailer>,
        claim_stale: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            mailer,
            claim_stale,
        }
    }

    async fn flush_recipient(
        &self,
        recipient_id: Uuid,
        records: &[NotificationRecord],
    ) -> Result<()> {
        let ids: Vec<Uuid> = records.iter().map(|record| record.id).collect();

        let email = match self.directory.contact_email(recipient_id).await? {
            Some(email) if validate_email(&email).is_ok() => Some(email),
            Some(email) => {
                warn!(
                    recipient_id = %recipient_id,
                    email_length = email.len(),
                    "Stored contact email is invalid, dropping digest"
                );
                None
            }
            None => None,
        };

        let Some(email) = email else {
            // Undeliverable forever; mark sent so these records are not
            // reclaimed every cycle.
            debug!(
                recipient_id = %recipient_id,
                count = records.len(),
                "Recipient has no usable contact email, closing records"
            );
            self.store.mark_email_sent(&ids, Utc::now()).await?;
            return Ok(());
        };

        let rendered = render_digest(records);

        self.mailer
            .send_email(&email, &rendered.subject, &rendered.html, &rendered.text)
            .await?;

        self.store.mark_email_sent(&ids, Utc::now()).await?;

        debug!(
            recipient_id = %recipient_id,
            count = records.len(),
            "Digest email sent"
        );

        Ok(())
    }
}

#[async_trait]
impl JobHandler for BatchFlusher {
    async fn handle(&self, _job: &Job) -> Result<()> {
        let claimed = self.store.claim_batch(self.claim_stale).await?;

        if claimed.is_empty() {
            debug!("No deferred notifications pending, nothing to flush");
            return Ok(());
        }

        let mut by_recipient: HashMap<Uuid, Vec<NotificationRecord>> = HashMap::new();
        for record in claimed {
            by_recipient.entry(record.recipient_id).or_default().push(record);
        }

        let recipients = by_recipient.len();
        let mut failures = 0usize;

        for (recipient_id, records) in &by_recipient {
            if let Err(e) = self.flush_recipient(*recipient_id, records).await {
                // One recipient's failure must not abort the rest of the
                // flush. Release the claim so the next cycle retries them.
                failures += 1;

                warn!(
                    recipient_id = %recipient_id,
                    count = records.len(),
                    error = %e,
                    "Digest delivery failed, releasing claim"
                );

                let ids: Vec<Uuid> = records.iter().map(|record| record.id).collect();
                if let Err(release_err) = self.store.release_claim(&ids).await {
                    warn!(
                        recipient_id = %recipient_id,
                        error = %release_err,
                        "Failed to release claim, records retry after the stale timeout"
                    );
                }
            }
        }

        info!(
            recipients,
            delivered = recipients - failures,
            failures,
            "Batch flush complete"
        );

        Ok(())
    }
}
