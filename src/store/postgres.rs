use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::audit::CreateAuditLog;
use crate::models::notification::{CreateNotification, NotificationRecord};
use crate::store::{CreateOutcome, RecordStore};

const SELECT_COLUMNS: &str = "id, recipient_id, kind, payload, priority, is_read, \
     queued_for_batch, email_sent, email_sent_at, claimed_at, created_at";

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    recipient_id: Uuid,
    kind: String,
    payload: JsonValue,
    priority: String,
    is_read: bool,
    queued_for_batch: bool,
    email_sent: bool,
    email_sent_at: Option<DateTime<Utc>>,
    claimed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for NotificationRecord {
    type Error = Error;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(NotificationRecord {
            id: row.id,
            recipient_id: row.recipient_id,
            kind: row.kind.parse()?,
            payload: row.payload,
            priority: row.priority.parse()?,
            is_read: row.is_read,
            queued_for_batch: row.queued_for_batch,
            email_sent: row.email_sent,
            email_sent_at: row.email_sent_at,
            claimed_at: row.claimed_at,
            created_at: row.created_at,
        })
    }
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| anyhow!("Failed to run migrations: {}", e))?;

        info!("PostgreSQL connection established");

        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn create_or_reuse(
        &self,
        req: &CreateNotification,
        window: Duration,
    ) -> Result<CreateOutcome> {
        let now = Utc::now();
        let horizon = now - window;
        let role = req.dedup_role().map(str::to_owned);

        // Serialize concurrent producers for the same dedup key; the
        // advisory lock is released on commit.
        let dedup_key = match &role {
            Some(role) => format!("{}:{}:{}", req.recipient_id, req.kind, role),
            None => format!("{}:{}", req.recipient_id, req.kind),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&dedup_key)
            .execute(&mut *tx)
            .await?;

        let existing: Option<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM notifications \
             WHERE recipient_id = $1 AND kind = $2 AND created_at >= $3 \
               AND ($4::text IS NULL OR payload->>'role' = $4) \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(req.recipient_id)
        .bind(req.kind.as_str())
        .bind(horizon)
        .bind(&role)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = existing {
            tx.commit().await?;

            debug!(recipient_id = %req.recipient_id, kind = %req.kind, "Reusing recent duplicate notification");

            return Ok(CreateOutcome {
                record: row.try_into()?,
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

        sqlx::query(
            "INSERT INTO notifications \
             (id, recipient_id, kind, payload, priority, is_read, queued_for_batch, email_sent, created_at) \
             VALUES ($1, $2, $3, $4, $5, FALSE, FALSE, FALSE, $6)",
        )
        .bind(record.id)
        .bind(record.recipient_id)
        .bind(record.kind.as_str())
        .bind(&record.payload)
        .bind(record.priority.as_str())
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(CreateOutcome {
            record,
            created: true,
        })
    }

    async fn notification(&self, id: Uuid) -> Result<Option<NotificationRecord>> {
        let row: Option<NotificationRow> =
            sqlx::query_as(&format!("SELECT {SELECT_COLUMNS} FROM notifications WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(NotificationRecord::try_from).transpose()
    }

    async fn mark_queued_for_batch(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE notifications SET queued_for_batch = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("Notification {} not found", id));
        }

        Ok(())
    }

    async fn mark_email_sent(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE notifications SET email_sent = TRUE, email_sent_at = $2 \
             WHERE id = ANY($1) AND email_sent = FALSE",
        )
        .bind(ids)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_batch(&self, stale_after: Duration) -> Result<Vec<NotificationRecord>> {
        let now = Utc::now();
        let stale_horizon = now - stale_after;

        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            "UPDATE notifications SET claimed_at = $1 \
             WHERE queued_for_batch AND NOT email_sent \
               AND priority IN ('medium', 'low') \
               AND (claimed_at IS NULL OR claimed_at < $2) \
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(now)
        .bind(stale_horizon)
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = rows
            .into_iter()
            .map(NotificationRecord::try_from)
            .collect::<Result<Vec<_>>>()?;

        claimed.sort_by_key(|record| record.created_at);

        Ok(claimed)
    }

    async fn release_claim(&self, ids: &[Uuid]) -> Result<()> {
        sqlx::query("UPDATE notifications SET claimed_at = NULL WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_audit(&self, entry: &CreateAuditLog) -> Result<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO audit_log \
             (id, actor_id, action, target, old_value, new_value, ip, user_agent, \
              severity, outcome, error_message, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(id)
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(&entry.target)
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(&entry.ip)
        .bind(&entry.user_agent)
        .bind(entry.severity.as_str())
        .bind(entry.outcome.as_str())
        .bind(&entry.error_message)
        .bind(&entry.metadata)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(audit_id = %id, action = %entry.action, "Audit entry persisted");

        Ok(id)
    }
}
