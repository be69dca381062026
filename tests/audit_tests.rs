use std::sync::Arc;

use anyhow::Result;
use tokio::time::Duration;
use uuid::Uuid;

use dispatch_service::{
    models::{
        audit::{AuditOutcome, AuditSeverity, CreateAuditLog},
        job::{JobType, QueueName},
        retry::RetryConfig,
    },
    queue::{QueueRouter, memory::MemoryJobQueue},
    services::audit::{AuditService, AuditWriter},
    store::memory::MemoryStore,
};

use crate::support::{fast_retry, wait_until};

struct Fixture {
    store: MemoryStore,
    queue: MemoryJobQueue,
    service: AuditService,
}

fn fixture(retry: RetryConfig) -> Fixture {
    let store = MemoryStore::new();
    let queue = MemoryJobQueue::new(retry);
    let service = AuditService::new(Arc::new(queue.clone()));

    Fixture {
        store,
        queue,
        service,
    }
}

fn start_writer(fx: &Fixture) {
    let writer = Arc::new(AuditWriter::new(Arc::new(fx.store.clone())));
    let router =
        Arc::new(QueueRouter::new().register(QueueName::Audit, JobType::Log, writer));
    fx.queue.consume(QueueName::Audit, 4, router);
}

/// Test: An audit entry is persisted exactly as submitted, nested snapshots
/// included
#[tokio::test]
async fn test_audit_entry_persisted_verbatim() -> Result<()> {
    let fx = fixture(fast_retry());
    start_writer(&fx);

    let actor = Uuid::new_v4();
    let entry = CreateAuditLog::new("CLUB_APPROVED", "club:chess-society", AuditOutcome::Success)
        .with_actor(actor)
        .with_diff(
            serde_json::json!({"status": "pending", "reviewers": ["a", "b"]}),
            serde_json::json!({"status": "approved", "nested": {"level": 2, "flags": [true, false]}}),
        )
        .with_provenance("203.0.113.7", "Mozilla/5.0")
        .with_severity(AuditSeverity::High)
        .with_metadata(serde_json::json!({"request_id": "req-123"}));

    fx.service.log(entry.clone()).await?;

    let store = fx.store.clone();
    assert!(
        wait_until(|| store.audit_entries().len() == 1, Duration::from_secs(2)).await,
        "Audit entry should be persisted"
    );

    let stored = &fx.store.audit_entries()[0];
    assert_eq!(stored.actor_id, Some(actor));
    assert_eq!(stored.action, "CLUB_APPROVED");
    assert_eq!(stored.target, "club:chess-society");
    assert_eq!(stored.old_value, entry.old_value);
    assert_eq!(stored.new_value, entry.new_value);
    assert_eq!(stored.ip.as_deref(), Some("203.0.113.7"));
    assert_eq!(stored.severity, AuditSeverity::High);
    assert_eq!(stored.outcome, AuditOutcome::Success);
    assert_eq!(stored.metadata, serde_json::json!({"request_id": "req-123"}));

    Ok(())
}

/// Test: System actions log without an actor
#[tokio::test]
async fn test_system_action_has_no_actor() -> Result<()> {
    let fx = fixture(fast_retry());
    start_writer(&fx);

    fx.service
        .log(CreateAuditLog::new(
            "RETENTION_SWEEP",
            "notifications",
            AuditOutcome::Success,
        ))
        .await?;

    let store = fx.store.clone();
    assert!(wait_until(|| store.audit_entries().len() == 1, Duration::from_secs(2)).await);

    let stored = &fx.store.audit_entries()[0];
    assert_eq!(stored.actor_id, None);
    assert_eq!(stored.severity, AuditSeverity::Medium, "Severity defaults to medium");

    Ok(())
}

/// Test: A store outage leaves the job retryable; the entry lands once the
/// store recovers
#[tokio::test]
async fn test_audit_survives_store_outage() -> Result<()> {
    let fx = fixture(RetryConfig {
        max_attempts: 10,
        initial_delay_ms: 10,
        max_delay_ms: 40,
        backoff_multiplier: 2,
    });
    start_writer(&fx);

    fx.store.set_audit_outage(true);

    fx.service
        .log(
            CreateAuditLog::new("USER_LOGIN", "user:alex", AuditOutcome::Failure)
                .with_error("bad password"),
        )
        .await?;

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(fx.store.audit_entries().is_empty(), "Nothing persists during the outage");
    assert!(fx.queue.failed_jobs().is_empty(), "Budget must not be exhausted yet");

    fx.store.set_audit_outage(false);

    let store = fx.store.clone();
    assert!(
        wait_until(|| store.audit_entries().len() == 1, Duration::from_secs(3)).await,
        "Entry should be persisted after recovery"
    );

    let stored = &fx.store.audit_entries()[0];
    assert_eq!(stored.action, "USER_LOGIN");
    assert_eq!(stored.error_message.as_deref(), Some("bad password"));

    Ok(())
}

/// Test: An entry whose retries exhaust is retained, not silently discarded
#[tokio::test]
async fn test_exhausted_audit_job_is_retained() -> Result<()> {
    let fx = fixture(RetryConfig {
        max_attempts: 2,
        initial_delay_ms: 10,
        max_delay_ms: 20,
        backoff_multiplier: 2,
    });
    start_writer(&fx);

    fx.store.set_audit_outage(true);

    fx.service
        .log(CreateAuditLog::new("EVENT_DELETED", "event:E9", AuditOutcome::Success))
        .await?;

    let queue = fx.queue.clone();
    assert!(
        wait_until(|| queue.failed_jobs().len() == 1, Duration::from_secs(3)).await,
        "Exhausted job should be retained for replay"
    );

    let failed = &fx.queue.failed_jobs()[0];
    assert_eq!(failed.job.queue, QueueName::Audit);
    assert_eq!(failed.job.attempts, 2);
    assert_eq!(
        failed.job.payload.get("action").and_then(|v| v.as_str()),
        Some("EVENT_DELETED"),
        "The retained job still carries the full entry for manual replay"
    );

    Ok(())
}
