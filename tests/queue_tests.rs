use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::time::Duration;

use dispatch_service::{
    models::job::{Job, JobOptions, JobType, QueueName},
    queue::{JobHandler, JobQueue, QueueRouter, memory::MemoryJobQueue},
};

use crate::support::{fast_retry, wait_until};

/// Counts executions; fails every attempt before `succeed_after`.
struct FlakyHandler {
    calls: AtomicU32,
    succeed_after: u32,
}

impl FlakyHandler {
    fn new(succeed_after: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            succeed_after,
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for FlakyHandler {
    async fn handle(&self, _job: &Job) -> Result<()> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);

        if attempt < self.succeed_after {
            Err(anyhow!("Simulated handler failure"))
        } else {
            Ok(())
        }
    }
}

/// Test: An enqueued job reaches exactly one worker
#[tokio::test]
async fn test_enqueue_and_consume() -> Result<()> {
    let queue = MemoryJobQueue::new(fast_retry());
    let handler = FlakyHandler::new(0);

    let consumer = queue.consume(QueueName::Audit, 4, handler.clone());

    queue
        .enqueue(
            QueueName::Audit,
            JobType::Log,
            serde_json::json!({"action": "PING"}),
            JobOptions::default(),
        )
        .await?;

    let h = handler.clone();
    assert!(wait_until(|| h.calls() == 1, Duration::from_secs(2)).await);

    consumer.shutdown();
    Ok(())
}

/// Test: Handler failures are redelivered with backoff until success
#[tokio::test]
async fn test_transient_failure_is_redelivered() -> Result<()> {
    let queue = MemoryJobQueue::new(fast_retry());
    let handler = FlakyHandler::new(2);

    queue.consume(QueueName::Notification, 2, handler.clone());

    queue
        .enqueue(
            QueueName::Notification,
            JobType::Send,
            serde_json::json!({}),
            JobOptions::default(),
        )
        .await?;

    let h = handler.clone();
    assert!(
        wait_until(|| h.calls() == 3, Duration::from_secs(3)).await,
        "Two failures then one success"
    );
    assert!(queue.failed_jobs().is_empty());

    Ok(())
}

/// Test: An exhausted job is retained with its failure reason, never dropped
#[tokio::test]
async fn test_exhausted_job_is_retained() -> Result<()> {
    let queue = MemoryJobQueue::new(fast_retry());
    let handler = FlakyHandler::new(u32::MAX);

    queue.consume(QueueName::Notification, 1, handler.clone());

    queue
        .enqueue(
            QueueName::Notification,
            JobType::Send,
            serde_json::json!({"notification_id": "n1"}),
            JobOptions::default(),
        )
        .await?;

    let q = queue.clone();
    assert!(wait_until(|| q.failed_jobs().len() == 1, Duration::from_secs(3)).await);

    // fast_retry budgets 3 attempts
    assert_eq!(handler.calls(), 3);

    let failed = &queue.failed_jobs()[0];
    assert_eq!(failed.job.attempts, 3);
    assert!(failed.failure_reason.contains("Simulated handler failure"));

    Ok(())
}

/// Test: A per-job retry budget overrides the queue-wide one
#[tokio::test]
async fn test_job_options_override_retry_budget() -> Result<()> {
    let queue = MemoryJobQueue::new(fast_retry());
    let handler = FlakyHandler::new(u32::MAX);

    queue.consume(QueueName::Audit, 1, handler.clone());

    queue
        .enqueue(
            QueueName::Audit,
            JobType::Log,
            serde_json::json!({}),
            JobOptions {
                max_attempts: Some(1),
            },
        )
        .await?;

    let q = queue.clone();
    assert!(wait_until(|| q.failed_jobs().len() == 1, Duration::from_secs(2)).await);
    assert_eq!(handler.calls(), 1, "No redelivery with a budget of one");

    Ok(())
}

/// Test: A worker pool drains many jobs
#[tokio::test]
async fn test_worker_pool_drains_queue() -> Result<()> {
    let queue = MemoryJobQueue::new(fast_retry());
    let handler = FlakyHandler::new(0);

    queue.consume(QueueName::Notification, 4, handler.clone());

    for _ in 0..20 {
        queue
            .enqueue(
                QueueName::Notification,
                JobType::Send,
                serde_json::json!({}),
                JobOptions::default(),
            )
            .await?;
    }

    let h = handler.clone();
    assert!(wait_until(|| h.calls() == 20, Duration::from_secs(3)).await);
    assert_eq!(queue.pending_count(QueueName::Notification), 0);

    Ok(())
}

/// Test: Queues are independent channels
#[tokio::test]
async fn test_queues_are_isolated() -> Result<()> {
    let queue = MemoryJobQueue::new(fast_retry());
    let audit_handler = FlakyHandler::new(0);

    queue.consume(QueueName::Audit, 1, audit_handler.clone());

    queue
        .enqueue(
            QueueName::Notification,
            JobType::Send,
            serde_json::json!({}),
            JobOptions::default(),
        )
        .await?;
    queue
        .enqueue(
            QueueName::Audit,
            JobType::Log,
            serde_json::json!({}),
            JobOptions::default(),
        )
        .await?;

    let h = audit_handler.clone();
    assert!(wait_until(|| h.calls() == 1, Duration::from_secs(2)).await);

    assert_eq!(
        queue.pending_count(QueueName::Notification),
        1,
        "No consumer on the notification queue, job stays put"
    );

    Ok(())
}

/// Test: A recurring schedule keeps firing until cancelled
#[tokio::test]
async fn test_recurring_schedule_fires_and_cancels() -> Result<()> {
    let queue = MemoryJobQueue::new(fast_retry());
    let handler = FlakyHandler::new(0);

    queue.consume(QueueName::Notification, 1, handler.clone());

    let schedule = queue.schedule_recurring(
        QueueName::Notification,
        JobType::FlushBatch,
        serde_json::json!({}),
        Duration::from_millis(30),
    );

    let h = handler.clone();
    assert!(
        wait_until(|| h.calls() >= 3, Duration::from_secs(3)).await,
        "Schedule should fire repeatedly"
    );

    schedule.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let after_cancel = handler.calls();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handler.calls(), after_cancel, "No firings after cancel");

    Ok(())
}

/// Test: The router dispatches on (queue, job type) and absorbs unroutable
/// jobs without retrying them
#[tokio::test]
async fn test_router_dispatch_and_unroutable_jobs() -> Result<()> {
    let queue = MemoryJobQueue::new(fast_retry());

    let send_handler = FlakyHandler::new(0);
    let router = Arc::new(
        QueueRouter::new().register(QueueName::Notification, JobType::Send, send_handler.clone()),
    );

    queue.consume(QueueName::Notification, 2, router);

    queue
        .enqueue(
            QueueName::Notification,
            JobType::Send,
            serde_json::json!({}),
            JobOptions::default(),
        )
        .await?;
    queue
        .enqueue(
            QueueName::Notification,
            JobType::FlushBatch,
            serde_json::json!({}),
            JobOptions::default(),
        )
        .await?;

    let h = send_handler.clone();
    assert!(wait_until(|| h.calls() == 1, Duration::from_secs(2)).await);

    let q = queue.clone();
    assert!(
        wait_until(|| q.pending_count(QueueName::Notification) == 0, Duration::from_secs(2)).await
    );
    assert!(
        queue.failed_jobs().is_empty(),
        "Unroutable jobs are dropped with a warning, not retried"
    );

    Ok(())
}
