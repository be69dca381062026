use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use crate::models::job::{Job, JobOptions, JobType, QueueName};

pub mod amqp;
pub mod memory;

/// Producer-side port of the durable job queue. Delivery is at-least-once:
/// handlers must tolerate duplicate execution.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        queue: QueueName,
        job_type: JobType,
        payload: JsonValue,
        options: JobOptions,
    ) -> Result<Uuid>;
}

/// Consumer-side task function. A handler error triggers redelivery with
/// backoff until the job's retry budget is exhausted.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<()>;
}

/// Explicit handler registration per (queue, job type) pair. One router is
/// installed per consumed queue.
#[derive(Default)]
pub struct QueueRouter {
    handlers: HashMap<(QueueName, JobType), Arc<dyn JobHandler>>,
}

impl QueueRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        queue: QueueName,
        job_type: JobType,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        self.handlers.insert((queue, job_type), handler);
        self
    }
}

#[async_trait]
impl JobHandler for QueueRouter {
    async fn handle(&self, job: &Job) -> Result<()> {
        match self.handlers.get(&(job.queue, job.job_type)) {
            Some(handler) => handler.handle(job).await,
            None => {
                // A routing mismatch cannot be fixed by retrying.
                warn!(
                    job_id = %job.id,
                    queue = %job.queue,
                    job_type = %job.job_type,
                    "No handler registered for job, dropping"
                );
                Ok(())
            }
        }
    }
}

/// Handle on a running worker pool.
pub struct ConsumerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl ConsumerHandle {
    pub fn new(tasks: Vec<JoinHandle<()>>) -> Self {
        Self { tasks }
    }

    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Handle on a recurring enqueue schedule.
pub struct RecurringHandle {
    task: JoinHandle<()>,
}

impl RecurringHandle {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}
