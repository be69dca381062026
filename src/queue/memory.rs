use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::sync::Notify;
use tokio::time::{Duration, sleep};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::job::{FailedJob, Job, JobOptions, JobType, QueueName};
use crate::models::retry::RetryConfig;
use crate::queue::{ConsumerHandle, JobHandler, JobQueue, RecurringHandle};
use crate::utils::jittered_backoff_delay;

/// Upper bound on how long an idle worker sleeps before re-checking its
/// queue. Covers wakeups lost while no worker was parked on the Notify.
const IDLE_POLL: Duration = Duration::from_millis(25);

struct QueueState {
    pending: Mutex<VecDeque<Job>>,
    notify: Notify,
}

struct Inner {
    queues: HashMap<QueueName, QueueState>,
    failed: Mutex<Vec<FailedJob>>,
    retry: RetryConfig,
}

/// In-process job queue with the same contract as the broker-backed one:
/// at-least-once delivery, exponential-backoff redelivery, exhausted jobs
/// retained. Backs tests and single-process deployments.
#[derive(Clone)]
pub struct MemoryJobQueue {
    inner: Arc<Inner>,
}

impl MemoryJobQueue {
    pub fn new(retry: RetryConfig) -> Self {
        let queues = QueueName::ALL
            .into_iter()
            .map(|name| {
                (
                    name,
                    QueueState {
                        pending: Mutex::new(VecDeque::new()),
                        notify: Notify::new(),
                    },
                )
            })
            .collect();

        Self {
            inner: Arc::new(Inner {
                queues,
                failed: Mutex::new(Vec::new()),
                retry,
            }),
        }
    }

    /// Jobs currently waiting on a queue (excludes jobs sleeping out a
    /// backoff delay).
    pub fn pending_count(&self, queue: QueueName) -> usize {
        self.inner.queues[&queue].pending.lock().unwrap().len()
    }

    /// Jobs that exhausted their retry budget, oldest first.
    pub fn failed_jobs(&self) -> Vec<FailedJob> {
        self.inner.failed.lock().unwrap().clone()
    }

    /// Starts `concurrency` workers against `queue`. Each delivered job runs
    /// on exactly one worker; failures are redelivered with backoff.
    pub fn consume(
        &self,
        queue: QueueName,
        concurrency: usize,
        handler: Arc<dyn JobHandler>,
    ) -> ConsumerHandle {
        let tasks = (0..concurrency)
            .map(|_| {
                let inner = Arc::clone(&self.inner);
                let handler = Arc::clone(&handler);

                tokio::spawn(async move {
                    loop {
                        let job = inner.queues[&queue].pending.lock().unwrap().pop_front();

                        match job {
                            Some(job) => Inner::process(&inner, job, &handler).await,
                            None => {
                                let notified = inner.queues[&queue].notify.notified();
                                tokio::select! {
                                    _ = notified => {}
                                    _ = sleep(IDLE_POLL) => {}
                                }
                            }
                        }
                    }
                })
            })
            .collect();

        ConsumerHandle::new(tasks)
    }

    /// Fires `job_type` on `queue` every `interval`, starting one interval
    /// from now. The trigger is not leader-elected; handlers for recurring
    /// jobs must be idempotent.
    pub fn schedule_recurring(
        &self,
        queue: QueueName,
        job_type: JobType,
        payload: JsonValue,
        interval: Duration,
    ) -> RecurringHandle {
        let this = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick

            loop {
                ticker.tick().await;

                if let Err(e) = this
                    .enqueue(queue, job_type, payload.clone(), JobOptions::default())
                    .await
                {
                    warn!(queue = %queue, job_type = %job_type, error = %e, "Recurring enqueue failed");
                }
            }
        });

        RecurringHandle::new(task)
    }
}

impl Inner {
    fn push(&self, job: Job) {
        let state = &self.queues[&job.queue];
        state.pending.lock().unwrap().push_back(job);
        state.notify.notify_one();
    }

    async fn process(inner: &Arc<Inner>, mut job: Job, handler: &Arc<dyn JobHandler>) {
        match handler.handle(&job).await {
            Ok(()) => {
                debug!(job_id = %job.id, queue = %job.queue, "Job completed");
            }
            Err(e) => {
                job.attempts += 1;

                if job.attempts < job.max_attempts {
                    let delay = jittered_backoff_delay(&inner.retry, job.attempts);

                    debug!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        max_attempts = job.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Job failed, scheduling redelivery"
                    );

                    let inner = Arc::clone(inner);
                    tokio::spawn(async move {
                        sleep(delay).await;
                        inner.push(job);
                    });
                } else {
                    warn!(
                        job_id = %job.id,
                        queue = %job.queue,
                        attempts = job.attempts,
                        error = %e,
                        "Job exhausted retry budget, retaining for inspection"
                    );

                    inner.failed.lock().unwrap().push(FailedJob {
                        job,
                        failure_reason: e.to_string(),
                        failed_at: Utc::now(),
                    });
                }
            }
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        job_type: JobType,
        payload: JsonValue,
        options: JobOptions,
    ) -> Result<Uuid> {
        let job = Job {
            id: Uuid::new_v4(),
            queue,
            job_type,
            payload,
            attempts: 0,
            max_attempts: options.max_attempts.unwrap_or(self.inner.retry.max_attempts),
            enqueued_at: Utc::now(),
        };

        let id = job.id;
        self.inner.push(job);

        Ok(id)
    }
}
