use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use chrono::Utc;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};
use serde_json::Value as JsonValue;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::models::job::{FailedJob, Job, JobOptions, JobType, QueueName};
use crate::models::retry::RetryConfig;
use crate::queue::{ConsumerHandle, JobHandler, JobQueue, RecurringHandle};
use crate::utils::jittered_backoff_delay;

/// RabbitMQ-backed job queue. Durable queues shared across service
/// instances; redelivery is a re-publish with an incremented attempt count,
/// exhausted jobs land on a retained failed queue.
#[derive(Clone)]
pub struct AmqpJobQueue {
    channel: Channel,
    wire_names: HashMap<QueueName, String>,
    failed_queue_name: String,
    retry: RetryConfig,
}

impl AmqpJobQueue {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.amqp_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        let wire_names: HashMap<QueueName, String> = [
            (QueueName::Audit, config.audit_queue_name.clone()),
            (
                QueueName::Notification,
                config.notification_queue_name.clone(),
            ),
        ]
        .into();

        for name in wire_names.values().chain([&config.failed_queue_name]) {
            channel
                .queue_declare(
                    name,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| anyhow!("Failed to declare queue '{}': {}", name, e))?;
        }

        info!("RabbitMQ channel ready, queues declared");

        Ok(Self {
            channel,
            wire_names,
            failed_queue_name: config.failed_queue_name.clone(),
            retry: config.retry_config(),
        })
    }

    fn wire_name(&self, queue: QueueName) -> &str {
        &self.wire_names[&queue]
    }

    async fn publish_job(&self, job: &Job) -> Result<(), Error> {
        let payload = serde_json::to_vec(job)?;

        self.channel
            .basic_publish(
                "",
                self.wire_name(job.queue),
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| anyhow!("Failed to publish job: {}", e))?;

        Ok(())
    }

    async fn publish_failed(&self, failed: &FailedJob) -> Result<(), Error> {
        let payload = serde_json::to_vec(failed)?;

        self.channel
            .basic_publish(
                "",
                &self.failed_queue_name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| anyhow!("Failed to publish job to failed queue: {}", e))?;

        Ok(())
    }

    /// Starts a consumer whose in-flight handler executions are bounded by
    /// `concurrency` (on top of the channel prefetch window).
    pub async fn consume(
        &self,
        queue: QueueName,
        concurrency: usize,
        handler: Arc<dyn JobHandler>,
    ) -> Result<ConsumerHandle, Error> {
        let mut consumer = self
            .channel
            .basic_consume(
                self.wire_name(queue),
                &format!("dispatch_{}", queue),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {}", e))?;

        info!(queue = %queue, concurrency, "Consumer started");

        let this = self.clone();
        let permits = Arc::new(Semaphore::new(concurrency));

        let task = tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        warn!(queue = %queue, error = %e, "Consumer stream error");
                        continue;
                    }
                };

                let permit = match Arc::clone(&permits).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                let this = this.clone();
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    this.process_delivery(delivery, &handler).await;
                    drop(permit);
                });
            }
        });

        Ok(ConsumerHandle::new(vec![task]))
    }

    async fn process_delivery(&self, delivery: lapin::message::Delivery, handler: &Arc<dyn JobHandler>) {
        let delivery_tag = delivery.delivery_tag;

        let mut job: Job = match serde_json::from_slice(&delivery.data) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "Undecodable job payload, rejecting without requeue");
                self.reject(delivery_tag).await;
                return;
            }
        };

        match handler.handle(&job).await {
            Ok(()) => {
                debug!(job_id = %job.id, queue = %job.queue, "Job completed");
            }
            Err(e) => {
                job.attempts += 1;

                if job.attempts < job.max_attempts {
                    let delay = jittered_backoff_delay(&self.retry, job.attempts);

                    debug!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Job failed, re-publishing after backoff"
                    );

                    sleep(delay).await;

                    if let Err(publish_err) = self.publish_job(&job).await {
                        warn!(job_id = %job.id, error = %publish_err, "Redelivery publish failed, requeueing original");
                        self.requeue(delivery_tag).await;
                        return;
                    }
                } else {
                    warn!(
                        job_id = %job.id,
                        queue = %job.queue,
                        attempts = job.attempts,
                        error = %e,
                        "Job exhausted retry budget, moving to failed queue"
                    );

                    let failed = FailedJob {
                        job,
                        failure_reason: e.to_string(),
                        failed_at: Utc::now(),
                    };

                    if let Err(publish_err) = self.publish_failed(&failed).await {
                        warn!(error = %publish_err, "Failed-queue publish failed, requeueing original");
                        self.requeue(delivery_tag).await;
                        return;
                    }
                }
            }
        }

        self.acknowledge(delivery_tag).await;
    }

    async fn acknowledge(&self, delivery_tag: u64) {
        if let Err(e) = self
            .channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
        {
            warn!(delivery_tag, error = %e, "Failed to acknowledge delivery");
        }
    }

    async fn reject(&self, delivery_tag: u64) {
        if let Err(e) = self
            .channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue: false })
            .await
        {
            warn!(delivery_tag, error = %e, "Failed to reject delivery");
        }
    }

    async fn requeue(&self, delivery_tag: u64) {
        if let Err(e) = self
            .channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue: true })
            .await
        {
            warn!(delivery_tag, error = %e, "Failed to requeue delivery");
        }
    }

    /// Fires `job_type` on `queue` every `interval`. Single-active-scheduler
    /// assumption: overlapping instances produce duplicate firings, which
    /// the handlers tolerate.
    pub fn schedule_recurring(
        &self,
        queue: QueueName,
        job_type: JobType,
        payload: JsonValue,
        interval: std::time::Duration,
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

#[async_trait::async_trait]
impl JobQueue for AmqpJobQueue {
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
            max_attempts: options.max_attempts.unwrap_or(self.retry.max_attempts),
            enqueued_at: Utc::now(),
        };

        self.publish_job(&job).await?;

        Ok(job.id)
    }
}
