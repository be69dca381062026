use std::sync::Arc;
use std::time::Duration;

use anyhow::{Error, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dispatch_service::{
    api::run_api_server,
    clients::{directory::HttpDirectory, mailer::HttpMailer},
    config::Config,
    models::job::{JobType, QueueName},
    queue::{QueueRouter, amqp::AmqpJobQueue},
    services::{
        audit::AuditWriter, batch::BatchFlusher, delivery::DeliveryWorker,
    },
    store::postgres::PostgresStore,
    utils::retry_with_backoff,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .json()
        .init();

    info!("Starting dispatch service");

    let retry = config.retry_config();

    let store = Arc::new(
        retry_with_backoff(&retry, || PostgresStore::connect(&config.database_url)).await?,
    );
    let queue = retry_with_backoff(&retry, || AmqpJobQueue::connect(&config)).await?;

    let directory = Arc::new(HttpDirectory::new(&config)?);
    let mailer = Arc::new(HttpMailer::new(&config)?);

    let audit_writer = Arc::new(AuditWriter::new(store.clone()));
    let delivery_worker = Arc::new(DeliveryWorker::new(
        store.clone(),
        directory.clone(),
        mailer.clone(),
    ));
    let batch_flusher = Arc::new(BatchFlusher::new(
        store.clone(),
        directory.clone(),
        mailer.clone(),
        chrono::Duration::seconds(config.batch_claim_stale_seconds as i64),
    ));

    let audit_router = Arc::new(
        QueueRouter::new().register(QueueName::Audit, JobType::Log, audit_writer),
    );
    let notification_router = Arc::new(
        QueueRouter::new()
            .register(QueueName::Notification, JobType::Send, delivery_worker)
            .register(QueueName::Notification, JobType::FlushBatch, batch_flusher),
    );

    let audit_consumer = queue
        .consume(
            QueueName::Audit,
            config.audit_worker_concurrency,
            audit_router,
        )
        .await?;
    let notification_consumer = queue
        .consume(
            QueueName::Notification,
            config.notification_worker_concurrency,
            notification_router,
        )
        .await?;

    let flush_schedule = queue.schedule_recurring(
        QueueName::Notification,
        JobType::FlushBatch,
        serde_json::json!({}),
        Duration::from_secs(config.batch_flush_interval_seconds),
    );

    info!(
        audit_concurrency = config.audit_worker_concurrency,
        notification_concurrency = config.notification_worker_concurrency,
        flush_interval_seconds = config.batch_flush_interval_seconds,
        "Workers started"
    );

    let api_config = config.clone();
    let api_task = tokio::spawn(async move {
        if let Err(e) = run_api_server(api_config).await {
            tracing::error!(error = %e, "Health server exited");
        }
    });

    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, stopping workers");

    flush_schedule.cancel();
    audit_consumer.shutdown();
    notification_consumer.shutdown();
    api_task.abort();

    Ok(())
}
