#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use tokio::time::{Duration, sleep};
use uuid::Uuid;

use dispatch_service::{
    clients::{directory::UserDirectory, mailer::Mailer},
    config::Config,
    models::{
        job::{Job, JobType, QueueName, SendPayload},
        retry::RetryConfig,
    },
};

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Transport double: records every send, optionally failing for specific
/// addresses.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    pub fn recover(&self, address: &str) {
        self.failing.lock().unwrap().remove(address);
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_email(&self, to: &str, subject: &str, html: &str, text: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(to) {
            return Err(anyhow!("Simulated transport failure for {}", to));
        }

        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
            text: text.to_string(),
        });

        Ok(())
    }
}

/// Directory double backed by a fixed map; users absent from the map have no
/// contact email.
#[derive(Default)]
pub struct StaticDirectory {
    emails: Mutex<HashMap<Uuid, String>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: Uuid, email: &str) {
        self.emails.lock().unwrap().insert(user_id, email.to_string());
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn contact_email(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self.emails.lock().unwrap().get(&user_id).cloned())
    }
}

/// Retry budget small and fast enough for tests.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 10,
        max_delay_ms: 50,
        backoff_multiplier: 2,
    }
}

pub fn send_job(notification_id: Uuid) -> Job {
    Job {
        id: Uuid::new_v4(),
        queue: QueueName::Notification,
        job_type: JobType::Send,
        payload: serde_json::to_value(SendPayload { notification_id }).unwrap(),
        attempts: 0,
        max_attempts: 3,
        enqueued_at: Utc::now(),
    }
}

pub fn flush_job() -> Job {
    Job {
        id: Uuid::new_v4(),
        queue: QueueName::Notification,
        job_type: JobType::FlushBatch,
        payload: serde_json::json!({}),
        attempts: 0,
        max_attempts: 3,
        enqueued_at: Utc::now(),
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

pub fn test_config(directory_url: &str, mail_relay_url: &str) -> Config {
    Config {
        amqp_url: "amqp://localhost:5672".to_string(),
        audit_queue_name: "audit".to_string(),
        notification_queue_name: "notification".to_string(),
        failed_queue_name: "dispatch_failed".to_string(),
        prefetch_count: 50,
        database_url: "postgres://localhost/dispatch".to_string(),
        directory_service_url: directory_url.to_string(),
        mail_relay_url: mail_relay_url.to_string(),
        mail_relay_api_key: Some("test-key".to_string()),
        mail_from_address: "noreply@example.org".to_string(),
        dedup_window_seconds: 3600,
        batch_flush_interval_seconds: 14400,
        batch_claim_stale_seconds: 600,
        audit_worker_concurrency: 20,
        notification_worker_concurrency: 10,
        max_retry_attempts: 3,
        initial_retry_delay_ms: 10,
        max_retry_delay_ms: 50,
        retry_backoff_multiplier: 2,
        server_port: 0,
    }
}
