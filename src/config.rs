use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::retry::RetryConfig;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub amqp_url: String,

    #[serde(default = "default_audit_queue")]
    pub audit_queue_name: String,
    #[serde(default = "default_notification_queue")]
    pub notification_queue_name: String,
    #[serde(default = "default_failed_queue")]
    pub failed_queue_name: String,
    #[serde(default = "default_prefetch")]
    pub prefetch_count: u16,

    pub database_url: String,

    pub directory_service_url: String,

    pub mail_relay_url: String,
    pub mail_relay_api_key: Option<String>,
    pub mail_from_address: String,

    #[serde(default = "default_dedup_window")]
    pub dedup_window_seconds: u64,

    #[serde(default = "default_flush_interval")]
    pub batch_flush_interval_seconds: u64,
    #[serde(default = "default_claim_stale")]
    pub batch_claim_stale_seconds: u64,

    #[serde(default = "default_audit_concurrency")]
    pub audit_worker_concurrency: usize,
    #[serde(default = "default_notification_concurrency")]
    pub notification_worker_concurrency: usize,

    #[serde(default = "default_max_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_delay")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub retry_backoff_multiplier: u64,

    #[serde(default = "default_port")]
    pub server_port: u16,
}

fn default_audit_queue() -> String {
    "audit".to_string()
}

fn default_notification_queue() -> String {
    "notification".to_string()
}

fn default_failed_queue() -> String {
    "dispatch_failed".to_string()
}

fn default_prefetch() -> u16 {
    50
}

fn default_dedup_window() -> u64 {
    3600
}

fn default_flush_interval() -> u64 {
    4 * 3600
}

fn default_claim_stale() -> u64 {
    600
}

fn default_audit_concurrency() -> usize {
    20
}

fn default_notification_concurrency() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    60_000
}

fn default_multiplier() -> u64 {
    2
}

fn default_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        Ok(config)
    }

    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dedup_window_seconds as i64)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }
}
