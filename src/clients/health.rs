use std::{collections::HashMap, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    config::Config,
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
    queue::amqp::AmqpJobQueue,
    store::postgres::PostgresStore,
};

pub struct HealthChecker {
    config: Config,
}

impl HealthChecker {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Probes every dependency the pipeline delivers through and folds the
    /// results into one readiness payload.
    pub async fn check_all(&self, uptime: std::time::Duration) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("database".to_string(), self.check_database().await);
        checks.insert("message_broker".to_string(), self.check_broker().await);
        checks.insert(
            "user_directory".to_string(),
            self.check_http("user_directory", &self.config.directory_service_url)
                .await,
        );
        checks.insert(
            "mail_relay".to_string(),
            self.check_http("mail_relay", &self.config.mail_relay_url)
                .await,
        );

        HealthCheckResponse {
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: HealthStatus::overall(&checks),
            uptime_seconds: uptime.as_secs(),
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        match PostgresStore::connect(&self.config.database_url).await {
            Ok(store) => match store.health_check().await {
                Ok(_) => {
                    let elapsed = start.elapsed().as_millis() as u64;
                    debug!(response_time_ms = elapsed, "Database health check passed");
                    ServiceHealth::healthy(elapsed)
                }
                Err(e) => {
                    warn!(error = %e, "Database health check failed");
                    ServiceHealth::unhealthy(format!("Health check query failed: {}", e))
                }
            },
            Err(e) => {
                warn!(error = %e, "Database connection failed");
                ServiceHealth::unhealthy(format!("Connection failed: {}", e))
            }
        }
    }

    async fn check_broker(&self) -> ServiceHealth {
        let start = Instant::now();

        match AmqpJobQueue::connect(&self.config).await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Broker health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Broker connection failed");
                ServiceHealth::unhealthy(format!("Connection failed: {}", e))
            }
        }
    }

    async fn check_http(&self, name: &str, base_url: &str) -> ServiceHealth {
        let start = Instant::now();
        let url = format!("{}/health", base_url);

        match reqwest::get(&url).await {
            Ok(response) if response.status().is_success() => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(service = name, response_time_ms = elapsed, "HTTP health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Ok(response) => {
                warn!(service = name, status = %response.status(), "HTTP health check failed");
                ServiceHealth::unhealthy(format!("Returned status {}", response.status()))
            }
            Err(e) => {
                warn!(service = name, error = %e, "HTTP health check unreachable");
                ServiceHealth::unhealthy(format!("Request failed: {}", e))
            }
        }
    }
}
