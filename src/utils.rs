use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::models::retry::RetryConfig;

/// Delay before executing attempt `attempt + 1`, given `attempt` completed
/// executions. Exponential with a cap; jitter is applied by the callers that
/// sleep on it.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let delay_ms = config
        .initial_delay_ms
        .saturating_mul(config.backoff_multiplier.saturating_pow(exponent))
        .min(config.max_delay_ms);

    Duration::from_millis(delay_ms)
}

/// Jittered variant (±10%), used between queue redeliveries so parallel
/// retries don't thundering-herd a recovering dependency.
pub fn jittered_backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base = backoff_delay(config, attempt).as_millis() as f64;
    let jitter = rand::random_range(-0.1..=0.1);

    Duration::from_millis((base * (1.0 + jitter)) as u64)
}

/// Retries an in-process operation with exponential backoff. Used for
/// connection bootstrap; handler-level failures are retried by the job queue
/// instead.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        attempt,
                        max_attempts = config.max_attempts,
                        "Retry succeeded"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    warn!(
                        max_attempts = config.max_attempts,
                        error = %e,
                        "Retry failed after exhausting all attempts"
                    );
                    return Err(e);
                }

                let delay = jittered_backoff_delay(config, attempt);

                debug!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retry attempt failed, backing off"
                );

                sleep(delay).await;
            }
        }
    }
}
