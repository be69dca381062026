use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Result, anyhow};

use dispatch_service::{
    models::retry::RetryConfig,
    utils::{backoff_delay, retry_with_backoff},
};

/// Bootstrap double standing in for the store or the broker: refuses the
/// first `outage` connection attempts, then accepts.
struct FlakyEndpoint {
    attempts: AtomicU32,
    outage: u32,
}

impl FlakyEndpoint {
    fn new(outage: u32) -> Self {
        Self {
            attempts: AtomicU32::new(0),
            outage,
        }
    }

    async fn connect(&self) -> Result<&'static str> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        if attempt < self.outage {
            Err(anyhow!("Connection refused"))
        } else {
            Ok("connected")
        }
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

fn bootstrap_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 5,
        max_delay_ms: 40,
        backoff_multiplier: 2,
    }
}

/// Test: A dependency that is up on the first attempt connects without
/// retrying
#[tokio::test]
async fn test_bootstrap_connects_first_try() -> Result<()> {
    let endpoint = FlakyEndpoint::new(0);

    let conn = retry_with_backoff(&bootstrap_retry(5), || endpoint.connect()).await?;

    assert_eq!(conn, "connected");
    assert_eq!(endpoint.attempts(), 1);

    Ok(())
}

/// Test: A dependency that comes up mid-outage is eventually connected,
/// without burning the rest of the budget
#[tokio::test]
async fn test_bootstrap_rides_out_an_outage() -> Result<()> {
    let endpoint = FlakyEndpoint::new(2);

    let conn = retry_with_backoff(&bootstrap_retry(5), || endpoint.connect()).await?;

    assert_eq!(conn, "connected");
    assert_eq!(endpoint.attempts(), 3, "Two refusals, then the accepted attempt");

    Ok(())
}

/// Test: A dependency that never comes up surfaces its last error after the
/// budget is spent, so startup fails loudly instead of hanging
#[tokio::test]
async fn test_bootstrap_gives_up_after_budget() -> Result<()> {
    let endpoint = FlakyEndpoint::new(u32::MAX);

    let result = retry_with_backoff(&bootstrap_retry(3), || endpoint.connect()).await;

    assert_eq!(endpoint.attempts(), 3);
    assert!(
        result.unwrap_err().to_string().contains("Connection refused"),
        "The dependency's own error must reach the caller"
    );

    Ok(())
}

/// Test: Backoff grows exponentially and respects the cap
#[test]
fn test_backoff_delay_growth_and_cap() {
    let config = RetryConfig {
        max_attempts: 10,
        initial_delay_ms: 100,
        max_delay_ms: 1000,
        backoff_multiplier: 2,
    };

    assert_eq!(backoff_delay(&config, 1).as_millis(), 100);
    assert_eq!(backoff_delay(&config, 2).as_millis(), 200);
    assert_eq!(backoff_delay(&config, 3).as_millis(), 400);
    assert_eq!(backoff_delay(&config, 4).as_millis(), 800);
    assert_eq!(backoff_delay(&config, 5).as_millis(), 1000, "Capped");
    assert_eq!(backoff_delay(&config, 9).as_millis(), 1000, "Still capped");
}
