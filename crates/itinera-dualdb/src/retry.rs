//! Bounded retry with per-attempt timeout racing.
//!
//! Shared by the primary and backup write paths with their own retry/timeout
//! parameters. Backoff between failed attempts is pure exponential, base 2,
//! no jitter: `2^attempt` seconds with the attempt index starting at 0.

use crate::error::{DbResult, DualDbError};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{error, warn};

/// Runs `operation` up to `retries + 1` times, racing each attempt against
/// `attempt_timeout`.
///
/// A fired timer yields [`DualDbError::Timeout`] for that attempt; the
/// operation's own eventual result is discarded, not cancelled beyond the
/// future being dropped. On exhaustion the most recent attempt's error is
/// returned, never an aggregate.
pub async fn execute_with_retry<F, Fut, T>(
    operation_name: &str,
    retries: u32,
    attempt_timeout: Duration,
    operation: F,
) -> DbResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let total_attempts = retries + 1;
    let mut last_error = None;

    for attempt in 0..total_attempts {
        let result = match timeout(attempt_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(DualDbError::Timeout {
                operation: operation_name.to_string(),
                timeout_ms: attempt_timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt + 1 < total_attempts {
                    let backoff = Duration::from_secs(2_u64.saturating_pow(attempt));
                    warn!(
                        "Operation '{}' failed (attempt {}/{}), retrying in {}s: {}",
                        operation_name,
                        attempt + 1,
                        total_attempts,
                        backoff.as_secs(),
                        err
                    );
                    sleep(backoff).await;
                } else {
                    error!(
                        "Operation '{}' exhausted {} attempts: {}",
                        operation_name, total_attempts, err
                    );
                }
                last_error = Some(err);
            }
        }
    }

    // retries + 1 >= 1, so at least one attempt ran and recorded its error.
    Err(last_error.unwrap_or_else(|| DualDbError::Config(
        format!("operation '{operation_name}' ran zero attempts"),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_attempt_success_no_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = Arc::clone(&calls);
        let result = execute_with_retry("op", 3, Duration::from_secs(1), move || {
            let calls = Arc::clone(&calls_ref);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, DualDbError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_invokes_n_plus_one_and_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = Arc::clone(&calls);
        let result: DbResult<()> =
            execute_with_retry("flaky", 2, Duration::from_secs(1), move || {
                let calls = Arc::clone(&calls_ref);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(DualDbError::Config(format!("failure #{n}")))
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(DualDbError::Config(msg)) => assert_eq!(msg, "failure #3"),
            other => panic!("expected last attempt's error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = Arc::clone(&calls);
        let result = execute_with_retry("transient", 3, Duration::from_secs(1), move || {
            let calls = Arc::clone(&calls_ref);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DualDbError::Config("transient".to_string()))
                } else {
                    Ok("recovered")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_surfaces_as_timeout_error() {
        let result: DbResult<()> =
            execute_with_retry("slow", 0, Duration::from_millis(50), || async {
                sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        match result {
            Err(DualDbError::Timeout { operation, timeout_ms }) => {
                assert_eq!(operation, "slow");
                assert_eq!(timeout_ms, 50);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_between_attempts() {
        let started = tokio::time::Instant::now();
        let _: DbResult<()> =
            execute_with_retry("backoff", 2, Duration::from_secs(1), || async {
                Err(DualDbError::Config("nope".to_string()))
            })
            .await;
        // 2^0 + 2^1 seconds of backoff between the three attempts.
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
