//! Retry with exponential backoff for Redmine calls
//!
//! Transient failures (connection errors, timeouts, 5xx, 429) are retried with
//! exponential backoff and jitter. A server-provided delay wins over the
//! computed one.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How often and how patiently to retry
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Spread retries by up to 25%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Fail fast; for one-shot CLI commands
    pub fn interactive() -> Self {
        Self {
            max_retries: 1,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_secs_f64());

        if self.jitter {
            Duration::from_secs_f64(capped * (1.0 + jitter_fraction() * 0.25))
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// 0.0..1.0 from the clock's sub-second part
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    /// Retry after the server-provided delay
    RetryAfter(Duration),
    /// Permanent failure
    NoRetry,
}

/// Errors that know whether they are worth retrying
pub trait RetryableError {
    fn retry_decision(&self) -> RetryDecision;
}

/// Run `operation`, retrying transient failures per `policy`
///
/// Returns the last error once retries are exhausted.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let delay = match err.retry_decision() {
            RetryDecision::NoRetry => {
                debug!(operation = operation_name, attempt, error = %err, "Permanent failure");
                return Err(err);
            }
            _ if attempt >= policy.max_retries => {
                warn!(
                    operation = operation_name,
                    attempts = attempt + 1,
                    error = %err,
                    "Giving up"
                );
                return Err(err);
            }
            RetryDecision::RetryAfter(d) => d.min(policy.max_backoff),
            RetryDecision::Retry => policy.backoff(attempt),
        };

        warn!(
            operation = operation_name,
            attempt = attempt + 1,
            max_attempts = policy.max_retries + 1,
            backoff_secs = delay.as_secs_f64(),
            error = %err,
            "Retrying"
        );

        sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventSyncError;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            jitter: false,
            ..RetryPolicy::default()
        };

        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
    }

    #[test]
    fn test_interactive_policy_fails_fast() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::interactive()
        };
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(8), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_secs(2),
            jitter: true,
            ..RetryPolicy::default()
        };
        let delay = policy.backoff(0);
        assert!(delay >= Duration::from_secs(2));
        assert!(delay <= Duration::from_millis(2500));
    }

    #[tokio::test]
    async fn test_transient_network_error_is_retried() {
        let mut calls = 0;
        let result: Result<u32, EventSyncError> = with_retry(&fast(3), "list_issues", || {
            calls += 1;
            let n = calls;
            async move {
                if n < 3 {
                    Err(EventSyncError::Network("connection reset".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let mut calls = 0;
        let result: Result<(), EventSyncError> = with_retry(&fast(2), "list_issues", || {
            calls += 1;
            async { Err(EventSyncError::Network("timeout".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), EventSyncError> = with_retry(&fast(3), "get_issue", || {
            calls += 1;
            async { Err(EventSyncError::Redmine(redmine::Error::Unauthorized)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_zero_retries_makes_one_attempt() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        let mut calls = 0;
        let _: Result<(), EventSyncError> = with_retry(&policy, "op", || {
            calls += 1;
            async { Err(EventSyncError::Network("down".to_string())) }
        })
        .await;
        assert_eq!(calls, 1);
    }
}
