//! Timeout and retry helpers shared by every outbound client.
//!
//! Each stage owns its own budget: the helper takes an explicit timeout and
//! the request's cancellation token, so a cancelled request stops waiting
//! immediately instead of running its I/O to completion.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Why a bounded operation stopped before producing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Timeout,
    Cancelled,
}

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interrupted::Timeout => write!(f, "timeout"),
            Interrupted::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Run `fut` under a deadline, racing the request's cancellation token.
pub async fn with_deadline<F>(
    timeout: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, Interrupted>
where
    F: Future,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        outcome = tokio::time::timeout(timeout, fut) => {
            outcome.map_err(|_| Interrupted::Timeout)
        }
    }
}

/// Fixed backoff schedule. `attempts` includes the first try; the schedule
/// is consumed between tries (shorter schedules repeat their last entry).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: &'static [Duration],
}

impl RetryPolicy {
    pub const fn new(attempts: u32, backoff: &'static [Duration]) -> Self {
        Self { attempts, backoff }
    }

    fn delay(&self, completed_attempts: u32) -> Duration {
        if self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let idx = (completed_attempts as usize - 1).min(self.backoff.len() - 1);
        self.backoff[idx]
    }
}

/// Geocoding: 2 attempts, 500 ms between.
pub const GEOCODING_RETRY: RetryPolicy = RetryPolicy::new(2, &[Duration::from_millis(500)]);
/// Places provider: 2 attempts, 1 s between.
pub const PLACES_RETRY: RetryPolicy = RetryPolicy::new(2, &[Duration::from_secs(1)]);
/// Web search: 3 attempts, exponential 1-2-4 s.
pub const WEBSEARCH_RETRY: RetryPolicy = RetryPolicy::new(
    3,
    &[
        Duration::from_secs(1),
        Duration::from_secs(2),
        Duration::from_secs(4),
    ],
);

/// Retry `op` on errors `is_retryable` accepts. Cancellation aborts between
/// attempts; the final error is returned as-is.
pub async fn with_retry<T, E, Op, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    is_retryable: impl Fn(&E) -> bool,
    mut op: Op,
) -> Result<T, E>
where
    E: std::fmt::Display,
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.attempts && is_retryable(&err) => {
                let delay = policy.delay(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Retrying after transient error");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(err),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Shared retryability rule for HTTP statuses: 429 and 5xx only.
pub fn status_is_retryable(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn deadline_times_out() {
        let cancel = CancellationToken::new();
        let outcome = with_deadline(Duration::from_millis(10), &cancel, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;
        assert_eq!(outcome.unwrap_err(), Interrupted::Timeout);
    }

    #[tokio::test]
    async fn deadline_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = with_deadline(Duration::from_secs(5), &cancel, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;
        assert_eq!(outcome.unwrap_err(), Interrupted::Cancelled);
    }

    #[tokio::test]
    async fn retry_stops_after_budget() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new(3, &[Duration::ZERO]);
        let outcome: Result<(), String> = with_retry(&policy, &cancel, |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("transient".to_string()) }
        })
        .await;
        assert!(outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_skips_non_retryable() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new(3, &[Duration::ZERO]);
        let outcome: Result<(), String> = with_retry(&policy, &cancel, |_| false, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("fatal".to_string()) }
        })
        .await;
        assert!(outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retryable_statuses() {
        assert!(status_is_retryable(429));
        assert!(status_is_retryable(500));
        assert!(status_is_retryable(503));
        assert!(!status_is_retryable(400));
        assert!(!status_is_retryable(404));
    }
}
