use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Bounded retry with exponential backoff for calls to external services.
/// The delay doubles with each attempt and is capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(10),
        }
    }

    /// Run `op` until it succeeds or `max_attempts` is exhausted. The last
    /// error is returned to the caller unchanged.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts => {
                    let exponential = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    let delay = exponential.min(self.max_delay);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        label,
                        attempt,
                        self.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!("{} failed after {} attempts: {}", label, attempt, e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(100));

        let result = policy
            .run("test op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(anyhow::anyhow!("transient").into())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn propagates_last_error_when_exhausted() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(100));

        let result: Result<()> = policy
            .run("test op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow::anyhow!("permanent").into()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn first_success_makes_no_second_call() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result = policy
            .run("test op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("done") }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
