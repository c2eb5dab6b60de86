//! Bounded-attempt retry with uniform jittered backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::error::ReplicaError;

/// Retry policy applied to every transport call.
///
/// Unlike an exponential schedule, the wait between attempts is drawn
/// uniformly from `[min_backoff, max_backoff]` on every retry; the spread
/// alone de-synchronizes the many concurrent workers hammering the same
/// replica.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    min_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and backoff window.
    pub fn new(max_attempts: u32, min_backoff: Duration, max_backoff: Duration) -> Self {
        assert!(max_attempts > 0, "max_attempts must be greater than 0");
        assert!(
            max_backoff >= min_backoff,
            "max_backoff must be >= min_backoff"
        );
        Self {
            max_attempts,
            min_backoff,
            max_backoff,
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or exhausts the
    /// attempt budget. Transient failures sleep a jittered backoff between
    /// attempts; permanent failures surface immediately.
    pub async fn execute<T, F, Fut>(
        &self,
        context: &str,
        mut operation: F,
    ) -> Result<T, ReplicaError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ReplicaError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(context, "succeeded after {attempt} retries");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !err.is_transient() {
                        warn!(context, %err, "giving up after {attempt} attempts");
                        return Err(err);
                    }
                    let backoff = self.jittered_backoff();
                    warn!(
                        context,
                        %err,
                        "attempt {attempt}/{} failed, retrying in {backoff:?}",
                        self.max_attempts
                    );
                    sleep(backoff).await;
                }
            }
        }
    }

    fn jittered_backoff(&self) -> Duration {
        let min = u64::try_from(self.min_backoff.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max_backoff.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for RetryPolicy {
    /// Five attempts with 1-10 s jittered waits, matching the defaults of
    /// [`crate::domain::models::CheckConfig`].
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1), Duration::from_secs(10))
    }
}
