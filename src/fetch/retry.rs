use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Randomized exponential backoff.
///
/// The n-th retry waits a uniformly random duration in `[d/2, d]` where
/// `d = min(max_delay, initial_delay * 2^(n-1))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts including the first. `None` never gives up.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Upper bound of the wait before retry number `retry` (1-based).
    pub fn ceiling(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1).min(31)).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn delay(&self, retry: u32) -> Duration {
        let ceiling = self.ceiling(retry);
        let millis = ceiling.as_millis() as u64;
        if millis < 2 {
            return ceiling;
        }
        Duration::from_millis(rand::thread_rng().gen_range(millis / 2..=millis))
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(false, |max| attempts >= max)
    }
}

/// Runs `op` until it succeeds, fails with an error `is_retryable` rejects, or the policy's
/// attempt budget is spent. The last error is returned.
pub async fn retry<T, E, F, Fut, P>(policy: &RetryPolicy, is_retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) || policy.exhausted(attempts) => return Err(e),
            Err(e) => {
                let delay = policy.delay(attempts);
                tracing::warn!(attempt = attempts, delay_ms = delay.as_millis() as u64, "request failed, retrying: {e}");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
