//! Explicit retry policy for transient backend errors (C1 §4.1).
//!
//! The source this crate's control plane is modeled on would couple retry
//! to an exception hierarchy; here it's an explicit value passed around,
//! so a test can inject a fault schedule and assert on the exact sequence
//! of attempts rather than mocking an exception type.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::StoreError;

/// Exponential backoff with full jitter, matching §4.1's schedule: 100ms,
/// 200ms, 400ms, 800ms, 1600ms, capped at 3200ms.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Base delay for the first retry.
    pub base: Duration,
    /// Maximum delay, regardless of attempt count.
    pub cap: Duration,
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            cap: Duration::from_millis(3200),
            max_attempts: 6,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries — useful for tests that want a single
    /// deterministic attempt.
    #[must_use]
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            cap: Duration::ZERO,
            max_attempts: 1,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = exp.min(self.cap);
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis().max(1) as u64);
        Duration::from_millis(jitter_ms)
    }

    /// Run `op` up to `max_attempts` times, retrying only on
    /// [`StoreError::Unavailable`] (the transient kind). Non-retryable
    /// errors (`AlreadyExists`, `ConditionFailed`, `NotFound`) propagate
    /// immediately, matching the "non-retryable errors propagate
    /// immediately" clause.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(StoreError::Unavailable(msg)) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(StoreError::Unavailable(msg));
                    }
                    let delay = self.delay_for_attempt(attempt - 1);
                    tracing::warn!(attempt, ?delay, "retrying store operation after transient error: {msg}");
                    tokio::time::sleep(delay).await;
                }
                Err(other) => return Err(other),
            }
        }
    }
}
