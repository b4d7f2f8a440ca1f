//! Generic retry-with-backoff for external calls.
//!
//! ## Retry Strategy
//!
//! Overload responses from model APIs are transient and frequent under
//! sustained load. Exponential backoff (`base_delay * 2^(attempt-1)`)
//! avoids thundering-herd: with a 2 s base and 3 attempts the wait sequence
//! is 2 s → 4 s, totalling 6 s of backoff per call site.
//!
//! The same policy wraps all three external-model call sites (extraction,
//! consolidation, recommendation), so the attempt/delay contract lives in
//! exactly one place. What counts as *transient* is the error's own
//! business — implement [`Transient`] and the policy never needs to know
//! about HTTP status codes.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// Classifies an error as worth retrying or permanently failed.
pub trait Transient {
    /// `true` when a later attempt could plausibly succeed (overloaded
    /// backend, dropped connection). `false` aborts the retry loop
    /// immediately.
    fn is_transient(&self) -> bool;
}

/// Retry policy: fixed attempt budget with doubling delays between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Always ≥ 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each one after.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay preceding `attempt` (2-indexed; attempt 1 never waits).
    fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(2))
    }

    /// Drive `op` until it succeeds, fails permanently, or the attempt
    /// budget runs out. `op` receives the 1-indexed attempt number.
    ///
    /// The final error is returned unchanged, so call sites keep full
    /// information for their own degrade decision (empty result, raw
    /// fallback, ...).
    pub async fn run<T, E, F, Fut>(&self, context: &str, mut op: F) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_before(attempt + 1);
                    warn!(
                        "{context}: attempt {attempt}/{} failed ({e}), retrying in {:.0}s",
                        self.max_attempts,
                        delay.as_secs_f64()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        "{context}: giving up after attempt {attempt}/{} — {e}",
                        self.max_attempts
                    );
                    return Err(e);
                }
            }
        }
    }
}
