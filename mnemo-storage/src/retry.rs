//! Retry with jittered exponential backoff for transient store errors
//!
//! Policy (per store contract): base 100 ms, cap 2 s, at most 5 attempts.
//! Only errors classified transient are retried; the final error is
//! returned unchanged.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use mnemo_core::Result;

/// Base delay before the first retry
pub const BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Upper bound on any single delay
pub const BACKOFF_CAP: Duration = Duration::from_secs(2);
/// Total attempts, including the first
pub const MAX_ATTEMPTS: u32 = 5;

/// Run `op`, retrying transient failures with jittered backoff
///
/// # Errors
///
/// The last error once attempts are exhausted, or immediately for
/// non-transient failures.
pub async fn with_retry<T, F, Fut>(operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                let delay = backoff_delay(attempt, BACKOFF_BASE, BACKOFF_CAP);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient store error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Exponential delay for `attempt` (0-based) with full jitter
///
/// The deterministic ceiling is `min(base * 2^attempt, cap)`; the actual
/// delay is uniform in `[ceiling / 2, ceiling]`.
#[must_use]
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exp = base.saturating_mul(1_u32 << attempt.min(16));
    let ceiling = exp.min(cap);
    let half = ceiling / 2;
    if half.is_zero() {
        return ceiling;
    }
    let jitter_ms = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
    half + Duration::from_millis(jitter_ms)
}
