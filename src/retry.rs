//! Retry with exponential backoff, shared by both source clients.
//!
//! The historical scripts sprinkled ad-hoc retries across call sites; here
//! there is exactly one attempt loop, parameterized by the attempt ceiling
//! and the error's own transient/fatal classification. Fatal errors (auth
//! rejections, malformed payloads) abort on the first attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use crate::errors::SyncError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given retry (1-based), doubled per attempt and
    /// jittered to avoid retry alignment across tenants.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_backoff);
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        exp.mul_f64(jitter)
    }
}

/// Run `op` until it succeeds, fails fatally, or exhausts the attempt
/// ceiling. The last error is surfaced unchanged when attempts run out.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let backoff = policy.backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
