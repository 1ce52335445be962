//! Request spacing for the external marketplace APIs.
//!
//! Both documented endpoints enforce a requests-per-window quota and, in
//! practice, also punish bursts, so the limiter combines a fixed window
//! counter with a minimum inter-request spacing. Unlike a middleware-style
//! limiter that rejects over-quota calls, this one suspends the caller until
//! a slot is free; clients always wait, never error, on admission.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window: Duration,
    /// Minimum gap between consecutive requests, applied on top of the
    /// window quota.
    pub min_spacing: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            window: Duration::from_secs(60),
            min_spacing: Duration::from_millis(200),
        }
    }
}

#[derive(Debug)]
struct LimiterState {
    window_start: Instant,
    count: u32,
    last_request: Option<Instant>,
}

/// Process-local admission gate shared by all calls of one client.
///
/// State lives behind a `tokio::sync::Mutex` so concurrent callers within a
/// client serialize on admission; this is the only shared mutable resource
/// in the engine.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            state: Mutex::new(LimiterState {
                window_start: now,
                count: 0,
                last_request: None,
            }),
        }
    }

    /// Suspend until the next request may be sent, then consume a slot.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                if now.duration_since(state.window_start) >= self.config.window {
                    state.window_start = now;
                    state.count = 0;
                }

                let spacing_wait = state
                    .last_request
                    .and_then(|last| {
                        self.config
                            .min_spacing
                            .checked_sub(now.duration_since(last))
                    })
                    .filter(|wait| !wait.is_zero());

                if state.count < self.config.requests_per_window && spacing_wait.is_none() {
                    state.count += 1;
                    state.last_request = Some(now);
                    return;
                }

                if state.count >= self.config.requests_per_window {
                    // Window exhausted: wait for it to roll over.
                    let until_reset = self.config.window
                        - now.duration_since(state.window_start);
                    spacing_wait
                        .map_or(until_reset, |spacing| spacing.max(until_reset))
                } else {
                    spacing_wait.unwrap_or_default()
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "rate limit wait");
            sleep(wait).await;
        }
    }
}
