use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use validator::Validate;

use crate::errors::SyncError;
use crate::rate_limiter::RateLimitConfig;
use crate::retry::RetryPolicy;

/// Default values for configuration
const DEFAULT_LOOKBACK_DAYS: i64 = 7;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RUN_TIMEOUT_SECS: u64 = 600;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 60;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_MIN_SPACING_MS: u64 = 200;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_BACKOFF_MS: u64 = 500;
const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 10_000;
const CONFIG_FILE: &str = "config/stocksync";
const ENV_PREFIX: &str = "STOCKSYNC";

/// Retry settings shared by both source clients.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    /// Attempt ceiling for transient failures (the first call counts)
    #[serde(default = "default_retry_max_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,

    /// Backoff before the first retry; doubles per attempt
    #[serde(default = "default_retry_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Backoff cap
    #[serde(default = "default_retry_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_backoff_ms: DEFAULT_RETRY_BASE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_RETRY_MAX_BACKOFF_MS,
        }
    }
}

/// Request spacing settings honoring the documented external limits.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSettings {
    #[serde(default = "default_rate_limit_requests")]
    #[validate(range(min = 1))]
    pub requests_per_window: u32,

    #[serde(default = "default_rate_limit_window_secs")]
    #[validate(range(min = 1))]
    pub window_secs: u64,

    #[serde(default = "default_min_spacing_ms")]
    pub min_spacing_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_window: DEFAULT_RATE_LIMIT_REQUESTS,
            window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            min_spacing_ms: DEFAULT_MIN_SPACING_MS,
        }
    }
}

/// Engine configuration, passed explicitly into clients and the sync
/// service at construction. There is no ambient/static configuration state.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Base URL of the stock report API (task create / poll / download)
    #[serde(default = "default_stock_api_url")]
    #[validate(url)]
    pub stock_api_url: String,

    /// Base URL of the order log API
    #[serde(default = "default_orders_api_url")]
    #[validate(url)]
    pub orders_api_url: String,

    /// Order look-back window in days
    #[serde(default = "default_lookback_days")]
    #[validate(range(min = 1, max = 90))]
    pub lookback_days: i64,

    /// Interval between stock report status polls
    #[serde(default = "default_poll_interval_secs")]
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,

    /// Hard cap on total stock report poll time
    #[serde(default = "default_poll_timeout_secs")]
    #[validate(range(min = 1))]
    pub poll_timeout_secs: u64,

    /// Hard cap on one whole reconciliation run
    #[serde(default = "default_run_timeout_secs")]
    #[validate(range(min = 1))]
    pub run_timeout_secs: u64,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    #[serde(default)]
    #[validate]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    #[validate]
    pub retry: RetrySettings,
}

fn default_stock_api_url() -> String {
    "https://seller-analytics-api.wildberries.ru".to_string()
}

fn default_orders_api_url() -> String {
    "https://statistics-api.wildberries.ru".to_string()
}

fn default_lookback_days() -> i64 {
    DEFAULT_LOOKBACK_DAYS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_poll_timeout_secs() -> u64 {
    DEFAULT_POLL_TIMEOUT_SECS
}

fn default_run_timeout_secs() -> u64 {
    DEFAULT_RUN_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_rate_limit_requests() -> u32 {
    DEFAULT_RATE_LIMIT_REQUESTS
}

fn default_rate_limit_window_secs() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}

fn default_min_spacing_ms() -> u64 {
    DEFAULT_MIN_SPACING_MS
}

fn default_retry_max_attempts() -> u32 {
    DEFAULT_RETRY_MAX_ATTEMPTS
}

fn default_retry_base_backoff_ms() -> u64 {
    DEFAULT_RETRY_BASE_BACKOFF_MS
}

fn default_retry_max_backoff_ms() -> u64 {
    DEFAULT_RETRY_MAX_BACKOFF_MS
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stock_api_url: default_stock_api_url(),
            orders_api_url: default_orders_api_url(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            run_timeout_secs: DEFAULT_RUN_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            rate_limit: RateLimitSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl SyncConfig {
    /// Load from the optional config file plus `STOCKSYNC_*` environment
    /// overrides, then validate.
    pub fn load() -> Result<Self, SyncError> {
        let raw = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e: ConfigError| SyncError::Config(e.to_string()))?;

        let cfg: SyncConfig = raw
            .try_deserialize()
            .map_err(|e| SyncError::Config(e.to_string()))?;
        cfg.validated()
    }

    /// Validate a directly-constructed configuration.
    pub fn validated(self) -> Result<Self, SyncError> {
        self.validate()
            .map_err(|e| SyncError::Config(e.to_string()))?;
        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::days(self.lookback_days)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_backoff: Duration::from_millis(self.retry.base_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_window: self.rate_limit.requests_per_window,
            window: Duration::from_secs(self.rate_limit.window_secs),
            min_spacing: Duration::from_millis(self.rate_limit.min_spacing_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = SyncConfig::default();
        assert!(cfg.validated().is_ok());
    }

    #[test]
    fn rejects_zero_lookback() {
        let cfg = SyncConfig {
            lookback_days: 0,
            ..SyncConfig::default()
        };
        assert!(matches!(cfg.validated(), Err(SyncError::Config(_))));
    }

    #[test]
    fn rejects_zero_retry_attempts() {
        let cfg = SyncConfig {
            retry: RetrySettings {
                max_attempts: 0,
                ..RetrySettings::default()
            },
            ..SyncConfig::default()
        };
        assert!(matches!(cfg.validated(), Err(SyncError::Config(_))));
    }

    #[test]
    fn duration_helpers_reflect_settings() {
        let cfg = SyncConfig {
            poll_interval_secs: 2,
            poll_timeout_secs: 30,
            ..SyncConfig::default()
        };
        assert_eq!(cfg.poll_interval(), Duration::from_secs(2));
        assert_eq!(cfg.poll_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.lookback(), chrono::Duration::days(7));
    }
}
