use stocksync::config::{RateLimitSettings, RetrySettings, SyncConfig};

/// Engine config pointed at mock servers, with spacing and backoff tuned
/// so tests run in milliseconds.
pub fn test_config(stock_url: &str, orders_url: &str) -> SyncConfig {
    SyncConfig {
        stock_api_url: stock_url.to_string(),
        orders_api_url: orders_url.to_string(),
        lookback_days: 7,
        poll_interval_secs: 1,
        poll_timeout_secs: 3,
        run_timeout_secs: 30,
        request_timeout_secs: 5,
        rate_limit: RateLimitSettings {
            requests_per_window: 10_000,
            window_secs: 60,
            min_spacing_ms: 0,
        },
        retry: RetrySettings {
            max_attempts: 3,
            base_backoff_ms: 1,
            max_backoff_ms: 2,
        },
    }
}
