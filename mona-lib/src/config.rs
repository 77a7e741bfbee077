//! Configuration types for the event stream and the merchant API.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the server-push stream client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Base URL channel paths are appended to (e.g., "https://mona-rtdb.example.com").
    pub base_url: String,

    /// Interval between health passes, in seconds.
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    /// Idle time after which a connection is considered stale, in seconds.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Heartbeat period while a connection is background-maintained, in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Consecutive errors at which a connection stops counting as healthy.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// Reconnect base delay after a clean close, in seconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,

    /// Reconnect base delay after a transport error, in seconds.
    #[serde(default = "default_error_base_delay")]
    pub error_base_delay_secs: u64,

    /// Cap on the backoff multiplier.
    #[serde(default = "default_max_backoff_multiplier")]
    pub max_backoff_multiplier: u32,

    /// Timeout for opening a channel, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Shortest timer period; `tokio::time::interval` rejects zero.
const MIN_PERIOD_SECS: u64 = 1;

fn default_health_check_interval() -> u64 {
    30
}

fn default_stale_after() -> u64 {
    300
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_max_consecutive_errors() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    3
}

fn default_error_base_delay() -> u64 {
    5
}

fn default_max_backoff_multiplier() -> u32 {
    8
}

fn default_connect_timeout() -> u64 {
    30
}

impl StreamConfig {
    /// Create a stream configuration with default timings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            health_check_interval_secs: default_health_check_interval(),
            stale_after_secs: default_stale_after(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            max_consecutive_errors: default_max_consecutive_errors(),
            base_delay_secs: default_base_delay(),
            error_base_delay_secs: default_error_base_delay(),
            max_backoff_multiplier: default_max_backoff_multiplier(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }

    /// Full URL for a channel path.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Health pass period, at least one second.
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs.max(MIN_PERIOD_SECS))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Heartbeat period, at least one second.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(MIN_PERIOD_SECS))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Set the health check interval.
    pub fn with_health_check_interval(mut self, secs: u64) -> Self {
        self.health_check_interval_secs = secs;
        self
    }

    /// Set the staleness threshold.
    pub fn with_stale_after(mut self, secs: u64) -> Self {
        self.stale_after_secs = secs;
        self
    }

    /// Set the background heartbeat period.
    pub fn with_heartbeat_interval(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }

    /// Set both reconnect base delays.
    pub fn with_base_delays(mut self, clean_secs: u64, error_secs: u64) -> Self {
        self.base_delay_secs = clean_secs;
        self.error_base_delay_secs = error_secs;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }
}

/// Merchant API configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonaConfig {
    /// Merchant backend base URL.
    pub api_url: String,

    /// Hosted pay page origin used for redirects.
    pub pay_host: String,

    /// Merchant key sent as `loginScope` on redirects.
    pub merchant_key: String,

    #[serde(default = "default_checkout_path")]
    pub checkout_path: String,

    #[serde(default = "default_login_path")]
    pub login_path: String,

    #[serde(default = "default_key_begin_path")]
    pub key_begin_path: String,

    #[serde(default = "default_key_commit_path")]
    pub key_commit_path: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// RSA public key (PEM) used to encrypt PINs when a task carries none.
    #[serde(default)]
    pub pin_public_key_pem: Option<String>,

    /// Event stream settings.
    pub stream: StreamConfig,
}

fn default_checkout_path() -> String {
    "/demo/checkout".to_string()
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_key_begin_path() -> String {
    "/keys/begin".to_string()
}

fn default_key_commit_path() -> String {
    "/keys/commit".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl MonaConfig {
    /// Create a configuration with default paths.
    pub fn new(
        api_url: impl Into<String>,
        pay_host: impl Into<String>,
        merchant_key: impl Into<String>,
        stream: StreamConfig,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            pay_host: pay_host.into(),
            merchant_key: merchant_key.into(),
            checkout_path: default_checkout_path(),
            login_path: default_login_path(),
            key_begin_path: default_key_begin_path(),
            key_commit_path: default_key_commit_path(),
            timeout_secs: default_timeout(),
            pin_public_key_pem: None,
            stream,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Requires `MONA_API_URL`, `MONA_STREAM_URL`, `MONA_PAY_HOST` and
    /// `MONA_MERCHANT_KEY`. `MONA_TIMEOUT` and `MONA_PIN_PUBLIC_KEY` are optional.
    pub fn from_env() -> Option<Self> {
        let api_url = std::env::var("MONA_API_URL").ok()?;
        let stream_url = std::env::var("MONA_STREAM_URL").ok()?;
        let pay_host = std::env::var("MONA_PAY_HOST").ok()?;
        let merchant_key = std::env::var("MONA_MERCHANT_KEY").ok()?;

        let mut config = Self::new(api_url, pay_host, merchant_key, StreamConfig::new(stream_url));

        if let Ok(timeout) = std::env::var("MONA_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<u64>() {
                config = config.with_timeout(secs);
            }
        }

        if let Ok(pem) = std::env::var("MONA_PIN_PUBLIC_KEY") {
            config = config.with_pin_public_key(pem);
        }

        Some(config)
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the fallback PIN encryption key.
    pub fn with_pin_public_key(mut self, pem: impl Into<String>) -> Self {
        self.pin_public_key_pem = Some(pem.into());
        self
    }

    /// Override the checkout submission path.
    pub fn with_checkout_path(mut self, path: impl Into<String>) -> Self {
        self.checkout_path = path.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
