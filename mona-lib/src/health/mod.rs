//! Connection health and reconnect backoff.
//!
//! The stream client runs a health pass on a fixed interval. Each pass takes a
//! [`ConnectionHealth`] snapshot per connection and acts on its
//! [`HealthVerdict`]; the arithmetic lives here so it can be tested without a
//! runtime.

use crate::config::StreamConfig;
use crate::protocol::ChannelKey;
use crate::stream::ConnectionState;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of assessing one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthVerdict {
    /// Connection is delivering or recently delivered events.
    Healthy,
    /// Consecutive errors reached the configured threshold.
    TooManyErrors,
    /// No event or heartbeat within the staleness window.
    Stale,
}

impl HealthVerdict {
    pub fn is_healthy(&self) -> bool {
        *self == Self::Healthy
    }
}

/// Point-in-time health of a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionHealth {
    pub key: ChannelKey,
    pub state: ConnectionState,
    pub consecutive_errors: u32,
    /// Time since the last event, heartbeat, or creation when nothing arrived yet.
    pub idle_for: Duration,
    /// Whether any event has been received on this connection.
    pub has_received_event: bool,
    pub in_background: bool,
    pub auto_reconnect: bool,
}

impl ConnectionHealth {
    /// `consecutive_errors` below the configured threshold.
    pub fn is_healthy(&self, config: &StreamConfig) -> bool {
        self.consecutive_errors < config.max_consecutive_errors
    }

    pub fn verdict(&self, config: &StreamConfig) -> HealthVerdict {
        assess(self.consecutive_errors, self.idle_for, config)
    }
}

/// Error threshold wins over staleness; an idle window equal to the limit is
/// still healthy.
pub fn assess(consecutive_errors: u32, idle_for: Duration, config: &StreamConfig) -> HealthVerdict {
    if consecutive_errors >= config.max_consecutive_errors {
        HealthVerdict::TooManyErrors
    } else if idle_for > config.stale_after() {
        HealthVerdict::Stale
    } else {
        HealthVerdict::Healthy
    }
}

/// Backoff multiplier: `min(errors * 2, cap)`, never below 1.
pub fn backoff_multiplier(consecutive_errors: u32, cap: u32) -> u32 {
    consecutive_errors.saturating_mul(2).min(cap).max(1)
}

/// Delay before the next reconnect attempt.
///
/// The base is `error_base_delay_secs` when the connection last failed and
/// `base_delay_secs` after a clean close or a forced reconnect.
pub fn reconnect_delay(
    config: &StreamConfig,
    consecutive_errors: u32,
    after_error: bool,
) -> Duration {
    let base = if after_error {
        config.error_base_delay_secs
    } else {
        config.base_delay_secs
    };
    let multiplier = backoff_multiplier(consecutive_errors, config.max_backoff_multiplier);
    Duration::from_secs(base.saturating_mul(u64::from(multiplier)))
}
