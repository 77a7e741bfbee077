//! Error types for Mona operations.
//!
//! The taxonomy mirrors how each failure is recovered:
//! - transport errors are retried by the connection backoff and never
//!   escalate past the stream client,
//! - parse errors are dropped after being logged,
//! - auth and gateway errors end the current checkout attempt unless the
//!   gateway returned a continuation task,
//! - state errors are programming errors and fail fast.

use crate::gateway::GatewayError;
use crate::secure_storage::SecureStoreError;

/// Error codes for FFI and mobile integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MonaErrorCode {
    /// Transport/network layer error
    Transport = 2000,
    /// Connection failed
    ConnectionFailed = 2001,
    /// Connection timeout
    ConnectionTimeout = 2002,
    /// Authentication/authorization error
    Auth = 3000,
    /// Payment gateway rejected or failed the request
    Gateway = 4000,
    /// Malformed channel payload
    Parse = 5000,
    /// Invalid request/data
    InvalidData = 5001,
    /// Serialization error
    Serialization = 5002,
    /// Operation invoked in the wrong state
    State = 6000,
    /// Secure storage error
    SecureStore = 7000,
    /// Internal/unexpected error
    Internal = 9999,
}

/// Error type shared by the stream client, the router and the collaborators.
#[derive(Debug, thiserror::Error)]
pub enum MonaError {
    /// Transport/network layer error on a channel.
    #[error("transport error: {0}")]
    Transport(String),

    /// Connection could not be opened.
    #[error("connection to {target} failed: {reason}")]
    ConnectionFailed {
        /// Target URL
        target: String,
        /// Underlying error message
        reason: String,
    },

    /// Connection attempt timed out.
    #[error("{operation} timed out after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Operation that timed out
        operation: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Channel payload could not be interpreted.
    #[error("parse error: {0}")]
    Parse(String),

    /// Signing, login or key commit failed.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Payment gateway error.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Operation invoked outside its required state.
    #[error("invalid state: {0}")]
    State(String),

    /// Secure storage failure.
    #[error(transparent)]
    SecureStore(#[from] SecureStoreError),

    /// Invalid data provided.
    #[error("invalid {field}: {reason}")]
    InvalidData {
        /// Field or parameter name
        field: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal/unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MonaError {
    /// Get the error code for FFI/mobile integration.
    pub fn code(&self) -> MonaErrorCode {
        match self {
            Self::Transport(_) => MonaErrorCode::Transport,
            Self::ConnectionFailed { .. } => MonaErrorCode::ConnectionFailed,
            Self::ConnectionTimeout { .. } => MonaErrorCode::ConnectionTimeout,
            Self::Parse(_) => MonaErrorCode::Parse,
            Self::Auth(_) => MonaErrorCode::Auth,
            Self::Gateway(_) => MonaErrorCode::Gateway,
            Self::State(_) => MonaErrorCode::State,
            Self::SecureStore(_) => MonaErrorCode::SecureStore,
            Self::InvalidData { .. } => MonaErrorCode::InvalidData,
            Self::Serialization(_) => MonaErrorCode::Serialization,
            Self::Internal(_) => MonaErrorCode::Internal,
        }
    }

    /// Get the error message as an owned String (useful for FFI).
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns true if the stream client recovers from this error on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::ConnectionFailed { .. } | Self::ConnectionTimeout { .. } => {
                true
            }
            Self::Gateway(err) => err.is_transport(),
            _ => false,
        }
    }

    /// Create a transport error from any error type.
    pub fn transport<E: std::error::Error>(err: E) -> Self {
        Self::Transport(err.to_string())
    }

    /// Create an invalid data error.
    pub fn invalid_data(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidData {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a state error.
    pub fn state(reason: impl Into<String>) -> Self {
        Self::State(reason.into())
    }
}

impl From<serde_json::Error> for MonaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = MonaError::ConnectionTimeout {
            operation: "open channel".to_string(),
            timeout_ms: 30_000,
        };
        assert_eq!(err.code(), MonaErrorCode::ConnectionTimeout);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "open channel timed out after 30000ms");
    }

    #[test]
    fn test_parse_and_state_not_retryable() {
        assert!(!MonaError::Parse("bad json".into()).is_retryable());
        assert!(!MonaError::state("no session").is_retryable());
        assert_eq!(MonaError::state("x").code(), MonaErrorCode::State);
    }

    #[test]
    fn test_gateway_retryability_follows_kind() {
        let rejected: MonaError = GatewayError::Rejected {
            status: 400,
            message: "card declined".into(),
        }
        .into();
        assert!(!rejected.is_retryable());
        assert!(rejected.to_string().contains("card declined"));

        let transport: MonaError = GatewayError::Transport("reset by peer".into()).into();
        assert!(transport.is_retryable());
    }

    #[test]
    fn test_helper_constructors() {
        let err = MonaError::invalid_data("identifier", "must not be empty");
        assert_eq!(err.code(), MonaErrorCode::InvalidData);
        assert_eq!(err.to_string(), "invalid identifier: must not be empty");
    }
}
