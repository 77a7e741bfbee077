//! Mona checkout orchestration
//!
//! Drives a payment from method selection to a confirmed outcome: device key
//! exchange for saved methods, server-driven step-up tasks (request signing,
//! PIN and OTP challenges) and the asynchronous result delivered over the
//! event streams of [`mona_lib::stream::StreamClient`].
//!
//! ```ignore
//! use mona_checkout::{CheckoutOrchestrator, Collaborators, PaymentMethod};
//!
//! let mut checkout = CheckoutOrchestrator::new(config, client, collaborators);
//! checkout.select_method(PaymentMethod::SavedBank { bank_id: "b1".into() }, Some(1000)).await?;
//! let outcome = checkout.checkout().await?;
//! ```

pub mod cancel;
pub mod challenge;
pub mod collaborators;
pub mod options;
pub mod orchestrator;
pub mod session;
pub mod signing;
pub mod status;
pub mod task;

pub use cancel::{CancelHandle, SubscriptionGuard};
pub use challenge::{ChallengeKind, ChallengeRequest};
pub use collaborators::{CheckoutUi, Collaborators, ExternalAuthenticator, PromptConfig};
pub use options::CheckoutOptions;
pub use orchestrator::CheckoutOrchestrator;
pub use session::{CheckoutSession, PaymentMethod};
pub use signing::{SignatureHeaders, SigningRequest};
pub use status::{CheckoutState, StateCallback, StatusBoard};
pub use task::{CheckoutResponse, PaymentPayload, PaymentTask, TaskAction};

use mona_lib::gateway::GatewayError;
use mona_lib::secure_storage::SecureStoreError;
use mona_lib::MonaError;

/// Result type for checkout operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Stable numeric codes for [`CheckoutError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CheckoutErrorCode {
    Stream = 1000,
    Gateway = 2000,
    Declined = 2001,
    UnsupportedTask = 2002,
    TooManyRounds = 2003,
    Auth = 3000,
    NotAMonaUser = 3001,
    ConsentDeclined = 3002,
    SigningFailed = 3003,
    ChallengeAborted = 4000,
    InvalidInput = 4001,
    Encryption = 4002,
    TransactionFailed = 5000,
    Timeout = 5001,
    Cancelled = 5002,
    Storage = 6000,
    State = 7000,
    Serialization = 8000,
    Internal = 9999,
}

/// Errors from the checkout flow.
#[derive(thiserror::Error, Debug)]
pub enum CheckoutError {
    #[error(transparent)]
    Stream(#[from] MonaError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The gateway answered without success and without a task.
    #[error("payment declined: {0}")]
    Declined(String),

    #[error("unsupported task: {0}")]
    UnsupportedTask(String),

    #[error("gave up after {0} submission rounds")]
    TooManyRounds(usize),

    #[error("login failed: {0}")]
    Auth(String),

    #[error("user is not a Mona user")]
    NotAMonaUser,

    #[error("key exchange consent declined")]
    ConsentDeclined,

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("{0} challenge was not completed")]
    ChallengeAborted(ChallengeKind),

    #[error("invalid {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("transaction {0} failed")]
    TransactionFailed(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("checkout cancelled")]
    Cancelled,

    #[error("secure storage error: {0}")]
    Storage(#[from] SecureStoreError),

    #[error("invalid state: {0}")]
    State(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CheckoutError {
    pub fn code(&self) -> CheckoutErrorCode {
        match self {
            Self::Stream(_) => CheckoutErrorCode::Stream,
            Self::Gateway(_) => CheckoutErrorCode::Gateway,
            Self::Declined(_) => CheckoutErrorCode::Declined,
            Self::UnsupportedTask(_) => CheckoutErrorCode::UnsupportedTask,
            Self::TooManyRounds(_) => CheckoutErrorCode::TooManyRounds,
            Self::Auth(_) => CheckoutErrorCode::Auth,
            Self::NotAMonaUser => CheckoutErrorCode::NotAMonaUser,
            Self::ConsentDeclined => CheckoutErrorCode::ConsentDeclined,
            Self::SigningFailed(_) => CheckoutErrorCode::SigningFailed,
            Self::ChallengeAborted(_) => CheckoutErrorCode::ChallengeAborted,
            Self::InvalidInput { .. } => CheckoutErrorCode::InvalidInput,
            Self::Encryption(_) => CheckoutErrorCode::Encryption,
            Self::TransactionFailed(_) => CheckoutErrorCode::TransactionFailed,
            Self::Timeout(_) => CheckoutErrorCode::Timeout,
            Self::Cancelled => CheckoutErrorCode::Cancelled,
            Self::Storage(_) => CheckoutErrorCode::Storage,
            Self::State(_) => CheckoutErrorCode::State,
            Self::Serialization(_) => CheckoutErrorCode::Serialization,
            Self::Internal(_) => CheckoutErrorCode::Internal,
        }
    }

    /// Whether the whole checkout may be attempted again as-is.
    ///
    /// Nothing is retried automatically; this only informs the host.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Stream(e) => e.is_retryable(),
            Self::Gateway(e) => e.is_transport(),
            Self::Timeout(_) => true,
            _ => false,
        }
    }

    /// Whether this failure invalidates the login.
    pub fn ends_login(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::NotAMonaUser | Self::ConsentDeclined | Self::SigningFailed(_)
        )
    }

    /// Message shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::Gateway(e) => e.user_message().to_string(),
            Self::Declined(message) => message.clone(),
            Self::NotAMonaUser => "No Mona account was found for this login".to_string(),
            Self::ConsentDeclined => "Device registration was declined".to_string(),
            Self::TransactionFailed(_) => "The payment failed".to_string(),
            Self::Cancelled => "The payment was cancelled".to_string(),
            other => other.to_string(),
        }
    }

    pub(crate) fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for CheckoutError {
    fn from(e: serde_json::Error) -> Self {
        CheckoutError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(CheckoutError::Cancelled.code() as i32, 5002);
        assert_eq!(CheckoutError::NotAMonaUser.code() as i32, 3001);
        assert_eq!(
            CheckoutError::from(MonaError::Transport("x".into())).code(),
            CheckoutErrorCode::Stream
        );
    }

    #[test]
    fn test_retryability() {
        assert!(CheckoutError::Gateway(GatewayError::Transport("reset".into())).is_retryable());
        assert!(!CheckoutError::Gateway(GatewayError::Rejected {
            status: 402,
            message: "Insufficient funds".into()
        })
        .is_retryable());
        assert!(!CheckoutError::ConsentDeclined.is_retryable());
    }

    #[test]
    fn test_user_message_prefers_gateway_text() {
        let error = CheckoutError::Gateway(GatewayError::Rejected {
            status: 402,
            message: "Insufficient funds".into(),
        });
        assert_eq!(error.user_message(), "Insufficient funds");
    }

    #[test]
    fn test_login_ending_errors() {
        assert!(CheckoutError::ConsentDeclined.ends_login());
        assert!(CheckoutError::Auth("401".into()).ends_login());
        assert!(!CheckoutError::Cancelled.ends_login());
    }
}
