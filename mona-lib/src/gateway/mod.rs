//! Merchant payment gateway boundary.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpPaymentGateway;

/// Extra request headers, ordered for stable logging and signing.
pub type Headers = BTreeMap<String, String>;

/// Gateway failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The backend refused the request (4xx) with a message for the user.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request never completed.
    #[error("gateway transport error: {0}")]
    Transport(String),

    /// Any other response the client cannot act on.
    #[error("unexpected gateway response ({status}): {message}")]
    Unexpected { status: u16, message: String },
}

impl GatewayError {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Text suitable for the UI error sink.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Rejected { message, .. } => message,
            Self::Transport(_) => "Network error, please try again",
            Self::Unexpected { .. } => "Something went wrong, please try again",
        }
    }
}

/// Posts JSON to the merchant backend.
///
/// A response that carries a continuation `task` is returned as `Ok` even
/// when the backend used a 4xx status for it.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn post(
        &self,
        path: &str,
        headers: &Headers,
        body: &Value,
    ) -> Result<Value, GatewayError>;
}
