//! Channel path builders.
//!
//! These functions produce the exact paths the backend publishes events on.
//! A path that differs by a single character subscribes to nothing, so every
//! channel goes through [`ChannelType::path`].

use crate::{MonaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Path prefix shared by every public channel.
pub const PUBLIC_PREFIX: &str = "/public";

/// Prefix of authentication session identifiers inside the login channel.
pub const AUTHN_SESSION_PREFIX: &str = "authn_";

/// Kind of remote channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    /// Status updates for one transaction.
    PaymentUpdates,
    /// Messages attached to one transaction.
    TransactionMessages,
    /// Global signal that the hosted page wants its custom tab closed.
    CustomTabClose,
    /// Strong-auth token delivery for one login session.
    AuthenticationEvents,
}

impl ChannelType {
    /// Whether this channel is addressed by an identifier.
    pub fn requires_identifier(&self) -> bool {
        !matches!(self, Self::CustomTabClose)
    }

    /// Build the channel path.
    ///
    /// # Example
    ///
    /// ```
    /// use mona_lib::protocol::ChannelType;
    ///
    /// let path = ChannelType::PaymentUpdates.path(Some("tx_42")).unwrap();
    /// assert_eq!(path, "/public/paymentUpdate/tx_42.json");
    /// ```
    pub fn path(&self, identifier: Option<&str>) -> Result<String> {
        match self {
            Self::CustomTabClose => Ok(format!("{}/close_tab.json", PUBLIC_PREFIX)),
            Self::PaymentUpdates => {
                let id = require_identifier(self, identifier)?;
                Ok(format!("{}/paymentUpdate/{}.json", PUBLIC_PREFIX, id))
            }
            Self::TransactionMessages => {
                let id = require_identifier(self, identifier)?;
                Ok(format!("{}/transaction-messages/{}.json", PUBLIC_PREFIX, id))
            }
            Self::AuthenticationEvents => {
                let id = require_identifier(self, identifier)?;
                Ok(format!(
                    "{}/login_success/{}{}.json",
                    PUBLIC_PREFIX, AUTHN_SESSION_PREFIX, id
                ))
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentUpdates => "payment_updates",
            Self::TransactionMessages => "transaction_messages",
            Self::CustomTabClose => "custom_tab_close",
            Self::AuthenticationEvents => "authentication_events",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn require_identifier<'a>(channel: &ChannelType, identifier: Option<&'a str>) -> Result<&'a str> {
    let id = identifier.ok_or_else(|| {
        MonaError::invalid_data("identifier", format!("{} requires an identifier", channel))
    })?;
    validate_identifier(id)?;
    Ok(id)
}

/// Reject identifiers that would escape their path segment.
pub fn validate_identifier(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(MonaError::invalid_data("identifier", "must not be empty"));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(MonaError::invalid_data(
            "identifier",
            format!("'{}' contains characters outside [A-Za-z0-9_-]", id),
        ));
    }
    Ok(())
}

/// Identifies one logical subscription.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelKey {
    pub channel_type: ChannelType,
    pub identifier: Option<String>,
}

impl ChannelKey {
    pub fn new(channel_type: ChannelType, identifier: Option<String>) -> Self {
        Self {
            channel_type,
            identifier,
        }
    }

    pub fn payment_updates(transaction_id: impl Into<String>) -> Self {
        Self::new(ChannelType::PaymentUpdates, Some(transaction_id.into()))
    }

    pub fn transaction_messages(transaction_id: impl Into<String>) -> Self {
        Self::new(ChannelType::TransactionMessages, Some(transaction_id.into()))
    }

    pub fn custom_tab_close() -> Self {
        Self::new(ChannelType::CustomTabClose, None)
    }

    pub fn authentication(session_id: impl Into<String>) -> Self {
        Self::new(ChannelType::AuthenticationEvents, Some(session_id.into()))
    }

    /// Channel path for this key.
    pub fn path(&self) -> Result<String> {
        self.channel_type.path(self.identifier.as_deref())
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Some(id) => write!(f, "{}:{}", self.channel_type, id),
            None => write!(f, "{}", self.channel_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_paths() {
        assert_eq!(
            ChannelKey::payment_updates("T1").path().unwrap(),
            "/public/paymentUpdate/T1.json"
        );
        assert_eq!(
            ChannelKey::transaction_messages("T1").path().unwrap(),
            "/public/transaction-messages/T1.json"
        );
        assert_eq!(
            ChannelKey::custom_tab_close().path().unwrap(),
            "/public/close_tab.json"
        );
        assert_eq!(
            ChannelKey::authentication("s-1").path().unwrap(),
            "/public/login_success/authn_s-1.json"
        );
    }

    #[test]
    fn test_missing_identifier_rejected() {
        let err = ChannelType::PaymentUpdates.path(None).unwrap_err();
        assert!(matches!(err, MonaError::InvalidData { .. }));
    }

    #[test]
    fn test_identifier_cannot_escape_segment() {
        assert!(validate_identifier("../secret").is_err());
        assert!(validate_identifier("a/b").is_err());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("tx_123-abc").is_ok());
    }

    #[test]
    fn test_custom_tab_ignores_identifier() {
        assert_eq!(
            ChannelType::CustomTabClose.path(Some("ignored")).unwrap(),
            "/public/close_tab.json"
        );
    }

    #[test]
    fn test_key_display() {
        assert_eq!(
            ChannelKey::payment_updates("T1").to_string(),
            "payment_updates:T1"
        );
        assert_eq!(ChannelKey::custom_tab_close().to_string(), "custom_tab_close");
    }
}
