//! Domain state published to UI readers.

use serde::{Deserialize, Serialize};

/// Identifiers and amount of the transaction a state refers to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_id: Option<String>,
    /// Amount in minor units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
}

impl TransactionInfo {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            friendly_id: None,
            amount: None,
        }
    }

    pub fn with_friendly_id(mut self, friendly_id: impl Into<String>) -> Self {
        self.friendly_id = Some(friendly_id.into());
        self
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// Transaction progress as last reported. Last writer wins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TransactionState {
    #[default]
    Idle,
    Initiated(TransactionInfo),
    ProgressUpdate(TransactionInfo),
    Completed(TransactionInfo),
    Failed(TransactionInfo),
    NavigateToResult(TransactionInfo),
}

impl TransactionState {
    /// Map a backend event name onto a state carrying `info`.
    ///
    /// Returns `None` for names the client does not act on.
    pub fn from_event_name(name: &str, info: TransactionInfo) -> Option<Self> {
        match name {
            "transaction_initiated" => Some(Self::Initiated(info)),
            "progress_update" => Some(Self::ProgressUpdate(info)),
            "transaction_failed" => Some(Self::Failed(info)),
            "transaction_completed" => Some(Self::Completed(info)),
            _ => None,
        }
    }

    pub fn info(&self) -> Option<&TransactionInfo> {
        match self {
            Self::Idle => None,
            Self::Initiated(info)
            | Self::ProgressUpdate(info)
            | Self::Completed(info)
            | Self::Failed(info)
            | Self::NavigateToResult(info) => Some(info),
        }
    }

    /// Completed, failed, or handed to the result screen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed(_) | Self::Failed(_) | Self::NavigateToResult(_)
        )
    }
}

/// Login state of the current user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthState {
    #[default]
    LoggedOut,
    LoggedIn,
    PerformingLogin,
    NotAMonaUser,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let info = TransactionInfo::new("T1").with_friendly_id("F1");
        assert_eq!(
            TransactionState::from_event_name("transaction_completed", info.clone()),
            Some(TransactionState::Completed(info.clone()))
        );
        assert_eq!(
            TransactionState::from_event_name("progress_update", info.clone()),
            Some(TransactionState::ProgressUpdate(info.clone()))
        );
        assert_eq!(TransactionState::from_event_name("refund_issued", info), None);
    }

    #[test]
    fn test_terminal_states() {
        let info = TransactionInfo::new("T1");
        assert!(TransactionState::Failed(info.clone()).is_terminal());
        assert!(TransactionState::NavigateToResult(info.clone()).is_terminal());
        assert!(!TransactionState::Initiated(info).is_terminal());
        assert!(!TransactionState::Idle.is_terminal());
        assert!(TransactionState::Idle.info().is_none());
    }

    #[test]
    fn test_state_serialization() {
        let state = TransactionState::Initiated(TransactionInfo::new("T1").with_amount(1500));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "initiated");
        assert_eq!(json["transactionId"], "T1");
        assert_eq!(json["amount"], 1500);
        assert!(json.get("friendlyId").is_none());
    }
}
