//! Payment methods and the per-checkout session.

use mona_lib::state::TransactionInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the user chose to pay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    SavedBank { bank_id: String },
    SavedCard { card_id: String },
    Transfer,
    Card,
}

impl PaymentMethod {
    /// Saved methods are authorized with a device-bound key.
    pub fn requires_device_key(&self) -> bool {
        matches!(self, Self::SavedBank { .. } | Self::SavedCard { .. })
    }

    /// Methods completed on the hosted pay page in a custom tab.
    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Transfer | Self::Card)
    }

    /// Wire name, also used as the `method` redirect parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SavedBank { .. } => "saved_bank",
            Self::SavedCard { .. } => "saved_card",
            Self::Transfer => "transfer",
            Self::Card => "card",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one checkout, owned by the orchestrator.
///
/// Readers receive clones through a `watch` channel; only the orchestrator
/// mutates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub method: PaymentMethod,
    /// Known up front for merchant-created transactions, otherwise set once
    /// the gateway accepted the payment.
    pub transaction_id: Option<String>,
    pub friendly_id: Option<String>,
    pub amount: Option<u64>,
    pub has_device_key: bool,
    pub key_id: Option<String>,
}

impl CheckoutSession {
    pub fn new(method: PaymentMethod, amount: Option<u64>) -> Self {
        Self {
            method,
            transaction_id: None,
            friendly_id: None,
            amount,
            has_device_key: false,
            key_id: None,
        }
    }

    /// Attach persisted enrollment.
    pub fn with_device_key(mut self, key_id: Option<String>, has_device_key: bool) -> Self {
        self.has_device_key = has_device_key && key_id.is_some();
        self.key_id = key_id;
        self
    }

    /// Continue a transaction the merchant already created. Its amount wins
    /// over the one given at selection when present.
    pub fn with_transaction(mut self, info: TransactionInfo) -> Self {
        self.transaction_id = Some(info.transaction_id);
        self.friendly_id = info.friendly_id;
        if info.amount.is_some() {
            self.amount = info.amount;
        }
        self
    }

    /// Whether key exchange must run before submitting.
    pub fn needs_key_exchange(&self) -> bool {
        self.method.requires_device_key() && !self.has_device_key
    }

    /// Transaction info for event routing, once a transaction exists.
    pub fn transaction_info(&self) -> Option<TransactionInfo> {
        let id = self.transaction_id.as_ref()?;
        let mut info = TransactionInfo::new(id.clone());
        info.friendly_id = self.friendly_id.clone();
        info.amount = self.amount;
        Some(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_classification() {
        let bank = PaymentMethod::SavedBank { bank_id: "b1".into() };
        assert!(bank.requires_device_key());
        assert!(!bank.is_redirect());
        assert!(PaymentMethod::Card.is_redirect());
        assert!(!PaymentMethod::Transfer.requires_device_key());
        assert_eq!(bank.as_str(), "saved_bank");
    }

    #[test]
    fn test_method_serde() {
        let json = serde_json::to_value(PaymentMethod::SavedCard { card_id: "c9".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "saved_card", "card_id": "c9"}));
    }

    #[test]
    fn test_key_exchange_needed_without_key_id() {
        let session = CheckoutSession::new(PaymentMethod::SavedBank { bank_id: "b1".into() }, None)
            .with_device_key(None, true);
        assert!(!session.has_device_key);
        assert!(session.needs_key_exchange());

        let enrolled = CheckoutSession::new(PaymentMethod::SavedBank { bank_id: "b1".into() }, None)
            .with_device_key(Some("k1".into()), true);
        assert!(!enrolled.needs_key_exchange());
        assert!(!CheckoutSession::new(PaymentMethod::Card, None).needs_key_exchange());
    }

    #[test]
    fn test_merchant_transaction() {
        let session = CheckoutSession::new(PaymentMethod::Transfer, Some(10))
            .with_transaction(TransactionInfo::new("T7").with_friendly_id("F7"));
        assert_eq!(session.transaction_id.as_deref(), Some("T7"));
        assert_eq!(session.friendly_id.as_deref(), Some("F7"));
        assert_eq!(session.amount, Some(10));

        let priced = CheckoutSession::new(PaymentMethod::Transfer, Some(10))
            .with_transaction(TransactionInfo::new("T8").with_amount(2500));
        assert_eq!(priced.amount, Some(2500));
    }

    #[test]
    fn test_transaction_info() {
        let mut session = CheckoutSession::new(PaymentMethod::Card, Some(1500));
        assert!(session.transaction_info().is_none());
        session.transaction_id = Some("T1".into());
        session.friendly_id = Some("F1".into());
        let info = session.transaction_info().unwrap();
        assert_eq!(info.transaction_id, "T1");
        assert_eq!(info.friendly_id.as_deref(), Some("F1"));
        assert_eq!(info.amount, Some(1500));
    }
}
