//! Submission payloads and gateway responses.

use crate::challenge::{ChallengeKind, ChallengeRequest};
use crate::session::{CheckoutSession, PaymentMethod};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body posted to the checkout path.
///
/// Challenge answers are merged into `extras` and flattened into the body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Set when this device holds no enrolled key.
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub no_device_key: bool,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl PaymentPayload {
    pub fn from_session(session: &CheckoutSession) -> Self {
        let (bank_id, card_id) = match &session.method {
            PaymentMethod::SavedBank { bank_id } => (Some(bank_id.clone()), None),
            PaymentMethod::SavedCard { card_id } => (None, Some(card_id.clone())),
            PaymentMethod::Transfer | PaymentMethod::Card => (None, None),
        };
        Self {
            method: session.method.as_str().to_string(),
            bank_id,
            card_id,
            amount: session.amount,
            transaction_id: session.transaction_id.clone(),
            no_device_key: !session.has_device_key,
            extras: Map::new(),
        }
    }

    pub fn insert_extra(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.extras.insert(field.into(), value.into());
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Continuation the gateway asks for instead of accepting a payment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTask {
    pub task_type: Option<String>,
    pub field_type: Option<String>,
    pub field_name: Option<String>,
    pub field_length: Option<usize>,
    pub encrypted: Option<bool>,
    pub public_key: Option<String>,
}

/// What a task requires of the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskAction {
    /// Resubmit with a request signature.
    Sign,
    /// Collect a value and resubmit with it.
    Challenge(ChallengeRequest),
    /// A task this client cannot perform, with a description.
    Unsupported(String),
}

impl PaymentTask {
    pub fn action(&self) -> TaskAction {
        if self.task_type.as_deref().map_or(false, |t| t.eq_ignore_ascii_case("sign")) {
            return TaskAction::Sign;
        }
        if let Some(kind) = self.field_type.as_deref().and_then(ChallengeKind::from_field_type) {
            let mut request = ChallengeRequest::new(kind);
            if let Some(name) = self.field_name.as_deref().filter(|n| !n.is_empty()) {
                request.field_name = name.to_string();
            }
            request.length = self.field_length.filter(|l| *l > 0);
            request.encrypted = self.encrypted.unwrap_or(false);
            request.public_key = self.public_key.clone().filter(|k| !k.is_empty());
            return TaskAction::Challenge(request);
        }
        TaskAction::Unsupported(self.describe())
    }

    fn describe(&self) -> String {
        match (&self.task_type, &self.field_type) {
            (Some(task), Some(field)) => format!("{} ({})", task, field),
            (Some(task), None) => task.clone(),
            (None, Some(field)) => format!("field {}", field),
            (None, None) => "empty task".to_string(),
        }
    }
}

/// Parsed gateway reply to a submission.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CheckoutResponse {
    pub success: bool,
    pub transaction_ref: Option<String>,
    pub friendly_id: Option<String>,
    pub task: Option<PaymentTask>,
    pub message: Option<String>,
}

impl CheckoutResponse {
    /// Lenient parse. A `task` that is not an object, or does not have the
    /// expected field types, counts as absent.
    pub fn from_json(value: &Value) -> Self {
        let text = |field: &str| value.get(field).and_then(Value::as_str).map(str::to_string);
        Self {
            success: value.get("success").and_then(Value::as_bool).unwrap_or(false),
            transaction_ref: text("transactionRef"),
            friendly_id: text("friendlyID").or_else(|| text("friendlyId")),
            task: value
                .get("task")
                .filter(|t| t.is_object())
                .and_then(|t| serde_json::from_value(t.clone()).ok()),
            message: text("message").or_else(|| text("error")),
        }
    }
}
