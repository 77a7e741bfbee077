//! Routing raw channel payloads into typed domain events.

use crate::protocol::ChannelType;
use crate::state::{TransactionInfo, TransactionState};
use crate::stream::{ChannelPayload, ErrorCallback, EventCallback};
use crate::{MonaError, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Typed event produced from a channel payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomainEvent {
    /// New transaction state for the current session.
    Transaction(TransactionState),
    /// The hosted page asked for the custom tab to close, with the result to
    /// navigate to when the payment went through. `None` means the user left.
    CloseCustomTab(Option<TransactionState>),
    /// Strong-auth token for a pending login.
    StrongAuthToken(String),
}

/// What a subscription delivered.
#[derive(Debug)]
pub enum ChannelMessageKind {
    Event(DomainEvent),
    Error(MonaError),
}

/// Routed output of one channel, sent to the orchestrator's inbox.
#[derive(Debug)]
pub struct ChannelMessage {
    pub channel: ChannelType,
    pub kind: ChannelMessageKind,
}

/// Sending half of an orchestrator inbox.
pub type EventSink = mpsc::UnboundedSender<ChannelMessage>;

/// Parses payloads per channel type and fills transaction states from the
/// current session snapshot.
#[derive(Clone)]
pub struct EventRouter {
    session: watch::Receiver<Option<TransactionInfo>>,
}

impl EventRouter {
    pub fn new(session: watch::Receiver<Option<TransactionInfo>>) -> Self {
        Self { session }
    }

    /// Route one payload.
    ///
    /// Returns `Ok(None)` for payloads that change nothing and a parse error
    /// for text that is not JSON.
    pub fn route(
        &self,
        channel: ChannelType,
        payload: &ChannelPayload,
    ) -> Result<Option<DomainEvent>> {
        let value = match payload {
            ChannelPayload::Json(value) => value.clone(),
            ChannelPayload::Text(text) => serde_json::from_str::<Value>(text)
                .map_err(|e| MonaError::Parse(format!("{} payload is not JSON: {}", channel, e)))?,
        };

        match channel {
            ChannelType::CustomTabClose => Ok(self.route_close_tab(&value)),
            ChannelType::PaymentUpdates | ChannelType::TransactionMessages => {
                Ok(self.route_transaction(channel, &value))
            }
            ChannelType::AuthenticationEvents => Ok(route_authentication(&value)),
        }
    }

    fn current_session(&self) -> Option<TransactionInfo> {
        self.session.borrow().clone()
    }

    fn route_close_tab(&self, value: &Value) -> Option<DomainEvent> {
        let success = value.get("success")?.as_bool()?;
        if !success {
            return Some(DomainEvent::CloseCustomTab(None));
        }
        let Some(info) = self.current_session() else {
            debug!("Successful tab close without a session to show");
            return None;
        };
        Some(DomainEvent::CloseCustomTab(Some(TransactionState::NavigateToResult(info))))
    }

    fn route_transaction(&self, channel: ChannelType, value: &Value) -> Option<DomainEvent> {
        let Some(name) = value.get("event").and_then(Value::as_str) else {
            debug!(%channel, "Payload without an event name");
            return None;
        };
        let Some(info) = self.current_session() else {
            debug!(%channel, event = name, "No session to attach event to");
            return None;
        };
        match TransactionState::from_event_name(name, info) {
            Some(state) => Some(DomainEvent::Transaction(state)),
            None => {
                debug!(%channel, event = name, "Unrecognized transaction event");
                None
            }
        }
    }

    /// Callbacks for subscribing `channel`; routed events and errors go to `sink`.
    pub fn callbacks(
        &self,
        channel: ChannelType,
        sink: EventSink,
    ) -> (EventCallback, ErrorCallback) {
        let router = self.clone();
        let event_sink = sink.clone();
        let on_event: EventCallback = Arc::new(move |payload: ChannelPayload| {
            let kind = match router.route(channel, &payload) {
                Ok(Some(event)) => ChannelMessageKind::Event(event),
                Ok(None) => return,
                Err(e) => ChannelMessageKind::Error(e),
            };
            let _ = event_sink.send(ChannelMessage { channel, kind });
        });
        let on_error: ErrorCallback = Arc::new(move |error: MonaError| {
            let _ = sink.send(ChannelMessage {
                channel,
                kind: ChannelMessageKind::Error(error),
            });
        });
        (on_event, on_error)
    }
}

fn route_authentication(value: &Value) -> Option<DomainEvent> {
    let token = value.get("strongAuthToken")?.as_str()?;
    if token.is_empty() {
        return None;
    }
    Some(DomainEvent::StrongAuthToken(token.to_string()))
}
