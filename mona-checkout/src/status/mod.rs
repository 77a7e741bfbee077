//! Checkout status and its publication to readers.
//!
//! The orchestrator is the single writer. Readers either hold a `watch`
//! receiver or register a callback for checkout state changes.

use crate::challenge::ChallengeKind;
use crate::session::CheckoutSession;
use mona_lib::state::{AuthState, TransactionInfo, TransactionState};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::debug;

/// Where a checkout currently is.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum CheckoutState {
    #[default]
    Idle,
    MethodSelected,
    /// Waiting for the hosted page to hand back a strong-auth token.
    KeyExchangePending,
    /// Logging in with the strong-auth token.
    Authenticating,
    /// Registering a device key.
    Enrolling,
    SubmittingPayment,
    AwaitingChallenge(ChallengeKind),
    /// Accepted by the gateway, outcome not known yet.
    TransactionPending,
    Completed,
    Failed(String),
}

impl CheckoutState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }

    /// Check if a flow is running.
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, Self::Idle | Self::MethodSelected) && !self.is_terminal()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::MethodSelected => "method_selected",
            Self::KeyExchangePending => "key_exchange_pending",
            Self::Authenticating => "authenticating",
            Self::Enrolling => "enrolling",
            Self::SubmittingPayment => "submitting_payment",
            Self::AwaitingChallenge(_) => "awaiting_challenge",
            Self::TransactionPending => "transaction_pending",
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
        }
    }
}

/// Callback invoked on every checkout state change.
pub type StateCallback = Arc<dyn Fn(&CheckoutState) + Send + Sync>;

/// Published checkout, auth, transaction and session state.
pub struct StatusBoard {
    checkout: watch::Sender<CheckoutState>,
    auth: watch::Sender<AuthState>,
    transaction: watch::Sender<TransactionState>,
    session: watch::Sender<Option<CheckoutSession>>,
    routing: watch::Sender<Option<TransactionInfo>>,
    callbacks: RwLock<Vec<StateCallback>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            checkout: watch::Sender::new(CheckoutState::Idle),
            auth: watch::Sender::new(AuthState::LoggedOut),
            transaction: watch::Sender::new(TransactionState::Idle),
            session: watch::Sender::new(None),
            routing: watch::Sender::new(None),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback for checkout state changes.
    pub fn on_state_change(&self, callback: StateCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(callback);
    }

    pub fn set_state(&self, state: CheckoutState) {
        let previous = self.checkout.send_replace(state.clone());
        if previous == state {
            return;
        }
        debug!(from = previous.name(), to = state.name(), "Checkout state");
        let callbacks = self.callbacks.read().unwrap_or_else(|e| e.into_inner());
        for callback in callbacks.iter() {
            callback(&state);
        }
    }

    pub fn state(&self) -> CheckoutState {
        self.checkout.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CheckoutState> {
        self.checkout.subscribe()
    }

    pub fn set_auth(&self, auth: AuthState) {
        let previous = self.auth.send_replace(auth);
        if previous != auth {
            debug!(from = ?previous, to = ?auth, "Auth state");
        }
    }

    pub fn auth(&self) -> AuthState {
        *self.auth.borrow()
    }

    pub fn subscribe_auth(&self) -> watch::Receiver<AuthState> {
        self.auth.subscribe()
    }

    pub fn set_transaction(&self, state: TransactionState) {
        self.transaction.send_replace(state);
    }

    pub fn transaction(&self) -> TransactionState {
        self.transaction.borrow().clone()
    }

    pub fn subscribe_transaction(&self) -> watch::Receiver<TransactionState> {
        self.transaction.subscribe()
    }

    /// Replace the session and refresh the routing snapshot.
    pub fn set_session(&self, session: Option<CheckoutSession>) {
        let info = session.as_ref().and_then(CheckoutSession::transaction_info);
        self.session.send_replace(session);
        self.routing.send_replace(info);
    }

    /// Mutate the current session in place. Returns false if there is none.
    pub fn update_session(&self, update: impl FnOnce(&mut CheckoutSession)) -> bool {
        let mut updated = false;
        self.session.send_if_modified(|session| match session {
            Some(session) => {
                update(session);
                updated = true;
                true
            }
            None => false,
        });
        if updated {
            let info = self.session.borrow().as_ref().and_then(CheckoutSession::transaction_info);
            self.routing.send_replace(info);
        }
        updated
    }

    pub fn session(&self) -> Option<CheckoutSession> {
        self.session.borrow().clone()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<Option<CheckoutSession>> {
        self.session.subscribe()
    }

    /// Transaction snapshot the event router fills states from.
    pub fn routing_snapshot(&self) -> watch::Receiver<Option<TransactionInfo>> {
        self.routing.subscribe()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PaymentMethod;
    use std::sync::Mutex;

    #[test]
    fn test_terminal_states() {
        assert!(CheckoutState::Completed.is_terminal());
        assert!(CheckoutState::Failed("x".into()).is_terminal());
        assert!(!CheckoutState::TransactionPending.is_terminal());
        assert!(CheckoutState::AwaitingChallenge(ChallengeKind::Otp).is_in_progress());
        assert!(!CheckoutState::MethodSelected.is_in_progress());
    }

    #[test]
    fn test_callbacks_fire_on_change_only() {
        let board = StatusBoard::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        board.on_state_change(Arc::new(move |state: &CheckoutState| {
            sink.lock().unwrap().push(state.name());
        }));

        board.set_state(CheckoutState::MethodSelected);
        board.set_state(CheckoutState::MethodSelected);
        board.set_state(CheckoutState::SubmittingPayment);

        assert_eq!(*seen.lock().unwrap(), vec!["method_selected", "submitting_payment"]);
    }

    #[test]
    fn test_session_updates_refresh_routing_snapshot() {
        let board = StatusBoard::new();
        let routing = board.routing_snapshot();
        assert!(!board.update_session(|s| s.amount = Some(1)));

        board.set_session(Some(CheckoutSession::new(PaymentMethod::Card, Some(250))));
        assert!(routing.borrow().is_none());

        assert!(board.update_session(|s| s.transaction_id = Some("T7".into())));
        let info = routing.borrow().clone().unwrap();
        assert_eq!(info.transaction_id, "T7");
        assert_eq!(info.amount, Some(250));

        board.set_session(None);
        assert!(routing.borrow().is_none());
    }
}
