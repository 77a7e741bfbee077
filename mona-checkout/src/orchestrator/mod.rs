//! Checkout orchestration.
//!
//! One [`CheckoutOrchestrator`] drives one checkout at a time:
//!
//! ```text
//! Idle → MethodSelected → [KeyExchangePending → Authenticating → Enrolling]
//!      → SubmittingPayment ⇄ AwaitingChallenge → TransactionPending
//!      → Completed | Failed → Idle
//! ```
//!
//! Channel events reach the orchestrator through its inbox; every flow
//! method takes `&mut self`, so a session has a single writer. Subscriptions
//! are held as [`SubscriptionGuard`]s and released on every exit path.

mod key_exchange;
mod outcome;
mod submit;

use crate::cancel::{CancelHandle, SubscriptionGuard};
use crate::collaborators::{CheckoutUi, Collaborators, ExternalAuthenticator};
use crate::options::CheckoutOptions;
use crate::session::{CheckoutSession, PaymentMethod};
use crate::status::{CheckoutState, StateCallback, StatusBoard};
use crate::{CheckoutError, Result};
use mona_lib::config::MonaConfig;
use mona_lib::events::{ChannelMessage, ChannelMessageKind, DomainEvent, EventRouter, EventSink};
use mona_lib::gateway::{Headers, PaymentGateway};
use mona_lib::protocol::ChannelKey;
use mona_lib::secure_storage::{keys, SecureStore, SecureStoreExt};
use mona_lib::state::{AuthState, TransactionInfo, TransactionState};
use mona_lib::stream::{BackgroundModeController, StreamClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Drives a payment from method selection to its outcome.
pub struct CheckoutOrchestrator {
    config: MonaConfig,
    options: CheckoutOptions,
    client: StreamClient,
    background: Option<Arc<BackgroundModeController>>,
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn SecureStore>,
    authenticator: Arc<dyn ExternalAuthenticator>,
    ui: Arc<dyn CheckoutUi>,
    status: Arc<StatusBoard>,
    router: EventRouter,
    sink: EventSink,
    inbox: mpsc::UnboundedReceiver<ChannelMessage>,
    cancel: CancelHandle,
    subscriptions: Vec<SubscriptionGuard>,
    tab_open: bool,
}

impl CheckoutOrchestrator {
    pub fn new(config: MonaConfig, client: StreamClient, collaborators: Collaborators) -> Self {
        let status = Arc::new(StatusBoard::new());
        let router = EventRouter::new(status.routing_snapshot());
        let (sink, inbox) = mpsc::unbounded_channel();
        Self {
            config,
            options: CheckoutOptions::default(),
            client,
            background: None,
            gateway: collaborators.gateway,
            store: collaborators.store,
            authenticator: collaborators.authenticator,
            ui: collaborators.ui,
            status,
            router,
            sink,
            inbox,
            cancel: CancelHandle::new(),
            subscriptions: Vec::new(),
            tab_open: false,
        }
    }

    pub fn with_options(mut self, options: CheckoutOptions) -> Self {
        self.options = options;
        self
    }

    /// Report custom tab visibility to `controller`.
    pub fn with_background_controller(mut self, controller: Arc<BackgroundModeController>) -> Self {
        self.background = Some(controller);
        self
    }

    pub fn options(&self) -> &CheckoutOptions {
        &self.options
    }

    /// Handle that cancels the flow in progress from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> CheckoutState {
        self.status.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CheckoutState> {
        self.status.subscribe_state()
    }

    pub fn on_state_change(&self, callback: StateCallback) {
        self.status.on_state_change(callback);
    }

    pub fn auth_state(&self) -> AuthState {
        self.status.auth()
    }

    pub fn subscribe_auth_state(&self) -> watch::Receiver<AuthState> {
        self.status.subscribe_auth()
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.status.transaction()
    }

    pub fn subscribe_transaction_state(&self) -> watch::Receiver<TransactionState> {
        self.status.subscribe_transaction()
    }

    pub fn session(&self) -> Option<CheckoutSession> {
        self.status.session()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<Option<CheckoutSession>> {
        self.status.subscribe_session()
    }

    /// Start a checkout with `method`.
    ///
    /// Reads the persisted device enrollment, so a device that registered a
    /// key before skips key exchange.
    pub async fn select_method(
        &mut self,
        method: PaymentMethod,
        amount: Option<u64>,
    ) -> Result<CheckoutSession> {
        self.start_session(CheckoutSession::new(method, amount)).await
    }

    /// Start a checkout with `method` for a transaction the merchant backend
    /// already created.
    ///
    /// The transaction id is submitted with the payment, and key exchange
    /// opens the checkout page with a login scope instead of the login page.
    pub async fn select_method_for_transaction(
        &mut self,
        method: PaymentMethod,
        transaction: TransactionInfo,
    ) -> Result<CheckoutSession> {
        self.start_session(CheckoutSession::new(method, None).with_transaction(transaction))
            .await
    }

    async fn start_session(&mut self, session: CheckoutSession) -> Result<CheckoutSession> {
        let current = self.status.state();
        if current.is_in_progress() {
            return Err(CheckoutError::State(format!(
                "cannot select a method while {}",
                current.name()
            )));
        }

        let key_id = self.store.get(keys::KEY_ID).await?;
        let has_device_key = self.store.get_flag(keys::HAS_DEVICE_KEY).await?;
        if self.store.get(keys::ACCESS_TOKEN).await?.is_some() {
            self.status.set_auth(AuthState::LoggedIn);
        }

        let session = session.with_device_key(key_id, has_device_key);
        info!(
            method = %session.method,
            transaction_id = session.transaction_id.as_deref().unwrap_or(""),
            has_device_key = session.has_device_key,
            "Payment method selected"
        );
        self.subscriptions.clear();
        self.status.set_session(Some(session.clone()));
        self.status.set_transaction(TransactionState::Idle);
        self.status.set_state(CheckoutState::MethodSelected);
        Ok(session)
    }

    /// Submit the payment, running key exchange and challenges as required.
    ///
    /// Returns once the gateway accepted the payment and `Initiated` was
    /// published; follow with [`await_outcome`](Self::await_outcome).
    pub async fn pay(&mut self) -> Result<TransactionInfo> {
        self.begin_flow()?;
        match self.run_payment().await {
            Ok(info) => Ok(info),
            Err(error) => Err(self.fail(error).await),
        }
    }

    /// Wait for the final transaction event of an accepted payment.
    ///
    /// Redirect methods open the hosted pay page here and finish when it
    /// closes.
    pub async fn await_outcome(&mut self) -> Result<TransactionState> {
        if self.status.state() != CheckoutState::TransactionPending {
            return Err(CheckoutError::State("no transaction is pending".into()));
        }
        let result = self.run_outcome().await;
        self.conclude(result).await
    }

    /// Pay and wait for the outcome. Redirect methods complete on the hosted
    /// pay page.
    pub async fn checkout(&mut self) -> Result<TransactionState> {
        self.begin_flow()?;
        let result = self.run_checkout().await;
        self.conclude(result).await
    }

    /// Abandon the current checkout without reporting an error.
    pub async fn reset(&mut self) {
        self.ui.dismiss_prompts();
        self.close_tab().await;
        self.status.set_transaction(TransactionState::Idle);
        self.finish();
    }

    /// Forget the device enrollment and the login.
    pub async fn sign_out(&mut self) -> Result<()> {
        self.store.remove(keys::ACCESS_TOKEN).await?;
        self.store.remove(keys::KEY_ID).await?;
        self.store.remove(keys::HAS_DEVICE_KEY).await?;
        self.status.update_session(|session| {
            session.key_id = None;
            session.has_device_key = false;
        });
        self.status.set_auth(AuthState::LoggedOut);
        info!("Signed out");
        Ok(())
    }

    async fn run_checkout(&mut self) -> Result<TransactionState> {
        self.run_payment().await?;
        self.run_outcome().await
    }

    async fn run_outcome(&mut self) -> Result<TransactionState> {
        let session = self.current_session()?;
        if !session.method.is_redirect() {
            return self.wait_for_outcome().await;
        }
        let info = session
            .transaction_info()
            .ok_or_else(|| CheckoutError::State("no transaction to complete".into()))?;
        self.run_redirect(&info).await
    }

    async fn run_payment(&mut self) -> Result<TransactionInfo> {
        if self.current_session()?.needs_key_exchange() {
            self.key_exchange().await?;
        }
        let response = self.submit_payment().await?;
        self.accept(response)
    }

    fn begin_flow(&mut self) -> Result<()> {
        let state = self.status.state();
        if state != CheckoutState::MethodSelected {
            return Err(CheckoutError::State(format!(
                "cannot pay while {}",
                state.name()
            )));
        }
        self.current_session()?;
        self.cancel.reset();
        while self.inbox.try_recv().is_ok() {}
        Ok(())
    }

    fn current_session(&self) -> Result<CheckoutSession> {
        self.status
            .session()
            .ok_or_else(|| CheckoutError::State("no payment method selected".into()))
    }

    /// Publish a terminal outcome and return to `Idle`.
    async fn conclude(&mut self, result: Result<TransactionState>) -> Result<TransactionState> {
        match result {
            Ok(TransactionState::Failed(info)) => {
                self.status.set_transaction(TransactionState::Failed(info.clone()));
                Err(self.fail(CheckoutError::TransactionFailed(info.transaction_id)).await)
            }
            Ok(state) => {
                info!(
                    transaction_id = state.info().map(|i| i.transaction_id.as_str()).unwrap_or(""),
                    "Checkout completed"
                );
                self.status.set_transaction(state.clone());
                self.status.set_state(CheckoutState::Completed);
                self.close_tab().await;
                self.finish();
                Ok(state)
            }
            Err(error) => Err(self.fail(error).await),
        }
    }

    /// Report `error` once, clean up and return to `Idle`.
    async fn fail(&mut self, error: CheckoutError) -> CheckoutError {
        let message = error.user_message();
        warn!(code = ?error.code(), error = %error, "Checkout failed");
        if !matches!(error, CheckoutError::Cancelled) {
            self.ui.show_error(&message);
        }
        self.ui.dismiss_prompts();
        self.close_tab().await;
        self.status.set_state(CheckoutState::Failed(message));
        self.finish();
        error
    }

    fn finish(&mut self) {
        self.subscriptions.clear();
        self.status.set_session(None);
        self.status.set_state(CheckoutState::Idle);
        while self.inbox.try_recv().is_ok() {}
    }

    /// Subscribe `key` with routing into the inbox.
    fn watch_channel(&self, key: ChannelKey) -> Result<SubscriptionGuard> {
        let (on_event, on_error) = self.router.callbacks(key.channel_type, self.sink.clone());
        self.client.subscribe_channel(key.clone(), on_event, on_error)?;
        Ok(SubscriptionGuard::new(self.client.clone(), key))
    }

    /// Wait for the first event `select` accepts.
    ///
    /// Channel errors are logged; the stream client reconnects on its own.
    async fn wait_for_event<T>(
        &mut self,
        what: &str,
        limit: Duration,
        mut select: impl FnMut(DomainEvent) -> Option<T>,
    ) -> Result<T> {
        let cancel = self.cancel.clone();
        let inbox = &mut self.inbox;
        let wait = async {
            loop {
                let Some(message) = inbox.recv().await else {
                    return Err(CheckoutError::Internal("event inbox closed".into()));
                };
                match message.kind {
                    ChannelMessageKind::Event(event) => {
                        if let Some(value) = select(event) {
                            return Ok(value);
                        }
                    }
                    ChannelMessageKind::Error(error) => {
                        warn!(
                            channel = %message.channel,
                            error = %error,
                            "Channel error while waiting"
                        );
                    }
                }
            }
        };

        debug!(what, limit_secs = limit.as_secs(), "Waiting for event");
        match tokio::time::timeout(limit, cancel.guard(wait)).await {
            Ok(Ok(result)) => result,
            Ok(Err(cancelled)) => Err(cancelled),
            Err(_) => Err(CheckoutError::Timeout(what.to_string())),
        }
    }

    async fn open_tab(&mut self, url: &str) -> Result<()> {
        if let Some(controller) = &self.background {
            controller.set_custom_tab_open(true);
        }
        self.tab_open = true;
        self.ui.open_custom_tab(url).await
    }

    async fn close_tab(&mut self) {
        if !self.tab_open {
            return;
        }
        self.tab_open = false;
        self.ui.close_custom_tab().await;
        if let Some(controller) = &self.background {
            controller.set_custom_tab_open(false);
        }
    }

    /// Bearer header when a login token is stored.
    async fn auth_headers(&self) -> Result<Headers> {
        let mut headers = Headers::new();
        if let Some(token) = self.store.get(keys::ACCESS_TOKEN).await? {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }
        Ok(headers)
    }
}
