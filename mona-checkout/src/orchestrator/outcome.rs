//! Waiting for the result of an accepted payment.

use super::CheckoutOrchestrator;
use crate::{CheckoutError, Result};
use mona_lib::events::DomainEvent;
use mona_lib::protocol::{checkout_url, ChannelKey};
use mona_lib::state::{TransactionInfo, TransactionState};
use std::sync::Arc;
use tracing::{debug, info};

impl CheckoutOrchestrator {
    /// Publish transaction events until a terminal one arrives.
    pub(super) async fn wait_for_outcome(&mut self) -> Result<TransactionState> {
        let status = Arc::clone(&self.status);
        let limit = self.options.outcome_timeout();
        self.wait_for_event("transaction outcome", limit, move |event| match event {
            DomainEvent::Transaction(state) => {
                debug!(state = ?state, "Transaction update");
                status.set_transaction(state.clone());
                state.is_terminal().then_some(state)
            }
            _ => None,
        })
        .await
    }

    /// Complete a transfer or card payment on the hosted pay page.
    ///
    /// Finishes when the page asks for the tab to close or a terminal
    /// transaction event arrives first. A close without success means the
    /// user left the page.
    pub(super) async fn run_redirect(
        &mut self,
        info: &TransactionInfo,
    ) -> Result<TransactionState> {
        let method = self.current_session()?.method;
        let url = checkout_url(&self.config.pay_host, &info.transaction_id, method.as_str(), None)?;
        let close_channel = self.watch_channel(ChannelKey::custom_tab_close())?;
        info!(transaction_id = %info.transaction_id, "Opening pay page");
        self.open_tab(&url).await?;

        let status = Arc::clone(&self.status);
        let limit = self.options.outcome_timeout();
        let outcome = self
            .wait_for_event("payment result", limit, move |event| match event {
                DomainEvent::CloseCustomTab(Some(result)) => Some(Ok(result)),
                DomainEvent::CloseCustomTab(None) => Some(Err(CheckoutError::Cancelled)),
                DomainEvent::Transaction(state) => {
                    status.set_transaction(state.clone());
                    state.is_terminal().then_some(Ok(state))
                }
                DomainEvent::StrongAuthToken(_) => None,
            })
            .await?;
        drop(close_channel);
        self.close_tab().await;
        outcome
    }
}
