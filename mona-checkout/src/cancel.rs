//! Cancellation and subscription lifetimes for checkout flows.

use crate::{CheckoutError, Result};
use mona_lib::protocol::ChannelKey;
use mona_lib::stream::StreamClient;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Cancels whatever the checkout is currently awaiting.
///
/// Clones share the same flag. The orchestrator clears it when a new flow
/// starts.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    flag: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(watch::Sender::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    pub(crate) fn reset(&self) {
        self.flag.send_replace(false);
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Run `fut` unless cancelled first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(CheckoutError::Cancelled),
            output = fut => Ok(output),
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Unsubscribes its channel when dropped.
#[must_use = "the channel is unsubscribed when the guard is dropped"]
pub struct SubscriptionGuard {
    client: StreamClient,
    key: ChannelKey,
}

impl SubscriptionGuard {
    pub fn new(client: StreamClient, key: ChannelKey) -> Self {
        Self { client, key }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        debug!(channel = %self.key, "Releasing subscription");
        self.client.unsubscribe(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_guard_passes_output_through() {
        let handle = CancelHandle::new();
        assert_eq!(handle.guard(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_pending_future() {
        let handle = CancelHandle::new();
        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result = handle.guard(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(CheckoutError::Cancelled)));
        assert!(handle.is_cancelled());

        handle.reset();
        assert!(!handle.is_cancelled());
        assert!(handle.guard(async {}).await.is_ok());
    }
}
