//! Collaborators the host provides.

use crate::challenge::ChallengeRequest;
use crate::Result;
use async_trait::async_trait;
use mona_lib::gateway::PaymentGateway;
use mona_lib::secure_storage::SecureStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Text shown by the biometric prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptConfig {
    pub title: String,
    pub subtitle: Option<String>,
    pub cancel_label: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            title: "Confirm payment".to_string(),
            subtitle: None,
            cancel_label: "Cancel".to_string(),
        }
    }
}

/// Device-bound key holder, typically biometric-gated hardware.
#[async_trait]
pub trait ExternalAuthenticator: Send + Sync {
    /// Sign `challenge` with the device key.
    ///
    /// `Ok(None)` when the user dismissed the prompt or no key is available.
    async fn sign(&self, challenge: &str, prompt: &PromptConfig) -> Result<Option<String>>;

    /// Create a new device key pair and return its public key.
    async fn generate_key_pair(&self) -> Result<String>;
}

/// UI surface the checkout drives.
#[async_trait]
pub trait CheckoutUi: Send + Sync {
    /// Open `url` in an in-app browser tab.
    async fn open_custom_tab(&self, url: &str) -> Result<()>;

    async fn close_custom_tab(&self);

    /// Ask for a PIN or OTP. `None` when the user backed out.
    async fn collect_challenge(&self, request: &ChallengeRequest) -> Option<String>;

    /// Ask whether this device may be registered for future payments.
    async fn request_consent(&self) -> bool;

    /// Show a failure. Called once per failed checkout.
    fn show_error(&self, message: &str);

    /// Dismiss any prompt still on screen.
    fn dismiss_prompts(&self);
}

/// Everything the orchestrator talks to besides the stream client.
#[derive(Clone)]
pub struct Collaborators {
    pub gateway: Arc<dyn PaymentGateway>,
    pub store: Arc<dyn SecureStore>,
    pub authenticator: Arc<dyn ExternalAuthenticator>,
    pub ui: Arc<dyn CheckoutUi>,
}

impl Collaborators {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn SecureStore>,
        authenticator: Arc<dyn ExternalAuthenticator>,
        ui: Arc<dyn CheckoutUi>,
    ) -> Self {
        Self {
            gateway,
            store,
            authenticator,
            ui,
        }
    }
}
