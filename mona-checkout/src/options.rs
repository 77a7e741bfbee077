//! Checkout flow settings.

use crate::collaborators::PromptConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits and prompt text for checkout flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutOptions {
    /// Submissions per payment before giving up.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// How long to wait for the strong-auth token after opening the login page.
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,

    /// How long to wait for the final transaction event.
    #[serde(default = "default_outcome_timeout")]
    pub outcome_timeout_secs: u64,

    /// Where the hosted login page continues to when there is no transaction
    /// yet. Defaults to the pay host.
    #[serde(default)]
    pub return_url: Option<String>,

    #[serde(default)]
    pub prompt: PromptConfig,
}

fn default_max_rounds() -> usize {
    8
}

fn default_auth_timeout() -> u64 {
    300
}

fn default_outcome_timeout() -> u64 {
    600
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            auth_timeout_secs: default_auth_timeout(),
            outcome_timeout_secs: default_outcome_timeout(),
            return_url: None,
            prompt: PromptConfig::default(),
        }
    }
}

impl CheckoutOptions {
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    pub fn with_auth_timeout(mut self, secs: u64) -> Self {
        self.auth_timeout_secs = secs;
        self
    }

    pub fn with_outcome_timeout(mut self, secs: u64) -> Self {
        self.outcome_timeout_secs = secs;
        self
    }

    pub fn with_return_url(mut self, url: impl Into<String>) -> Self {
        self.return_url = Some(url.into());
        self
    }

    pub fn with_prompt(mut self, prompt: PromptConfig) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn outcome_timeout(&self) -> Duration {
        Duration::from_secs(self.outcome_timeout_secs)
    }
}
