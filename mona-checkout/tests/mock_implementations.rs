#![allow(dead_code)]

use async_trait::async_trait;
use mona_checkout::{
    ChallengeRequest, CheckoutError, CheckoutUi, ExternalAuthenticator, PromptConfig, Result,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Authenticator that signs every challenge as `sig:<challenge>`.
#[derive(Default)]
pub struct MockAuthenticator {
    challenges: Mutex<Vec<String>>,
    refuse: Mutex<bool>,
    key_generation_error: Mutex<Option<String>>,
}

impl MockAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `sign` return no signature.
    pub fn refuse_signing(&self) {
        *self.refuse.lock().unwrap() = true;
    }

    pub fn fail_key_generation(&self, reason: &str) {
        *self.key_generation_error.lock().unwrap() = Some(reason.to_string());
    }

    pub fn challenges(&self) -> Vec<String> {
        self.challenges.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExternalAuthenticator for MockAuthenticator {
    async fn sign(&self, challenge: &str, _prompt: &PromptConfig) -> Result<Option<String>> {
        let mut challenges = self
            .challenges
            .lock()
            .map_err(|e| CheckoutError::Internal(format!("Mutex poisoned: {}", e)))?;
        challenges.push(challenge.to_string());
        if *self.refuse.lock().map_err(|e| CheckoutError::Internal(e.to_string()))? {
            return Ok(None);
        }
        Ok(Some(format!("sig:{}", challenge)))
    }

    async fn generate_key_pair(&self) -> Result<String> {
        let error = self
            .key_generation_error
            .lock()
            .map_err(|e| CheckoutError::Internal(format!("Mutex poisoned: {}", e)))?
            .clone();
        match error {
            Some(reason) => Err(CheckoutError::Internal(reason)),
            None => Ok("pk_device_1".to_string()),
        }
    }
}

/// Called with the URL of every opened custom tab.
pub type OpenHook = Arc<dyn Fn(&str) + Send + Sync>;

/// UI that answers prompts from scripted values and records what it showed.
pub struct MockUi {
    opened: Mutex<Vec<String>>,
    closed: Mutex<usize>,
    errors: Mutex<Vec<String>>,
    dismissed: Mutex<usize>,
    challenges: Mutex<Vec<ChallengeRequest>>,
    answers: Mutex<VecDeque<Option<String>>>,
    consent: Mutex<bool>,
    on_open: Mutex<Option<OpenHook>>,
}

impl MockUi {
    pub fn new() -> Self {
        Self {
            opened: Mutex::new(Vec::new()),
            closed: Mutex::new(0),
            errors: Mutex::new(Vec::new()),
            dismissed: Mutex::new(0),
            challenges: Mutex::new(Vec::new()),
            answers: Mutex::new(VecDeque::new()),
            consent: Mutex::new(true),
            on_open: Mutex::new(None),
        }
    }

    /// Queue the answer to the next challenge. `None` backs out.
    pub fn answer(&self, value: Option<&str>) {
        self.answers
            .lock()
            .unwrap()
            .push_back(value.map(str::to_string));
    }

    pub fn set_consent(&self, consent: bool) {
        *self.consent.lock().unwrap() = consent;
    }

    pub fn on_open(&self, hook: OpenHook) {
        *self.on_open.lock().unwrap() = Some(hook);
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn closed(&self) -> usize {
        *self.closed.lock().unwrap()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn dismissed(&self) -> usize {
        *self.dismissed.lock().unwrap()
    }

    pub fn challenges(&self) -> Vec<ChallengeRequest> {
        self.challenges.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckoutUi for MockUi {
    async fn open_custom_tab(&self, url: &str) -> Result<()> {
        self.opened
            .lock()
            .map_err(|e| CheckoutError::Internal(format!("Mutex poisoned: {}", e)))?
            .push(url.to_string());
        let hook = self
            .on_open
            .lock()
            .map_err(|e| CheckoutError::Internal(format!("Mutex poisoned: {}", e)))?
            .clone();
        if let Some(hook) = hook {
            hook(url);
        }
        Ok(())
    }

    async fn close_custom_tab(&self) {
        *self.closed.lock().unwrap() += 1;
    }

    async fn collect_challenge(&self, request: &ChallengeRequest) -> Option<String> {
        self.challenges.lock().unwrap().push(request.clone());
        self.answers.lock().unwrap().pop_front().flatten()
    }

    async fn request_consent(&self) -> bool {
        *self.consent.lock().unwrap()
    }

    fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn dismiss_prompts(&self) {
        *self.dismissed.lock().unwrap() += 1;
    }
}
