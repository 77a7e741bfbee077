//! Device key exchange for saved payment methods.
//!
//! The hosted page authenticates the user and publishes a strong-auth token
//! on the session's authentication channel. The token buys an access token,
//! and with the user's consent a device key is generated, its registration
//! challenge signed and the key committed.

use super::CheckoutOrchestrator;
use crate::status::CheckoutState;
use crate::{CheckoutError, Result};
use mona_lib::events::DomainEvent;
use mona_lib::gateway::{GatewayError, Headers};
use mona_lib::protocol::{checkout_url, login_url, ChannelKey, LoginScope};
use mona_lib::secure_storage::{keys, SecureStoreExt, StoreOptions};
use mona_lib::state::AuthState;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

impl CheckoutOrchestrator {
    /// Enroll this device. Any failure other than an unknown user leaves the
    /// user logged out.
    pub(super) async fn key_exchange(&mut self) -> Result<()> {
        let result = self.run_key_exchange().await;
        self.close_tab().await;
        if let Err(error) = &result {
            warn!(error = %error, "Key exchange failed");
            if !matches!(error, CheckoutError::NotAMonaUser) {
                self.status.set_auth(AuthState::LoggedOut);
            }
        }
        result
    }

    async fn run_key_exchange(&mut self) -> Result<()> {
        self.status.set_state(CheckoutState::KeyExchangePending);
        self.status.set_auth(AuthState::PerformingLogin);

        let session_id = Uuid::new_v4().to_string();
        let url = self.authorization_url(&session_id)?;
        let auth_channel = self.watch_channel(ChannelKey::authentication(session_id.as_str()))?;
        info!(session_id = %session_id, "Opening authorization page");
        self.open_tab(&url).await?;

        let limit = self.options.auth_timeout();
        let token = self
            .wait_for_event("strong-auth token", limit, |event| match event {
                DomainEvent::StrongAuthToken(token) => Some(token),
                _ => None,
            })
            .await?;
        drop(auth_channel);
        self.close_tab().await;

        self.status.set_state(CheckoutState::Authenticating);
        self.login(&token).await?;

        if !self.cancel.guard(self.ui.request_consent()).await? {
            return Err(CheckoutError::ConsentDeclined);
        }

        self.status.set_state(CheckoutState::Enrolling);
        self.sign_and_commit_keys().await
    }

    /// Checkout page with a login scope once a transaction exists, else the
    /// mandatory login page.
    fn authorization_url(&self, session_id: &str) -> Result<String> {
        let session = self.current_session()?;
        let scope = LoginScope {
            merchant_key: &self.config.merchant_key,
            session_id,
        };
        match &session.transaction_id {
            Some(transaction_id) => Ok(checkout_url(
                &self.config.pay_host,
                transaction_id,
                session.method.as_str(),
                Some(scope),
            )?),
            None => {
                let target = self
                    .options
                    .return_url
                    .as_deref()
                    .unwrap_or(&self.config.pay_host);
                Ok(login_url(&self.config.pay_host, scope, target))
            }
        }
    }

    async fn login(&self, strong_auth_token: &str) -> Result<()> {
        let body = json!({ "strongAuthToken": strong_auth_token });
        let reply = self.post_auth(&self.config.login_path, &Headers::new(), &body).await?;

        if reply.get("isMonaUser").and_then(Value::as_bool) == Some(false) {
            self.status.set_auth(AuthState::NotAMonaUser);
            return Err(CheckoutError::NotAMonaUser);
        }
        let access_token = reply
            .get("accessToken")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| CheckoutError::Auth("login response carried no access token".into()))?;

        self.store
            .set(keys::ACCESS_TOKEN, access_token, StoreOptions::encrypted())
            .await?;
        self.status.set_auth(AuthState::LoggedIn);
        info!("Logged in");
        Ok(())
    }

    async fn sign_and_commit_keys(&self) -> Result<()> {
        let public_key = self
            .cancel
            .guard(self.authenticator.generate_key_pair())
            .await?
            .map_err(|e| CheckoutError::SigningFailed(format!("key generation failed: {}", e)))?;

        let headers = self.auth_headers().await?;
        let begin = self
            .post_auth(&self.config.key_begin_path, &headers, &json!({ "publicKey": public_key }))
            .await?;
        let challenge = begin
            .get("registrationChallenge")
            .and_then(Value::as_str)
            .ok_or_else(|| CheckoutError::Auth("key registration returned no challenge".into()))?
            .to_string();

        let signature = match self
            .cancel
            .guard(self.authenticator.sign(&challenge, &self.options.prompt))
            .await?
        {
            Ok(Some(signature)) if !signature.is_empty() => signature,
            Ok(_) => {
                return Err(CheckoutError::SigningFailed(
                    "registration challenge was not signed".into(),
                ))
            }
            Err(error) => return Err(CheckoutError::SigningFailed(error.to_string())),
        };

        let mut commit_body = json!({
            "publicKey": public_key,
            "registrationChallenge": challenge,
            "signature": signature,
        });
        if let Some(key_id) = begin.get("keyId") {
            commit_body["keyId"] = key_id.clone();
        }
        let commit = self
            .post_auth(&self.config.key_commit_path, &headers, &commit_body)
            .await?;

        let key_id = commit
            .get("keyId")
            .or_else(|| begin.get("keyId"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CheckoutError::Auth("key registration returned no key id".into()))?
            .to_string();

        self.store.set(keys::KEY_ID, &key_id, StoreOptions::plain()).await?;
        self.store.set_flag(keys::HAS_DEVICE_KEY, true).await?;
        self.status.update_session(|session| {
            session.key_id = Some(key_id.clone());
            session.has_device_key = true;
        });
        info!(key_id = %key_id, "Device key registered");
        Ok(())
    }

    /// Gateway call whose failure ends the login.
    async fn post_auth(&self, path: &str, headers: &Headers, body: &Value) -> Result<Value> {
        self.cancel
            .guard(self.gateway.post(path, headers, body))
            .await?
            .map_err(|e: GatewayError| {
                CheckoutError::Auth(format!("{}: {}", path, e.user_message()))
            })
    }
}
