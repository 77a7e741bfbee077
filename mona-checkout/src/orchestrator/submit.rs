//! Payment submission rounds.

use super::CheckoutOrchestrator;
use crate::challenge::ChallengeRequest;
use crate::signing::{SignatureHeaders, SigningRequest};
use crate::status::CheckoutState;
use crate::task::{CheckoutResponse, PaymentPayload, TaskAction};
use crate::{CheckoutError, Result};
use mona_lib::gateway::GatewayError;
use mona_lib::protocol::ChannelKey;
use mona_lib::state::{TransactionInfo, TransactionState};
use serde_json::Value;
use tracing::{debug, info};

impl CheckoutOrchestrator {
    /// Post the payment until the gateway accepts it or gives up.
    ///
    /// Each round answers the task of the previous reply: a `sign` task turns
    /// on request signing for the remaining rounds, PIN and OTP tasks add the
    /// collected value to the body.
    pub(super) async fn submit_payment(&mut self) -> Result<CheckoutResponse> {
        let session = self.current_session()?;
        let path = self.config.checkout_path.clone();
        let mut payload = PaymentPayload::from_session(&session);
        let mut sign = false;

        for round in 1..=self.options.max_rounds {
            self.status.set_state(CheckoutState::SubmittingPayment);
            let body = payload.to_json()?;
            let mut headers = self.auth_headers().await?;
            if sign {
                self.sign_submission(&path, &body).await?.apply(&mut headers);
            }

            debug!(round, signed = sign, method = %session.method, "Submitting payment");
            let reply = self
                .cancel
                .guard(self.gateway.post(&path, &headers, &body))
                .await??;
            let response = CheckoutResponse::from_json(&reply);
            if response.success {
                return Ok(response);
            }

            let Some(task) = response.task else {
                let message = response
                    .message
                    .unwrap_or_else(|| "The payment was not accepted".to_string());
                return Err(CheckoutError::Declined(message));
            };
            match task.action() {
                TaskAction::Sign => {
                    debug!(round, "Gateway requested a signature");
                    sign = true;
                }
                TaskAction::Challenge(request) => {
                    let value = self.resolve_challenge(&request).await?;
                    payload.insert_extra(request.field_name.clone(), value);
                }
                TaskAction::Unsupported(description) => {
                    return Err(CheckoutError::UnsupportedTask(description));
                }
            }
        }

        Err(CheckoutError::TooManyRounds(self.options.max_rounds))
    }

    async fn sign_submission(&self, path: &str, body: &Value) -> Result<SignatureHeaders> {
        let key_id = self
            .current_session()?
            .key_id
            .ok_or_else(|| CheckoutError::SigningFailed("no device key is enrolled".into()))?;
        let request = SigningRequest::post(path, body, &key_id)?;
        let challenge = request.challenge();

        let signature = match self
            .cancel
            .guard(self.authenticator.sign(&challenge, &self.options.prompt))
            .await?
        {
            Ok(Some(signature)) => signature,
            Ok(None) => {
                return Err(CheckoutError::SigningFailed("signature was not provided".into()))
            }
            Err(error) => return Err(CheckoutError::SigningFailed(error.to_string())),
        };
        request.into_headers(signature)
    }

    async fn resolve_challenge(&self, request: &ChallengeRequest) -> Result<String> {
        self.status.set_state(CheckoutState::AwaitingChallenge(request.kind));
        info!(kind = %request.kind, length = ?request.length, "Challenge requested");

        let entered = self
            .cancel
            .guard(self.ui.collect_challenge(request))
            .await?
            .ok_or(CheckoutError::ChallengeAborted(request.kind))?;
        request.prepare(&entered, self.config.pin_public_key_pem.as_deref())
    }

    /// Record the accepted transaction, publish `Initiated` and start
    /// listening for its outcome.
    pub(super) fn accept(&mut self, response: CheckoutResponse) -> Result<TransactionInfo> {
        let transaction_id = response
            .transaction_ref
            .or_else(|| self.status.session().and_then(|s| s.transaction_id))
            .ok_or_else(|| {
                CheckoutError::Gateway(GatewayError::Unexpected {
                    status: 200,
                    message: "accepted payment carried no transaction reference".into(),
                })
            })?;

        let friendly_id = response.friendly_id;
        self.status.update_session(|session| {
            session.transaction_id = Some(transaction_id.clone());
            if friendly_id.is_some() {
                session.friendly_id = friendly_id.clone();
            }
        });
        let info = self
            .current_session()?
            .transaction_info()
            .unwrap_or_else(|| TransactionInfo::new(transaction_id.clone()));

        let updates = self.watch_channel(ChannelKey::payment_updates(&transaction_id))?;
        let messages = self.watch_channel(ChannelKey::transaction_messages(&transaction_id))?;
        self.subscriptions.extend([updates, messages]);

        info!(transaction_id = %info.transaction_id, "Payment accepted");
        self.status.set_state(CheckoutState::TransactionPending);
        self.status.set_transaction(TransactionState::Initiated(info.clone()));
        Ok(info)
    }
}
