//! Scripted payment gateway.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::gateway::{GatewayError, Headers, PaymentGateway};

/// One request seen by [`MockPaymentGateway`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    pub path: String,
    pub headers: Headers,
    pub body: Value,
}

#[derive(Default)]
struct GatewayState {
    responses: HashMap<String, VecDeque<Result<Value, GatewayError>>>,
    requests: Vec<RecordedRequest>,
}

/// Gateway answering from per-path response queues.
///
/// A path with an empty queue answers `Unexpected(404)`.
#[derive(Clone, Default)]
pub struct MockPaymentGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a response for `path`.
    pub fn respond(&self, path: &str, response: Result<Value, GatewayError>) -> &Self {
        self.lock()
            .responses
            .entry(path.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn respond_ok(&self, path: &str, body: Value) -> &Self {
        self.respond(path, Ok(body))
    }

    pub fn respond_err(&self, path: &str, error: GatewayError) -> &Self {
        self.respond(path, Err(error))
    }

    /// Every request, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Requests sent to `path`, in order.
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    /// Responses still queued for `path`.
    pub fn pending(&self, path: &str) -> usize {
        self.lock().responses.get(path).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn post(
        &self,
        path: &str,
        headers: &Headers,
        body: &Value,
    ) -> Result<Value, GatewayError> {
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            path: path.to_string(),
            headers: headers.clone(),
            body: body.clone(),
        });
        state
            .responses
            .get_mut(path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(GatewayError::Unexpected {
                    status: 404,
                    message: format!("no scripted response for {}", path),
                })
            })
    }
}
