//! reqwest-backed payment gateway.

use super::{GatewayError, Headers, PaymentGateway};
use crate::config::MonaConfig;
use crate::{MonaError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

/// Posts JSON to `{api_url}{path}`.
pub struct HttpPaymentGateway {
    api_url: String,
    timeout: Duration,
    client: reqwest::Client,
    default_headers: RwLock<Headers>,
}

impl HttpPaymentGateway {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonaError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_url: api_url.into(),
            timeout,
            client,
            default_headers: RwLock::new(Headers::new()),
        })
    }

    pub fn from_config(config: &MonaConfig) -> Result<Self> {
        Self::new(config.api_url.clone(), config.timeout())
    }

    /// Send `name: value` on every request.
    pub fn set_default_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.default_headers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), value.into());
    }

    pub fn remove_default_header(&self, name: &str) {
        self.default_headers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Transport(format!(
                "request timed out after {}ms",
                self.timeout.as_millis()
            ))
        } else {
            GatewayError::Transport(e.to_string())
        }
    }

    fn map_status_error(status: u16, body: &str) -> GatewayError {
        let message = error_message(body);
        match status {
            400..=499 => GatewayError::Rejected { status, message },
            _ => GatewayError::Unexpected { status, message },
        }
    }
}

/// `message` or `error` from a JSON body, else the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn post(
        &self,
        path: &str,
        headers: &Headers,
        body: &Value,
    ) -> std::result::Result<Value, GatewayError> {
        let url = self.url(path);
        let mut request = self.client.post(&url).json(body);
        {
            let defaults = self.default_headers.read().unwrap_or_else(|e| e.into_inner());
            for (name, value) in defaults.iter().chain(headers.iter()) {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request.send().await.map_err(|e| self.map_reqwest_error(e))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.map_reqwest_error(e))?;
        debug!(path, status, "Gateway response");

        if (200..300).contains(&status) {
            if text.trim().is_empty() {
                return Ok(Value::Object(Default::default()));
            }
            return serde_json::from_str(&text).map_err(|e| GatewayError::Unexpected {
                status,
                message: format!("invalid JSON: {}", e),
            });
        }

        if (400..500).contains(&status) {
            if let Ok(json) = serde_json::from_str::<Value>(&text) {
                if json.get("task").map_or(false, Value::is_object) {
                    return Ok(json);
                }
            }
        }

        Err(Self::map_status_error(status, &text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message":"Card declined"}"#), "Card declined");
        assert_eq!(error_message(r#"{"error":"Bad input"}"#), "Bad input");
        assert_eq!(error_message(" plain text \n"), "plain text");
    }

    #[test]
    fn test_status_mapping() {
        assert!(HttpPaymentGateway::map_status_error(422, "{}").is_rejected());
        assert!(matches!(
            HttpPaymentGateway::map_status_error(503, "down"),
            GatewayError::Unexpected { status: 503, .. }
        ));
    }

    #[test]
    fn test_url_join() {
        let gateway =
            HttpPaymentGateway::new("https://api.example.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(gateway.url("/demo/checkout"), "https://api.example.com/demo/checkout");
    }
}
