//! Canonical request signing
//!
//! A signed submission commits to the HTTP method, path, exact body, a
//! fresh nonce, the timestamp and the device key id. Each part is
//! base64url-encoded (no padding), the parts are joined with `;` and the
//! SHA-256 digest of that string, base64url-encoded, is the challenge the
//! authenticator signs.

use crate::{CheckoutError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use mona_lib::gateway::Headers;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const HEADER_KEY_ID: &str = "X-Mona-Key-Id";
pub const HEADER_SIGNATURE: &str = "X-Mona-Signature";
pub const HEADER_NONCE: &str = "X-Mona-Nonce";
pub const HEADER_TIMESTAMP: &str = "X-Mona-Timestamp";

/// One submission to be signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningRequest {
    pub method: String,
    pub path: String,
    /// Body exactly as serialized on the wire.
    pub body: String,
    pub nonce: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub key_id: String,
}

impl SigningRequest {
    /// Request for a POST of `body` to `path` with a fresh nonce and the
    /// current time.
    pub fn post(path: &str, body: &Value, key_id: &str) -> Result<Self> {
        Ok(Self {
            method: "POST".to_string(),
            path: path.to_string(),
            body: serde_json::to_string(body)?,
            nonce: hex::encode(rand::random::<[u8; 16]>()),
            timestamp: chrono::Utc::now().timestamp(),
            key_id: key_id.to_string(),
        })
    }

    /// `;`-joined base64url parts.
    pub fn canonical_string(&self) -> String {
        let timestamp = self.timestamp.to_string();
        [
            self.method.as_str(),
            self.path.as_str(),
            self.body.as_str(),
            self.nonce.as_str(),
            timestamp.as_str(),
            self.key_id.as_str(),
        ]
        .iter()
        .map(|part| URL_SAFE_NO_PAD.encode(part.as_bytes()))
        .collect::<Vec<_>>()
        .join(";")
    }

    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.canonical_string().as_bytes()).into()
    }

    /// Value handed to the authenticator.
    pub fn challenge(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.digest())
    }

    /// Attach the authenticator's signature.
    pub fn into_headers(self, signature: String) -> Result<SignatureHeaders> {
        if signature.is_empty() {
            return Err(CheckoutError::SigningFailed(
                "authenticator returned an empty signature".into(),
            ));
        }
        Ok(SignatureHeaders {
            key_id: self.key_id,
            signature,
            nonce: self.nonce,
            timestamp: self.timestamp,
        })
    }
}

/// Signature headers sent with a signed submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureHeaders {
    pub key_id: String,
    pub signature: String,
    pub nonce: String,
    pub timestamp: i64,
}

impl SignatureHeaders {
    pub fn apply(&self, headers: &mut Headers) {
        headers.insert(HEADER_KEY_ID.to_string(), self.key_id.clone());
        headers.insert(HEADER_SIGNATURE.to_string(), self.signature.clone());
        headers.insert(HEADER_NONCE.to_string(), self.nonce.clone());
        headers.insert(HEADER_TIMESTAMP.to_string(), self.timestamp.to_string());
    }
}
