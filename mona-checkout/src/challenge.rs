//! PIN and OTP challenges.
//!
//! OTP values are sent as entered. PINs are RSA-OAEP (SHA-256) encrypted
//! when the task asks for it, with the public key the task publishes or the
//! configured fallback, and sent base64-encoded.

use crate::{CheckoutError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

/// Kind of value a challenge asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeKind {
    Pin,
    Otp,
}

impl ChallengeKind {
    /// Parse a task `fieldType`.
    pub fn from_field_type(field_type: &str) -> Option<Self> {
        match field_type.to_ascii_lowercase().as_str() {
            "pin" => Some(Self::Pin),
            "otp" => Some(Self::Otp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pin => "pin",
            Self::Otp => "otp",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the UI is asked to collect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeRequest {
    pub kind: ChallengeKind,
    /// Payload field the value is sent in.
    pub field_name: String,
    /// Expected number of characters, when the gateway says.
    pub length: Option<usize>,
    pub encrypted: bool,
    /// Key published with the task, PEM or base64 DER.
    pub public_key: Option<String>,
}

impl ChallengeRequest {
    pub fn new(kind: ChallengeKind) -> Self {
        Self {
            kind,
            field_name: kind.as_str().to_string(),
            length: None,
            encrypted: false,
            public_key: None,
        }
    }

    /// Check an entered value against the requested shape.
    pub fn validate(&self, value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(CheckoutError::invalid_input(self.kind.as_str(), "value is empty"));
        }
        if let Some(length) = self.length {
            let entered = value.chars().count();
            if entered != length {
                return Err(CheckoutError::invalid_input(
                    self.kind.as_str(),
                    format!("expected {} characters, got {}", length, entered),
                ));
            }
        }
        Ok(())
    }

    /// Turn an entered value into what is sent to the gateway.
    ///
    /// Only PINs are ever encrypted; `fallback_key` is used when the task
    /// published no key of its own.
    pub fn prepare(&self, value: &str, fallback_key: Option<&str>) -> Result<String> {
        self.validate(value)?;
        if self.kind != ChallengeKind::Pin || !self.encrypted {
            return Ok(value.to_string());
        }
        let key = self
            .public_key
            .as_deref()
            .or(fallback_key)
            .ok_or_else(|| CheckoutError::Encryption("no public key for PIN encryption".into()))?;
        encrypt_pin(key, value)
    }
}

/// Parse an RSA public key given as SPKI PEM, PKCS#1 PEM or base64 SPKI DER.
pub fn parse_public_key(key: &str) -> Result<RsaPublicKey> {
    let key = key.trim();
    if key.starts_with("-----BEGIN RSA PUBLIC KEY-----") {
        return RsaPublicKey::from_pkcs1_pem(key)
            .map_err(|e| CheckoutError::Encryption(format!("invalid PKCS#1 key: {}", e)));
    }
    if key.starts_with("-----BEGIN") {
        return RsaPublicKey::from_public_key_pem(key)
            .map_err(|e| CheckoutError::Encryption(format!("invalid public key: {}", e)));
    }
    let der: String = key.chars().filter(|c| !c.is_whitespace()).collect();
    let der = STANDARD
        .decode(der)
        .map_err(|e| CheckoutError::Encryption(format!("public key is not base64: {}", e)))?;
    RsaPublicKey::from_public_key_der(&der)
        .map_err(|e| CheckoutError::Encryption(format!("invalid public key: {}", e)))
}

/// RSA-OAEP-SHA256 encrypt `pin`, base64 encoded.
pub fn encrypt_pin(public_key: &str, pin: &str) -> Result<String> {
    let key = parse_public_key(public_key)?;
    let mut rng = rand::thread_rng();
    let ciphertext = key
        .encrypt(&mut rng, Oaep::new::<Sha256>(), pin.as_bytes())
        .map_err(|e| CheckoutError::Encryption(e.to_string()))?;
    Ok(STANDARD.encode(ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePublicKey, LineEnding};
    use rsa::RsaPrivateKey;

    fn keypair() -> (RsaPrivateKey, String) {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let pem = RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        (private, pem)
    }

    fn decrypt(private: &RsaPrivateKey, encoded: &str) -> String {
        let ciphertext = STANDARD.decode(encoded).unwrap();
        let plaintext = private.decrypt(Oaep::new::<Sha256>(), &ciphertext).unwrap();
        String::from_utf8(plaintext).unwrap()
    }

    #[test]
    fn test_field_types() {
        assert_eq!(ChallengeKind::from_field_type("PIN"), Some(ChallengeKind::Pin));
        assert_eq!(ChallengeKind::from_field_type("otp"), Some(ChallengeKind::Otp));
        assert_eq!(ChallengeKind::from_field_type("cvc"), None);
    }

    #[test]
    fn test_length_validation() {
        let mut request = ChallengeRequest::new(ChallengeKind::Otp);
        request.length = Some(6);
        assert!(request.validate("123456").is_ok());
        assert!(matches!(
            request.validate("12345"),
            Err(CheckoutError::InvalidInput { .. })
        ));
        assert!(request.validate("").is_err());
    }

    #[test]
    fn test_otp_is_sent_as_entered() {
        let mut request = ChallengeRequest::new(ChallengeKind::Otp);
        request.encrypted = true;
        assert_eq!(request.prepare("123456", None).unwrap(), "123456");
    }

    #[test]
    fn test_pin_encrypted_with_task_key() {
        let (private, pem) = keypair();
        let mut request = ChallengeRequest::new(ChallengeKind::Pin);
        request.encrypted = true;
        request.public_key = Some(pem);

        let sent = request.prepare("4321", None).unwrap();
        assert_ne!(sent, "4321");
        assert_eq!(decrypt(&private, &sent), "4321");
    }

    #[test]
    fn test_pin_falls_back_to_configured_key() {
        let (private, pem) = keypair();
        let mut request = ChallengeRequest::new(ChallengeKind::Pin);
        request.encrypted = true;

        assert!(matches!(
            request.prepare("4321", None),
            Err(CheckoutError::Encryption(_))
        ));
        let sent = request.prepare("4321", Some(&pem)).unwrap();
        assert_eq!(decrypt(&private, &sent), "4321");
    }

    #[test]
    fn test_base64_der_key() {
        let (private, _) = keypair();
        let der = RsaPublicKey::from(&private).to_public_key_der().unwrap();
        let encoded = STANDARD.encode(der.as_bytes());
        let sent = encrypt_pin(&encoded, "9999").unwrap();
        assert_eq!(decrypt(&private, &sent), "9999");
    }

    #[test]
    fn test_garbage_key_is_rejected() {
        assert!(parse_public_key("not a key").is_err());
    }
}
