//! Core trait for secure value storage.

use async_trait::async_trait;
use std::fmt;

/// Well-known keys.
pub mod keys {
    /// Identifier of the enrolled device signing key.
    pub const KEY_ID: &str = "mona.keyId";
    /// `"true"` once a device key has been committed.
    pub const HAS_DEVICE_KEY: &str = "mona.hasDeviceKey";
    /// Access token returned by login.
    pub const ACCESS_TOKEN: &str = "mona.accessToken";
}

/// Error codes for secure storage operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SecureStoreErrorCode {
    /// Access denied (auth required)
    AccessDenied = 2000,
    /// Storage is locked
    StorageLocked = 2003,
    /// Encryption failed
    EncryptionFailed = 5000,
    /// Decryption failed
    DecryptionFailed = 5001,
    /// Stored value is not valid UTF-8 or has an unknown format
    Corrupted = 5002,
    /// Internal error
    Internal = 9999,
}

/// Error type for secure storage operations.
#[derive(Debug)]
pub struct SecureStoreError {
    /// Error code for FFI/mobile integration
    pub code: SecureStoreErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Key related to the error (if applicable)
    pub key: Option<String>,
}

impl SecureStoreError {
    pub fn new(code: SecureStoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            key: None,
        }
    }

    pub fn with_key(
        code: SecureStoreErrorCode,
        message: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            key: Some(key.into()),
        }
    }

    pub fn encryption_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::with_key(SecureStoreErrorCode::EncryptionFailed, reason, key)
    }

    pub fn decryption_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::with_key(SecureStoreErrorCode::DecryptionFailed, reason, key)
    }

    /// Check if this error requires user authentication.
    pub fn requires_auth(&self) -> bool {
        matches!(
            self.code,
            SecureStoreErrorCode::AccessDenied | SecureStoreErrorCode::StorageLocked
        )
    }

    /// Whether the value is unreadable with the current key material.
    pub fn is_crypto_failure(&self) -> bool {
        matches!(
            self.code,
            SecureStoreErrorCode::EncryptionFailed | SecureStoreErrorCode::DecryptionFailed
        )
    }
}

impl fmt::Display for SecureStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(key) = &self.key {
            write!(f, "{} (key: {})", self.message, key)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for SecureStoreError {}

/// Result type for secure storage operations.
pub type SecureStoreResult<T> = Result<T, SecureStoreError>;

/// Options for storing a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Encrypt the value at rest.
    pub encrypted: bool,
}

impl StoreOptions {
    pub fn plain() -> Self {
        Self { encrypted: false }
    }

    pub fn encrypted() -> Self {
        Self { encrypted: true }
    }
}

/// Platform-agnostic secure value storage.
///
/// Implementations must never log values.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Read a value. `Ok(None)` when absent.
    ///
    /// # Errors
    /// - `DecryptionFailed` if an encrypted value cannot be opened
    async fn get(&self, key: &str) -> SecureStoreResult<Option<String>>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    /// - `EncryptionFailed` if `options.encrypted` and encryption fails
    async fn set(&self, key: &str, value: &str, options: StoreOptions) -> SecureStoreResult<()>;

    /// Remove a value. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> SecureStoreResult<()>;

    /// Remove every value.
    async fn clear(&self) -> SecureStoreResult<()>;
}

/// Convenience methods over [`SecureStore`].
#[async_trait]
pub trait SecureStoreExt: SecureStore {
    /// Read a `"true"`/`"false"` flag; absent reads as false.
    async fn get_flag(&self, key: &str) -> SecureStoreResult<bool> {
        Ok(self.get(key).await?.as_deref() == Some("true"))
    }

    async fn set_flag(&self, key: &str, value: bool) -> SecureStoreResult<()> {
        let value = if value { "true" } else { "false" };
        self.set(key, value, StoreOptions::plain()).await
    }
}

impl<T: SecureStore + ?Sized> SecureStoreExt for T {}
