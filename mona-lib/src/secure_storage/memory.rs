//! In-memory secure store.
//!
//! Values flagged `encrypted` are sealed with [`ValueCipher`] before they are
//! kept; plain values are kept as-is. Contents are lost when the process
//! exits.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::encryption::ValueCipher;
use super::traits::{
    SecureStore, SecureStoreError, SecureStoreErrorCode, SecureStoreResult, StoreOptions,
};

enum StoredValue {
    Plain(String),
    Sealed(Vec<u8>),
}

/// In-memory implementation of [`SecureStore`].
pub struct InMemorySecureStore {
    values: RwLock<HashMap<String, StoredValue>>,
    cipher: ValueCipher,
}

fn lock_error(context: &str) -> SecureStoreError {
    SecureStoreError::new(
        SecureStoreErrorCode::Internal,
        format!("InMemorySecureStore: lock poisoned during {}", context),
    )
}

impl InMemorySecureStore {
    /// Store with a random master key.
    pub fn new() -> Self {
        Self::with_cipher(ValueCipher::random())
    }

    /// Store whose sealed values open under `master_key`.
    pub fn with_master_key(master_key: [u8; 32]) -> Self {
        Self::with_cipher(ValueCipher::new(master_key))
    }

    pub fn with_cipher(cipher: ValueCipher) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            cipher,
        }
    }

    /// Number of stored values. Returns 0 if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is held sealed.
    pub fn is_sealed(&self, key: &str) -> bool {
        self.values
            .read()
            .map(|v| matches!(v.get(key), Some(StoredValue::Sealed(_))))
            .unwrap_or(false)
    }

    /// Raw sealed bytes, for inspecting the at-rest form.
    pub fn sealed_bytes(&self, key: &str) -> Option<Vec<u8>> {
        let values = self.values.read().ok()?;
        match values.get(key)? {
            StoredValue::Sealed(bytes) => Some(bytes.clone()),
            StoredValue::Plain(_) => None,
        }
    }
}

impl Default for InMemorySecureStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureStore for InMemorySecureStore {
    async fn get(&self, key: &str) -> SecureStoreResult<Option<String>> {
        let values = self.values.read().map_err(|_| lock_error("get"))?;
        match values.get(key) {
            None => Ok(None),
            Some(StoredValue::Plain(value)) => Ok(Some(value.clone())),
            Some(StoredValue::Sealed(sealed)) => {
                let plaintext = self.cipher.open(key, sealed)?;
                let value = std::str::from_utf8(&plaintext).map_err(|_| {
                    SecureStoreError::with_key(
                        SecureStoreErrorCode::Corrupted,
                        "decrypted value is not UTF-8",
                        key,
                    )
                })?;
                Ok(Some(value.to_string()))
            }
        }
    }

    async fn set(&self, key: &str, value: &str, options: StoreOptions) -> SecureStoreResult<()> {
        let stored = if options.encrypted {
            StoredValue::Sealed(self.cipher.seal(key, value.as_bytes())?)
        } else {
            StoredValue::Plain(value.to_string())
        };
        let mut values = self.values.write().map_err(|_| lock_error("set"))?;
        values.insert(key.to_string(), stored);
        Ok(())
    }

    async fn remove(&self, key: &str) -> SecureStoreResult<()> {
        let mut values = self.values.write().map_err(|_| lock_error("remove"))?;
        values.remove(key);
        Ok(())
    }

    async fn clear(&self) -> SecureStoreResult<()> {
        let mut values = self.values.write().map_err(|_| lock_error("clear"))?;
        values.clear();
        Ok(())
    }
}
