//! Secure persistence for enrollment data and session secrets.
//!
//! [`SecureStore`] is the boundary to platform storage (keychain, keystore).
//! Values are strings; callers flag the ones that must be encrypted at rest.
//! [`InMemorySecureStore`] encrypts flagged values with AES-256-GCM under a
//! per-key HKDF-derived key and backs tests and desktop hosts.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mona_lib::secure_storage::{InMemorySecureStore, SecureStore, StoreOptions};
//!
//! let store = InMemorySecureStore::new();
//! store.set("mona.accessToken", "at_123", StoreOptions::encrypted()).await?;
//! assert_eq!(store.get("mona.accessToken").await?.as_deref(), Some("at_123"));
//! store.remove("mona.accessToken").await?;
//! ```
//!
//! Values are never logged.

mod encryption;
mod memory;
mod traits;

pub use encryption::ValueCipher;
pub use memory::InMemorySecureStore;
pub use traits::{
    keys, SecureStore, SecureStoreError, SecureStoreErrorCode, SecureStoreExt, SecureStoreResult,
    StoreOptions,
};
