//! AES-256-GCM sealing for values stored at rest.
//!
//! # Wire Format
//!
//! ```text
//! [1 byte version][12 bytes nonce][N bytes ciphertext][16 bytes auth tag]
//! ```
//!
//! The cipher key for each entry is derived with HKDF-SHA256 from the master
//! key, using the entry's storage key as `info`. A sealed value moved to
//! another key fails to open.

use super::traits::{SecureStoreError, SecureStoreResult};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

const SEAL_VERSION: u8 = 1;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const HKDF_SALT: &[u8] = b"mona-secure-store-v1";

/// Seals and opens values under a master key.
#[derive(Clone)]
pub struct ValueCipher {
    master_key: Zeroizing<[u8; 32]>,
}

impl ValueCipher {
    pub fn new(master_key: [u8; 32]) -> Self {
        Self {
            master_key: Zeroizing::new(master_key),
        }
    }

    /// Cipher with a fresh random master key.
    pub fn random() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(key)
    }

    fn cipher_for(&self, key: &str) -> SecureStoreResult<Aes256Gcm> {
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), self.master_key.as_ref());
        let mut derived = Zeroizing::new([0u8; 32]);
        hk.expand(key.as_bytes(), derived.as_mut()).map_err(|e| {
            SecureStoreError::encryption_failed(key, format!("key derivation: {}", e))
        })?;
        Aes256Gcm::new_from_slice(derived.as_ref())
            .map_err(|e| SecureStoreError::encryption_failed(key, e.to_string()))
    }

    /// Seal `plaintext` for storage under `key`.
    pub fn seal(&self, key: &str, plaintext: &[u8]) -> SecureStoreResult<Vec<u8>> {
        let cipher = self.cipher_for(key)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| SecureStoreError::encryption_failed(key, e.to_string()))?;

        let mut sealed = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
        sealed.push(SEAL_VERSION);
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a value sealed under `key`.
    pub fn open(&self, key: &str, sealed: &[u8]) -> SecureStoreResult<Zeroizing<Vec<u8>>> {
        if sealed.len() < 1 + NONCE_SIZE + TAG_SIZE {
            return Err(SecureStoreError::decryption_failed(key, "sealed value too short"));
        }
        if sealed[0] != SEAL_VERSION {
            return Err(SecureStoreError::decryption_failed(
                key,
                format!("unsupported seal version {}", sealed[0]),
            ));
        }

        let cipher = self
            .cipher_for(key)
            .map_err(|e| SecureStoreError::decryption_failed(key, e.message))?;
        let nonce = Nonce::from_slice(&sealed[1..1 + NONCE_SIZE]);
        cipher
            .decrypt(nonce, &sealed[1 + NONCE_SIZE..])
            .map(Zeroizing::new)
            .map_err(|_| SecureStoreError::decryption_failed(key, "authentication failed"))
    }
}

impl std::fmt::Debug for ValueCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure_storage::SecureStoreErrorCode;

    #[test]
    fn test_seal_and_open() {
        let cipher = ValueCipher::new([7u8; 32]);
        let sealed = cipher.seal("mona.accessToken", b"at_123").unwrap();
        assert_eq!(sealed[0], SEAL_VERSION);
        assert_eq!(sealed.len(), 1 + NONCE_SIZE + 6 + TAG_SIZE);
        assert_eq!(
            cipher.open("mona.accessToken", &sealed).unwrap().as_slice(),
            b"at_123"
        );
    }

    #[test]
    fn test_value_bound_to_key() {
        let cipher = ValueCipher::new([7u8; 32]);
        let sealed = cipher.seal("a", b"secret").unwrap();
        let err = cipher.open("b", &sealed).unwrap_err();
        assert_eq!(err.code, SecureStoreErrorCode::DecryptionFailed);
    }

    #[test]
    fn test_tamper_detected() {
        let cipher = ValueCipher::random();
        let mut sealed = cipher.seal("k", b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(cipher.open("k", &sealed).is_err());
        assert!(cipher.open("k", &sealed[..5]).is_err());
    }

    #[test]
    fn test_nonces_differ() {
        let cipher = ValueCipher::random();
        let a = cipher.seal("k", b"same").unwrap();
        let b = cipher.seal("k", b"same").unwrap();
        assert_ne!(a, b);
    }
}
