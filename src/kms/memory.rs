//! [`InMemoryKeyManager`]: process-local key-management backend.
//!
//! Intended for tests and local development only — master keys live in RAM
//! and vanish with the process. The ciphertext format is
//! `mem:v<version>:<base64(nonce || ciphertext+tag)>`; embedding the key
//! version lets old ciphertext remain decryptable after
//! [`rotate_master_key`](InMemoryKeyManager::rotate_master_key) adds a new
//! version, mirroring how a real service rotates a KEK transparently to its
//! callers.

use std::collections::HashMap;

use aes_gcm_siv::{
    aead::{Aead, KeyInit},
    Aes256GcmSiv, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use super::{KeyDetail, KeyManagementClient, KmsError};

const NONCE_LEN: usize = 12;
const MASTER_KEY_LEN: usize = 32;
const CIPHERTEXT_PREFIX: &str = "mem";

/// In-memory implementation of [`KeyManagementClient`].
///
/// Not for production: provides no durability and no access control.
#[derive(Default)]
pub struct InMemoryKeyManager {
    // Key name -> master key versions, oldest first. Encryption always uses
    // the newest version.
    keys: RwLock<HashMap<String, Vec<Zeroizing<[u8; MASTER_KEY_LEN]>>>>,
}

impl std::fmt::Debug for InMemoryKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print master key material.
        f.write_str("InMemoryKeyManager { keys: [REDACTED] }")
    }
}

impl InMemoryKeyManager {
    /// Create an empty key manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new version to an existing master key.
    ///
    /// Ciphertext produced under earlier versions remains decryptable.
    ///
    /// # Errors
    ///
    /// Returns [`KmsError::KeyNotFound`] if the key does not exist.
    pub async fn rotate_master_key(&self, name: &str) -> Result<(), KmsError> {
        let mut keys = self.keys.write().await;
        let versions = keys
            .get_mut(name)
            .ok_or_else(|| KmsError::KeyNotFound(name.to_owned()))?;
        versions.push(random_master_key());
        Ok(())
    }
}

fn random_master_key() -> Zeroizing<[u8; MASTER_KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; MASTER_KEY_LEN]);
    OsRng.fill_bytes(&mut *key);
    key
}

fn build_cipher(key: &[u8; MASTER_KEY_LEN]) -> Result<Aes256GcmSiv, KmsError> {
    Aes256GcmSiv::new_from_slice(key)
        .map_err(|_| KmsError::Unavailable("invalid master key length".into()))
}

#[async_trait]
impl KeyManagementClient for InMemoryKeyManager {
    async fn read_key(&self, name: &str) -> Result<Option<KeyDetail>, KmsError> {
        let keys = self.keys.read().await;
        Ok(keys.get(name).map(|versions| KeyDetail {
            name: name.to_owned(),
            versions: (1..=versions.len() as u32).collect(),
        }))
    }

    async fn create_key(&self, name: &str) -> Result<(), KmsError> {
        let mut keys = self.keys.write().await;
        // Creating an existing key is a no-op, matching service semantics.
        keys.entry(name.to_owned())
            .or_insert_with(|| vec![random_master_key()]);
        Ok(())
    }

    async fn encrypt(&self, name: &str, plaintext: &str) -> Result<String, KmsError> {
        let keys = self.keys.read().await;
        let versions = keys
            .get(name)
            .ok_or_else(|| KmsError::KeyNotFound(name.to_owned()))?;
        let version = versions.len();
        // Non-empty by construction; guard anyway.
        let key = versions
            .last()
            .ok_or_else(|| KmsError::KeyNotFound(name.to_owned()))?;

        let cipher = build_cipher(key)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| KmsError::Unavailable("aead encryption failed".into()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(format!(
            "{CIPHERTEXT_PREFIX}:v{version}:{}",
            STANDARD.encode(blob)
        ))
    }

    async fn decrypt(&self, name: &str, ciphertext: &str) -> Result<String, KmsError> {
        let parts: Vec<&str> = ciphertext.splitn(3, ':').collect();
        if parts.len() != 3 || parts[0] != CIPHERTEXT_PREFIX {
            return Err(KmsError::InvalidCiphertext);
        }
        let version: usize = parts[1]
            .strip_prefix('v')
            .and_then(|v| v.parse().ok())
            .ok_or(KmsError::InvalidCiphertext)?;
        let blob = STANDARD
            .decode(parts[2])
            .map_err(|_| KmsError::InvalidCiphertext)?;
        if blob.len() < NONCE_LEN {
            return Err(KmsError::InvalidCiphertext);
        }

        let keys = self.keys.read().await;
        let versions = keys
            .get(name)
            .ok_or_else(|| KmsError::KeyNotFound(name.to_owned()))?;
        let key = version
            .checked_sub(1)
            .and_then(|i| versions.get(i))
            .ok_or(KmsError::DecryptFailed)?;

        let cipher = build_cipher(key)?;
        let nonce = Nonce::from_slice(&blob[..NONCE_LEN]);
        let plaintext = cipher
            .decrypt(nonce, &blob[NONCE_LEN..])
            .map_err(|_| KmsError::DecryptFailed)?;

        String::from_utf8(plaintext).map_err(|_| KmsError::DecryptFailed)
    }
}
