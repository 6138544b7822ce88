//! Key-management service seam.
//!
//! The KEK (key-encryption-key) lives in an external key-management service;
//! this crate only ever asks that service to create/read a named master key
//! and to encrypt/decrypt short text blobs under it. The service's own
//! cryptography and key-version rotation are opaque to callers.
//!
//! [`KeyManagementClient`] is the capability boundary: production wirings
//! implement it against their KMS of choice, tests mock it, and
//! [`memory::InMemoryKeyManager`] provides a process-local backend for
//! development.

pub mod memory;

pub use memory::InMemoryKeyManager;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a key-management backend.
#[derive(Debug, Error)]
pub enum KmsError {
    /// The service could not be reached or failed internally.
    #[error("key management service unavailable: {0}")]
    Unavailable(String),

    /// The named master key does not exist.
    #[error("master key {0:?} not found")]
    KeyNotFound(String),

    /// The ciphertext is not in a format this backend produces.
    #[error("ciphertext is not in a recognized format")]
    InvalidCiphertext,

    /// Decryption failed (wrong key, wrong version, or tampered ciphertext).
    #[error("decryption failed")]
    DecryptFailed,
}

/// Metadata about a master key, as reported by the service.
///
/// Version history is the service's concern; it is surfaced here only so the
/// bootstrap path can log how many versions an existing KEK carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDetail {
    /// Name of the master key.
    pub name: String,
    /// Version identifiers the service currently holds for this key.
    pub versions: Vec<u32>,
}

/// Capability to manage a named master key and to encrypt/decrypt short text
/// under it. Ciphertext and plaintext are opaque text to this crate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyManagementClient: Send + Sync {
    /// Look up a master key by name. `Ok(None)` means the key does not exist.
    async fn read_key(&self, name: &str) -> Result<Option<KeyDetail>, KmsError>;

    /// Create a master key with service-side defaults.
    async fn create_key(&self, name: &str) -> Result<(), KmsError>;

    /// Encrypt `plaintext` under the named master key.
    async fn encrypt(&self, name: &str, plaintext: &str) -> Result<String, KmsError>;

    /// Decrypt ciphertext previously produced by [`encrypt`](Self::encrypt)
    /// under the named master key, regardless of which key version produced it.
    async fn decrypt(&self, name: &str, ciphertext: &str) -> Result<String, KmsError>;
}
