//! Envelope keyring lifecycle: bootstrap, rotation, retirement.
//!
//! # Lifecycle
//!
//! 1. At process startup, [`bootstrap`] makes sure the KEK exists in the
//!    key-management service and that the keyring holds at least one active
//!    encrypted DEK, generating one if needed. Running it again is a no-op.
//! 2. Thereafter the keyring is read-mostly: every new database connection
//!    reads the active entries (see [`crate::session`]).
//! 3. [`rotate`] appends a fresh DEK — older entries stay active so existing
//!    column ciphertext remains decryptable — and [`retire`] flips a
//!    superseded entry inactive once its data has been re-encrypted.
//!
//! # Security invariants
//!
//! - Plaintext DEK material exists only transiently here, zeroized on drop;
//!   it is never persisted and never logged.
//! - Encrypted DEK text is appended, never rewritten in place.

pub mod dek;
pub mod store;

pub use store::{KeyringEntry, KeyringStore, PgKeyringStore, StoreError};

use thiserror::Error;
use tracing::{debug, info};

use crate::kms::{KeyManagementClient, KmsError};

/// Errors from keyring lifecycle operations.
#[derive(Debug, Error)]
pub enum KeyringError {
    /// The key-management service call failed.
    #[error(transparent)]
    KeyManagement(#[from] KmsError),

    /// The keyring store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Ensure the KEK and at least one active encrypted DEK exist.
///
/// Idempotent: a keyring that already holds an active entry is left alone.
/// On any failure the keyring is either fully updated or untouched — the
/// only write is the single atomic insert at the end.
///
/// # Errors
///
/// Propagates key-management and store failures; callers should treat a
/// bootstrap failure as fatal for startup.
pub async fn bootstrap<K, S>(kms: &K, store: &S, kek_name: &str) -> Result<(), KeyringError>
where
    K: KeyManagementClient + ?Sized,
    S: KeyringStore + ?Sized,
{
    match kms.read_key(kek_name).await? {
        Some(detail) => {
            info!(name = kek_name, versions = detail.versions.len(), "existing KEK found");
        }
        None => {
            info!(name = kek_name, "no KEK found, creating a new one");
            kms.create_key(kek_name).await?;
        }
    }

    if store.has_active().await? {
        debug!("active DEK found, skipping DEK generation");
        return Ok(());
    }

    info!("no active DEK found, creating a new one");
    let plaintext = dek::generate_dek();
    let encrypted = kms.encrypt(kek_name, &plaintext).await?;

    match store.insert_if_empty(&encrypted).await? {
        Some(id) => info!(id, "stored initial encrypted DEK"),
        None => debug!("another process created the initial DEK first"),
    }
    Ok(())
}

/// Append a fresh DEK to the keyring and return its id.
///
/// The new entry becomes the current key (largest active id). Previous
/// entries remain active so data written under them is still decryptable;
/// connections pick up the new key set as the pool recycles them.
pub async fn rotate<K, S>(kms: &K, store: &S, kek_name: &str) -> Result<i64, KeyringError>
where
    K: KeyManagementClient + ?Sized,
    S: KeyringStore + ?Sized,
{
    let plaintext = dek::generate_dek();
    let encrypted = kms.encrypt(kek_name, &plaintext).await?;
    let id = store.insert(&encrypted).await?;
    info!(id, "rotated in new DEK; previous entries remain active");
    Ok(id)
}

/// Mark a keyring entry inactive, excluding it from future injection and
/// from current-key selection. Returns `true` if the entry existed.
///
/// Only retire an entry after no column ciphertext depends on it.
pub async fn retire<S>(store: &S, id: i64) -> Result<bool, KeyringError>
where
    S: KeyringStore + ?Sized,
{
    let retired = store.set_active(id, false).await?;
    if retired {
        info!(id, "retired keyring entry");
    } else {
        debug!(id, "retire requested for unknown keyring entry");
    }
    Ok(retired)
}

#[cfg(test)]
mod tests {
    use super::store::MockKeyringStore;
    use super::*;
    use crate::kms::{InMemoryKeyManager, KeyDetail, MockKeyManagementClient};
    use crate::testutil::InMemoryKeyring;

    const KEK: &str = "colcrypt.kek";

    #[tokio::test]
    async fn bootstrap_creates_kek_when_absent() {
        let mut kms = MockKeyManagementClient::new();
        kms.expect_read_key()
            .withf(|name| name == KEK)
            .times(1)
            .returning(|_| Ok(None));
        kms.expect_create_key()
            .withf(|name| name == KEK)
            .times(1)
            .returning(|_| Ok(()));
        kms.expect_encrypt()
            .times(1)
            .returning(|_, _| Ok("ciphertext".into()));

        let mut store = MockKeyringStore::new();
        store.expect_has_active().returning(|| Ok(false));
        store
            .expect_insert_if_empty()
            .times(1)
            .returning(|_| Ok(Some(1)));

        bootstrap(&kms, &store, KEK).await.unwrap();
    }

    #[tokio::test]
    async fn bootstrap_skips_dek_when_active_entry_exists() {
        let mut kms = MockKeyManagementClient::new();
        kms.expect_read_key().returning(|name| {
            Ok(Some(KeyDetail {
                name: name.to_owned(),
                versions: vec![1, 2],
            }))
        });
        kms.expect_create_key().times(0);
        kms.expect_encrypt().times(0);

        let mut store = MockKeyringStore::new();
        store.expect_has_active().times(1).returning(|| Ok(true));
        store.expect_insert_if_empty().times(0);

        bootstrap(&kms, &store, KEK).await.unwrap();
    }

    #[tokio::test]
    async fn bootstrap_aborts_when_kms_unreachable() {
        let mut kms = MockKeyManagementClient::new();
        kms.expect_read_key()
            .returning(|_| Err(KmsError::Unavailable("connection refused".into())));

        let mut store = MockKeyringStore::new();
        store.expect_has_active().times(0);
        store.expect_insert_if_empty().times(0);

        let err = bootstrap(&kms, &store, KEK).await.unwrap_err();
        assert!(matches!(err, KeyringError::KeyManagement(_)));
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let kms = InMemoryKeyManager::new();
        let store = InMemoryKeyring::new();

        bootstrap(&kms, &store, KEK).await.unwrap();
        bootstrap(&kms, &store, KEK).await.unwrap();

        let entries = store.active_entries().await.unwrap();
        assert_eq!(entries.len(), 1, "second bootstrap must not add an entry");
    }

    #[tokio::test]
    async fn bootstrapped_dek_round_trips_through_kms() {
        let kms = InMemoryKeyManager::new();
        let store = InMemoryKeyring::new();
        bootstrap(&kms, &store, KEK).await.unwrap();

        let entries = store.active_entries().await.unwrap();
        let plaintext = kms.decrypt(KEK, &entries[0].dek).await.unwrap();
        // 16 random bytes, base64 text.
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        assert_eq!(STANDARD.decode(&plaintext).unwrap().len(), dek::DEK_LEN);
    }

    #[tokio::test]
    async fn rotate_appends_and_keeps_previous_active() {
        let kms = InMemoryKeyManager::new();
        let store = InMemoryKeyring::new();
        bootstrap(&kms, &store, KEK).await.unwrap();

        let new_id = rotate(&kms, &store, KEK).await.unwrap();
        let entries = store.active_entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.last().unwrap().id, new_id);
    }

    #[tokio::test]
    async fn retire_excludes_entry() {
        let kms = InMemoryKeyManager::new();
        let store = InMemoryKeyring::new();
        bootstrap(&kms, &store, KEK).await.unwrap();
        let old_id = store.active_entries().await.unwrap()[0].id;
        rotate(&kms, &store, KEK).await.unwrap();

        assert!(retire(&store, old_id).await.unwrap());
        let entries = store.active_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.iter().all(|e| e.id != old_id));

        // Retiring a missing id reports false.
        assert!(!retire(&store, 9999).await.unwrap());
    }
}
