//! Per-connection DEK injection.
//!
//! Every new physical connection a pool hands out passes through
//! [`ConnectionKeyInjector::on_connection_acquire`] before application
//! queries run on it. The injector reads the active keyring entries over the
//! connection itself, decrypts each DEK via the key-management service, and
//! applies the whole [`SessionKeySet`] in one batched, parameterized
//! `set_config` round trip.
//!
//! Any failure is propagated so the pool discards the connection: a
//! connection with a partial or stale key set would fail in confusing ways
//! deep inside application queries, so it is never handed out.

pub mod keys;
pub mod pg;

pub use keys::{SessionKeySet, CURRENT_KEY_VAR, SESSION_KEY_PREFIX};
pub use pg::attach_injector;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::guard::ProcessLifecycleGuard;
use crate::keyring::{KeyringEntry, StoreError};
use crate::kms::{KeyManagementClient, KmsError};
use keys::SessionKey;

/// Errors from a connection-acquire injection attempt.
///
/// Variants distinguish the failing collaborator so the pool (or its
/// operator) can tell a flaky key-management service from a broken keyring.
#[derive(Debug, Error)]
pub enum InjectError {
    /// The key-management service failed while decrypting a DEK.
    #[error("key management failure during session injection: {0}")]
    KeyManagement(#[from] KmsError),

    /// The keyring read or the session round trip failed.
    #[error("store failure during session injection: {0}")]
    Store(#[from] StoreError),

    /// The keyring holds no active entries even though bootstrap completed.
    #[error("keyring has no active entries after initialization")]
    EmptyKeyring,

    /// A collaborator exceeded its deadline.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

/// The session-variable surface of one acquired connection.
///
/// Split out as a trait so the injector can be exercised against a recorded
/// session in tests; the production implementation lives on
/// [`sqlx::PgConnection`] (see [`pg`]).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeySession: Send {
    /// Read all active keyring entries, ordered by id ascending, over this
    /// connection.
    async fn fetch_active_entries(&mut self) -> Result<Vec<KeyringEntry>, StoreError>;

    /// Apply every setting of `keys` to this connection's session, in one
    /// batched statement. Partial application must surface as an error.
    async fn apply_session_keys(&mut self, keys: &SessionKeySet) -> Result<(), StoreError>;
}

/// Injects decrypted DEKs into each newly acquired connection's session.
///
/// Holds no mutable state of its own; safe to share across concurrent
/// connection acquisitions.
pub struct ConnectionKeyInjector<K> {
    kms: Arc<K>,
    guard: Arc<ProcessLifecycleGuard>,
    kek_name: String,
    kms_timeout: Duration,
    db_timeout: Duration,
}

impl<K: KeyManagementClient> ConnectionKeyInjector<K> {
    /// Create an injector gated by `guard`, decrypting under `kek_name`.
    pub fn new(
        kms: Arc<K>,
        guard: Arc<ProcessLifecycleGuard>,
        kek_name: impl Into<String>,
        kms_timeout: Duration,
        db_timeout: Duration,
    ) -> Self {
        Self {
            kms,
            guard,
            kek_name: kek_name.into(),
            kms_timeout,
            db_timeout,
        }
    }

    /// Inject all active DEKs plus the current-key pointer into `session`.
    ///
    /// Before bootstrap completes this is a deliberate no-op: the connection
    /// proceeds without session keys rather than racing the keyring (narrow
    /// startup window only; [`crate::Keyring::init`] sequences bootstrap
    /// before the pool exists, so the window never opens there).
    ///
    /// # Errors
    ///
    /// After initialization, every failure propagates — including an empty
    /// keyring — so the caller can discard the connection.
    pub async fn on_connection_acquire<S>(&self, session: &mut S) -> Result<(), InjectError>
    where
        S: KeySession,
    {
        if !self.guard.is_initialized() {
            trace!("skipping session key injection, keyring not initialized yet");
            return Ok(());
        }

        let entries = tokio::time::timeout(self.db_timeout, session.fetch_active_entries())
            .await
            .map_err(|_| InjectError::Timeout("keyring read"))??;
        if entries.is_empty() {
            return Err(InjectError::EmptyKeyring);
        }

        let keys = self.decrypt_all(&entries).await?;

        tokio::time::timeout(self.db_timeout, session.apply_session_keys(&keys))
            .await
            .map_err(|_| InjectError::Timeout("session variable batch"))??;

        debug!(
            count = keys.len(),
            current_key_id = keys.current_key_id(),
            "injected session DEKs"
        );
        Ok(())
    }

    /// Decrypt each entry's DEK under the KEK and assemble the key set.
    async fn decrypt_all(&self, entries: &[KeyringEntry]) -> Result<SessionKeySet, InjectError> {
        let mut keys = Vec::with_capacity(entries.len());
        for entry in entries {
            let plaintext =
                tokio::time::timeout(self.kms_timeout, self.kms.decrypt(&self.kek_name, &entry.dek))
                    .await
                    .map_err(|_| InjectError::Timeout("key management decrypt"))??;
            keys.push(SessionKey {
                id: entry.id,
                plaintext: Zeroizing::new(plaintext),
            });
        }
        Ok(SessionKeySet::new(keys))
    }
}
