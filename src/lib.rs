//! `colcrypt` — transparent Postgres column-encryption key management.
//!
//! Implements the envelope key scheme for database-side column encryption: a
//! long-lived KEK held by an external key-management service and short-lived
//! DEKs generated here, encrypted under the KEK, and persisted in the
//! `colcrypt_keyring` table. Plaintext DEKs never touch durable storage;
//! they are decrypted per connection and injected as session-scoped settings
//! (`colcrypt.dek_<id>`, `colcrypt.current_key`) that database-side
//! encrypt/decrypt functions read.
//!
//! # Startup sequence ([`Keyring::init`])
//!
//! 1. Open a dedicated bootstrap connection and ensure the keyring schema.
//! 2. Run [`keyring::bootstrap`]: ensure the KEK exists in the
//!    key-management service and that at least one active encrypted DEK is
//!    persisted. Idempotent, and guarded against concurrent processes by an
//!    advisory lock.
//! 3. Flip the [`ProcessLifecycleGuard`] and only then build the application
//!    pool, whose `after_connect` hook decrypts every active DEK and applies
//!    the whole set to the new connection's session in one batched statement.
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = colcrypt::Config::from_env()?;
//! let kms = Arc::new(colcrypt::kms::InMemoryKeyManager::new());
//! let keyring = colcrypt::Keyring::init(&cfg, kms).await?;
//!
//! // Every connection this pool hands out already carries the session DEKs,
//! // so database-side encryption functions work transparently.
//! sqlx::query("INSERT INTO people (ssn) VALUES (col_encrypt($1))")
//!     .bind("123-45-6789")
//!     .execute(keyring.pool())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod guard;
pub mod keyring;
pub mod kms;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::Config;
pub use error::Error;
pub use guard::ProcessLifecycleGuard;
pub use kms::KeyManagementClient;
pub use session::ConnectionKeyInjector;

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use keyring::{KeyringError, PgKeyringStore};

/// Bootstrapped keyring plus the injected connection pool.
///
/// The handle owns the pool whose connections carry session DEKs, and exposes
/// the rotation operations that append to the keyring.
pub struct Keyring<K> {
    pool: PgPool,
    store: PgKeyringStore,
    kms: Arc<K>,
    kek_name: String,
}

impl<K: KeyManagementClient + 'static> Keyring<K> {
    /// Bootstrap the keyring and build the injected connection pool.
    ///
    /// Bootstrap runs on a dedicated connection before the application pool
    /// exists, so no connection can ever observe a partially initialized
    /// keyring through this entry point.
    ///
    /// # Errors
    ///
    /// Any failure — invalid config, unreachable key-management service,
    /// database error — aborts initialization; treat it as fatal for startup.
    pub async fn init(cfg: &Config, kms: Arc<K>) -> Result<Self, Error> {
        // `Config::from_env` validates, but configs can also be hand-built.
        cfg.validate()?;

        let bootstrap_pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&cfg.database_url)
            .await?;
        let bootstrap_store = PgKeyringStore::new(bootstrap_pool.clone());
        bootstrap_store
            .ensure_schema()
            .await
            .map_err(KeyringError::from)?;
        keyring::bootstrap(kms.as_ref(), &bootstrap_store, &cfg.kek_name).await?;
        bootstrap_pool.close().await;

        let guard = Arc::new(ProcessLifecycleGuard::new());
        guard.mark_initialized();

        let injector = Arc::new(ConnectionKeyInjector::new(
            Arc::clone(&kms),
            guard,
            cfg.kek_name.clone(),
            Duration::from_secs(cfg.kms_timeout_secs),
            Duration::from_secs(cfg.db_timeout_secs),
        ));
        let options = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs));
        let pool = session::attach_injector(options, injector)
            .connect(&cfg.database_url)
            .await?;

        info!(kek_name = %cfg.kek_name, "keyring initialized, pool ready");

        let store = PgKeyringStore::new(pool.clone());
        Ok(Self {
            pool,
            store,
            kms,
            kek_name: cfg.kek_name.clone(),
        })
    }

    /// The connection pool whose sessions carry the decrypted DEKs.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Append a fresh DEK; see [`keyring::rotate`].
    pub async fn rotate(&self) -> Result<i64, KeyringError> {
        keyring::rotate(self.kms.as_ref(), &self.store, &self.kek_name).await
    }

    /// Mark a keyring entry inactive; see [`keyring::retire`].
    pub async fn retire(&self, id: i64) -> Result<bool, KeyringError> {
        keyring::retire(&self.store, id).await
    }
}
