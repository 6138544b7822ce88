//! Durable keyring of encrypted DEK records.
//!
//! The keyring is append-mostly: bootstrap and rotation insert rows, retiring
//! a key flips `active` to false. The encrypted DEK text is never mutated in
//! place, so every row stays decryptable under the master key for as long as
//! it exists.

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

// Advisory lock key serialising the existence-check-then-insert sequence in
// `insert_if_empty` across concurrently bootstrapping processes.
// Spells "colcrypt" as big-endian ASCII.
const BOOTSTRAP_LOCK_KEY: i64 = 0x636f_6c63_7279_7074;

/// Errors from the keyring store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database query failed.
    #[error("keyring store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// One persisted keyring row, projected for injection: the row id and the
/// service-encrypted DEK text. Only active rows are ever fetched.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct KeyringEntry {
    /// Monotonically assigned row id; doubles as the session-variable
    /// namespace key and, for the largest active id, the current-key marker.
    pub id: i64,
    /// Ciphertext of the DEK under the master key. Opaque to this crate.
    pub dek: String,
}

/// Query surface over the durable keyring.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyringStore: Send + Sync {
    /// Does at least one active entry exist?
    async fn has_active(&self) -> Result<bool, StoreError>;

    /// All active entries, ordered by `id` ascending.
    async fn active_entries(&self) -> Result<Vec<KeyringEntry>, StoreError>;

    /// Append a new active entry, returning its assigned id.
    async fn insert(&self, encrypted_dek: &str) -> Result<i64, StoreError>;

    /// Append a new active entry only if no active entry exists, atomically.
    ///
    /// Returns `Some(id)` if the insert happened, `None` if another entry was
    /// already active (e.g. a concurrently bootstrapping process won).
    async fn insert_if_empty(&self, encrypted_dek: &str) -> Result<Option<i64>, StoreError>;

    /// Flip an entry's `active` flag. Returns `true` if a row was updated.
    async fn set_active(&self, id: i64, active: bool) -> Result<bool, StoreError>;
}

/// Postgres-backed [`KeyringStore`] over a connection pool.
#[derive(Debug, Clone)]
pub struct PgKeyringStore {
    pool: PgPool,
}

impl PgKeyringStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the keyring table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS colcrypt_keyring ( \
                 id BIGSERIAL PRIMARY KEY, \
                 dek TEXT NOT NULL, \
                 active BOOLEAN NOT NULL DEFAULT TRUE \
             )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl KeyringStore for PgKeyringStore {
    async fn has_active(&self) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM colcrypt_keyring WHERE active = TRUE)")
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn active_entries(&self) -> Result<Vec<KeyringEntry>, StoreError> {
        let entries = sqlx::query_as::<_, KeyringEntry>(
            "SELECT id, dek FROM colcrypt_keyring WHERE active = TRUE ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn insert(&self, encrypted_dek: &str) -> Result<i64, StoreError> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO colcrypt_keyring (dek) VALUES ($1) RETURNING id")
                .bind(encrypted_dek)
                .fetch_one(&self.pool)
                .await?;
        Ok(id)
    }

    async fn insert_if_empty(&self, encrypted_dek: &str) -> Result<Option<i64>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Held until commit/rollback; serialises concurrent bootstraps.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(BOOTSTRAP_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM colcrypt_keyring WHERE active = TRUE)")
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            tx.rollback().await?;
            return Ok(None);
        }

        let id: i64 =
            sqlx::query_scalar("INSERT INTO colcrypt_keyring (dek) VALUES ($1) RETURNING id")
                .bind(encrypted_dek)
                .fetch_one(&mut *tx)
                .await?;
        tx.commit().await?;
        Ok(Some(id))
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE colcrypt_keyring SET active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
