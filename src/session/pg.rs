//! Postgres implementation of [`KeySession`] and the pool hook.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgConnection;

use super::{ConnectionKeyInjector, KeySession, SessionKeySet};
use crate::keyring::{KeyringEntry, StoreError};
use crate::kms::KeyManagementClient;

#[async_trait]
impl KeySession for PgConnection {
    async fn fetch_active_entries(&mut self) -> Result<Vec<KeyringEntry>, StoreError> {
        let entries = sqlx::query_as::<_, KeyringEntry>(
            "SELECT id, dek FROM colcrypt_keyring WHERE active = TRUE ORDER BY id ASC",
        )
        .fetch_all(&mut *self)
        .await?;
        Ok(entries)
    }

    async fn apply_session_keys(&mut self, keys: &SessionKeySet) -> Result<(), StoreError> {
        let (names, values) = keys.settings();
        // One parameterized round trip for the whole batch. `is_local = false`
        // outside a transaction gives the setting session scope.
        sqlx::query(
            "SELECT set_config(s.name, s.value, false) \
             FROM unnest($1::text[], $2::text[]) AS s(name, value)",
        )
        .bind(names)
        .bind(values)
        .execute(&mut *self)
        .await?;
        Ok(())
    }
}

/// Register `injector` as an `after_connect` hook on `options`.
///
/// The hook runs once per new physical connection, before the pool hands it
/// out. Injection failures are surfaced as [`sqlx::Error::Configuration`],
/// which makes the pool treat the connection as unusable instead of handing
/// out a half-keyed session.
pub fn attach_injector<K>(
    options: PgPoolOptions,
    injector: Arc<ConnectionKeyInjector<K>>,
) -> PgPoolOptions
where
    K: KeyManagementClient + 'static,
{
    options.after_connect(move |conn, _meta| {
        let injector = Arc::clone(&injector);
        Box::pin(async move {
            injector
                .on_connection_acquire(conn)
                .await
                .map_err(|e| sqlx::Error::Configuration(Box::new(e)))
        })
    })
}
