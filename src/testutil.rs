//! Stateful in-memory fakes shared across unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::keyring::{KeyringEntry, KeyringStore, StoreError};
use crate::session::{KeySession, SessionKeySet};

#[derive(Debug, Clone)]
struct Row {
    id: i64,
    dek: String,
    active: bool,
}

/// In-memory [`KeyringStore`] with monotonically assigned ids.
#[derive(Debug, Default)]
pub struct InMemoryKeyring {
    rows: Mutex<Vec<Row>>,
}

impl InMemoryKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, dek: &str) -> i64 {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.last().map_or(1, |r| r.id + 1);
        rows.push(Row {
            id,
            dek: dek.to_owned(),
            active: true,
        });
        id
    }

    fn active(&self) -> Vec<KeyringEntry> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.active)
            .map(|r| KeyringEntry {
                id: r.id,
                dek: r.dek.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl KeyringStore for InMemoryKeyring {
    async fn has_active(&self) -> Result<bool, StoreError> {
        Ok(!self.active().is_empty())
    }

    async fn active_entries(&self) -> Result<Vec<KeyringEntry>, StoreError> {
        Ok(self.active())
    }

    async fn insert(&self, encrypted_dek: &str) -> Result<i64, StoreError> {
        Ok(self.push(encrypted_dek))
    }

    async fn insert_if_empty(&self, encrypted_dek: &str) -> Result<Option<i64>, StoreError> {
        if self.active().is_empty() {
            Ok(Some(self.push(encrypted_dek)))
        } else {
            Ok(None)
        }
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|r| r.id == id) {
            Some(row) => {
                row.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// [`KeySession`] fake that reads from an [`InMemoryKeyring`] and records the
/// applied settings instead of touching a database.
pub struct RecordingSession {
    store: std::sync::Arc<InMemoryKeyring>,
    applied: Option<Vec<(String, String)>>,
}

impl RecordingSession {
    pub fn new(store: std::sync::Arc<InMemoryKeyring>) -> Self {
        Self {
            store,
            applied: None,
        }
    }

    /// Settings applied by the last batch, if any.
    pub fn applied(&self) -> Option<&Vec<(String, String)>> {
        self.applied.as_ref()
    }
}

#[async_trait]
impl KeySession for RecordingSession {
    async fn fetch_active_entries(&mut self) -> Result<Vec<KeyringEntry>, StoreError> {
        self.store.active_entries().await
    }

    async fn apply_session_keys(&mut self, keys: &SessionKeySet) -> Result<(), StoreError> {
        let (names, values) = keys.settings();
        self.applied = Some(names.into_iter().zip(values).collect());
        Ok(())
    }
}
