//! [`SessionKeySet`]: the ephemeral, per-connection set of decrypted DEKs.

use zeroize::Zeroizing;

/// Prefix of the per-key session variable; the entry id is appended, so key
/// 7 lands in `colcrypt.dek_7`.
pub const SESSION_KEY_PREFIX: &str = "colcrypt.dek_";

/// Session variable holding the id of the current key — the one database-side
/// encryption functions must use for new writes.
pub const CURRENT_KEY_VAR: &str = "colcrypt.current_key";

/// One decrypted DEK bound for a session variable.
///
/// The plaintext is zeroized on drop and redacted from `Debug` output; it
/// must never outlive the connection it is applied to.
#[derive(Clone)]
pub struct SessionKey {
    /// Keyring entry id.
    pub id: i64,
    /// Decrypted DEK text.
    pub plaintext: Zeroizing<String>,
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("id", &self.id)
            .field("plaintext", &"[REDACTED]")
            .finish()
    }
}

/// Complete key set for one connection: every active DEK plus the current-key
/// pointer. Built fresh on each connection acquisition, never persisted.
#[derive(Debug, Clone)]
pub struct SessionKeySet {
    keys: Vec<SessionKey>,
    current_key_id: Option<i64>,
}

impl SessionKeySet {
    /// Build a key set, selecting the numerically largest id as the current
    /// key regardless of the order the keys were supplied in.
    pub fn new(keys: Vec<SessionKey>) -> Self {
        let current_key_id = keys.iter().map(|k| k.id).max();
        Self {
            keys,
            current_key_id,
        }
    }

    /// Number of keys in the set.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Id of the current key, if the set is non-empty.
    pub fn current_key_id(&self) -> Option<i64> {
        self.current_key_id
    }

    /// Parallel name/value vectors for a batched `set_config` statement: one
    /// per-key variable for each DEK, then the current-key variable.
    pub fn settings(&self) -> (Vec<String>, Vec<String>) {
        let mut names = Vec::with_capacity(self.keys.len() + 1);
        let mut values = Vec::with_capacity(self.keys.len() + 1);
        for key in &self.keys {
            names.push(format!("{SESSION_KEY_PREFIX}{}", key.id));
            values.push(key.plaintext.to_string());
        }
        if let Some(current) = self.current_key_id {
            names.push(CURRENT_KEY_VAR.to_owned());
            values.push(current.to_string());
        }
        (names, values)
    }
}
