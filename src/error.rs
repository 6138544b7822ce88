//! Top-level error type for crate entry points.

use thiserror::Error;

use crate::config::ConfigError;
use crate::keyring::KeyringError;

/// Errors from [`Keyring::init`](crate::Keyring::init) and related wiring.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration was missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Keyring bootstrap failed; the process should not start.
    #[error("keyring bootstrap failed: {0}")]
    Bootstrap(#[from] KeyringError),

    /// The database pool could not be set up.
    #[error("database setup failed: {0}")]
    Database(#[from] sqlx::Error),
}
