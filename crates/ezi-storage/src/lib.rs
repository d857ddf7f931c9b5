//! Credential storage for the ezi session core.
//!
//! Persists the session triplet (user record, access token, refresh token)
//! behind a uniform trait:
//! - **FileStorage**: JSON file under the app data dir, atomic writes
//! - **MemoryStorage**: process-local fallback, also the test double

mod credentials;
mod file;
mod keys;
mod memory;
mod models;
mod traits;

pub use credentials::CredentialStore;
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use models::{PersistedSession, TokenPair, User, UserUpdate};
pub use traits::CredentialStorage;

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Platform(String),

    /// Key not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default storage backend for the given credentials file.
///
/// Falls back to in-memory storage when the durable location is unusable;
/// the session then works normally but does not survive a restart.
pub fn create_storage(credentials_file: &Path) -> Box<dyn CredentialStorage> {
    match FileStorage::new(credentials_file) {
        Ok(storage) => Box::new(storage),
        Err(e) => {
            tracing::warn!(
                path = %credentials_file.display(),
                "Durable credential storage unavailable, falling back to memory: {}",
                e
            );
            Box::new(MemoryStorage::new())
        }
    }
}

/// Create a CredentialStore over the default backend.
pub fn create_credential_store(credentials_file: &Path) -> CredentialStore {
    CredentialStore::new(create_storage(credentials_file))
}
