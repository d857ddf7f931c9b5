//! High-level API for the persisted session triplet.

use crate::{CredentialStorage, PersistedSession, StorageKeys, StorageResult, TokenPair, User};

/// Typed access to the three session keys. Callers never touch raw keys.
pub struct CredentialStore {
    storage: Box<dyn CredentialStorage>,
}

impl CredentialStore {
    /// Create a new credential store with the given storage backend
    pub fn new(storage: Box<dyn CredentialStorage>) -> Self {
        Self { storage }
    }

    // ==========================================
    // User record
    // ==========================================

    /// Store the user record as JSON under the `user` key
    pub fn set_user(&self, user: &User) -> StorageResult<()> {
        let json = serde_json::to_string(user)
            .map_err(|e| crate::StorageError::Encoding(e.to_string()))?;
        self.storage.set(StorageKeys::USER, &json)
    }

    /// Retrieve the stored user record
    pub fn get_user(&self) -> StorageResult<Option<User>> {
        match self.storage.get(StorageKeys::USER)? {
            Some(json) => {
                let user: User = serde_json::from_str(&json)
                    .map_err(|e| crate::StorageError::Encoding(e.to_string()))?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    // ==========================================
    // Tokens
    // ==========================================

    /// Retrieve the stored access token
    pub fn get_access_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::ACCESS_TOKEN)
    }

    /// Retrieve the stored refresh token
    pub fn get_refresh_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::REFRESH_TOKEN)
    }

    /// Store both tokens. Tokens are only ever written as a pair.
    pub fn set_tokens(&self, tokens: &TokenPair) -> StorageResult<()> {
        self.storage
            .set(StorageKeys::ACCESS_TOKEN, &tokens.access_token)?;
        self.storage
            .set(StorageKeys::REFRESH_TOKEN, &tokens.refresh_token)
    }

    // ==========================================
    // Whole session
    // ==========================================

    /// Store a complete session (user record + token pair)
    pub fn set_session(&self, user: &User, tokens: &TokenPair) -> StorageResult<()> {
        self.set_user(user)?;
        self.set_tokens(tokens)
    }

    /// Read the complete session back, or None if any key is missing.
    pub fn load_session(&self) -> StorageResult<Option<PersistedSession>> {
        let user = match self.get_user()? {
            Some(user) => user,
            None => return Ok(None),
        };
        let access_token = match self.get_access_token()? {
            Some(token) => token,
            None => return Ok(None),
        };
        let refresh_token = match self.get_refresh_token()? {
            Some(token) => token,
            None => return Ok(None),
        };

        Ok(Some(PersistedSession {
            user,
            tokens: TokenPair {
                access_token,
                refresh_token,
            },
        }))
    }

    /// Check whether all three session keys are present
    pub fn has_session(&self) -> StorageResult<bool> {
        let has_user = self.storage.has(StorageKeys::USER)?;
        let has_access = self.storage.has(StorageKeys::ACCESS_TOKEN)?;
        let has_refresh = self.storage.has(StorageKeys::REFRESH_TOKEN)?;
        Ok(has_user && has_access && has_refresh)
    }

    /// Clear the session. Best-effort: individual delete failures are ignored
    /// so teardown can never be blocked by storage.
    pub fn clear_session(&self) {
        for key in StorageKeys::SESSION_KEYS {
            let _ = self.storage.delete(key);
        }
    }
}
