//! Session error types.

use thiserror::Error;

/// Error type for session operations.
///
/// Variants that carry a server- or client-supplied message (`Validation`,
/// `InvalidCredentials`) display the message bare, because it is what gets
/// recorded on the session and shown to the user.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Client-side validation failed; no network call was made.
    #[error("{0}")]
    Validation(String),

    /// The server rejected the submitted credentials or signup fields.
    #[error("{0}")]
    InvalidCredentials(String),

    /// A 2xx response body was missing required fields.
    #[error("Invalid response from server")]
    MalformedResponse,

    /// The server rejected the refresh token. Fatal for the session.
    #[error("Refresh token rejected")]
    RefreshRejected,

    /// No session is present.
    #[error("Not logged in")]
    NoSession,

    /// The session could not be refreshed and has been torn down.
    #[error("Session expired")]
    SessionExpired,

    /// Invalid transition in the session state machine.
    #[error("Invalid session transition: {0}")]
    InvalidTransition(String),

    /// The operation completed after a teardown and its result was discarded.
    #[error("Superseded by logout")]
    Superseded,

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] ezi_storage::StorageError),

    /// Transport-level error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
