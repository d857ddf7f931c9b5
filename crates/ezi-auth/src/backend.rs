//! HTTP client for the identity backend.
//!
//! Stateless request functions, one round trip each. Every operation maps
//! HTTP outcomes to a typed result; nothing here touches session state or
//! storage.

use crate::error::{AuthError, AuthResult};
use ezi_storage::{TokenPair, User};
use serde::{Deserialize, Serialize};

/// Client for the `/auth` endpoints of the identity backend.
#[derive(Clone)]
pub struct AuthBackend {
    http_client: reqwest::Client,
    base_url: String,
}

/// A successful login or signup: the user record plus a complete token pair.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub user: User,
    pub tokens: TokenPair,
}

/// A successful refresh. The server may rotate only the access token, in
/// which case `refresh_token` is absent and the caller keeps its current one.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Liveness of the current access token as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Expired,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignupRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// The backend wraps every success payload in `{"data": ...}`.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    data: T,
}

/// Grant payload with every field optional: a 2xx body is not trusted to be
/// complete until checked field by field.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantData {
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshData {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl GrantData {
    fn into_grant(self) -> AuthResult<SessionGrant> {
        match (self.user, self.access_token, self.refresh_token) {
            (Some(user), Some(access), Some(refresh)) => Ok(SessionGrant {
                user,
                tokens: TokenPair::new(access, refresh),
            }),
            _ => Err(AuthError::MalformedResponse),
        }
    }
}

/// Pull the server's `{message}` out of an error body, falling back to a
/// generic message when the body has nothing usable.
fn server_message(body: &str, fallback: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| fallback.to_string())
}

impl AuthBackend {
    /// Create a new backend client.
    ///
    /// # Arguments
    /// * `base_url` - The backend base URL (e.g., `https://api.ezi.app`)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build the URL for an `/auth` endpoint.
    fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/{}", self.base_url, endpoint)
    }

    /// Exchange credentials for a session grant.
    ///
    /// Non-2xx responses become `InvalidCredentials`, carrying the server's
    /// message when it sent one.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<SessionGrant> {
        let url = self.auth_url("login");

        tracing::debug!(url = %url, email = %email, "Attempting login");

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Login rejected by server");
            return Err(AuthError::InvalidCredentials(server_message(
                &body,
                "Login failed",
            )));
        }

        let envelope: ApiEnvelope<GrantData> = response.json().await?;
        envelope.data.into_grant()
    }

    /// Register a new account and receive a session grant.
    pub async fn signup(&self, name: &str, email: &str, password: &str) -> AuthResult<SessionGrant> {
        let url = self.auth_url("register");

        tracing::debug!(url = %url, email = %email, "Attempting signup");

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&SignupRequest {
                name,
                email,
                password,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Signup rejected by server");
            return Err(AuthError::InvalidCredentials(server_message(
                &body,
                "Signup failed",
            )));
        }

        let envelope: ApiEnvelope<GrantData> = response.json().await?;
        envelope.data.into_grant()
    }

    /// Exchange the refresh token for new tokens.
    ///
    /// Any non-2xx response is `RefreshRejected`, the signal that forces a
    /// full logout upstream.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshedTokens> {
        let url = self.auth_url("refresh");

        tracing::debug!(url = %url, "Refreshing access token");

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(status = %status, "Token refresh rejected by server");
            return Err(AuthError::RefreshRejected);
        }

        let envelope: ApiEnvelope<RefreshData> = response.json().await?;
        match envelope.data.access_token {
            Some(access_token) => Ok(RefreshedTokens {
                access_token,
                refresh_token: envelope.data.refresh_token,
            }),
            None => Err(AuthError::MalformedResponse),
        }
    }

    /// Invalidate the session server-side.
    ///
    /// A non-2xx response is logged and ignored; local teardown has already
    /// happened by the time this is called. Only transport failures surface.
    pub async fn logout(&self, access_token: &str) -> AuthResult<()> {
        let url = self.auth_url("logout");

        tracing::debug!(url = %url, "Notifying server of logout");

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(status = %status, "Server-side logout returned an error");
            // Don't fail on logout errors
        }

        Ok(())
    }

    /// Ask the backend whether the access token is still accepted.
    ///
    /// A non-2xx response means the token is no longer valid, not a hard
    /// error; only transport failures surface as `Err`.
    pub async fn ping(&self, access_token: &str) -> AuthResult<Liveness> {
        let url = self.auth_url("ping");

        tracing::debug!(url = %url, "Checking session liveness");

        let response = self
            .http_client
            .get(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(Liveness::Alive)
        } else {
            tracing::debug!(status = %response.status(), "Access token no longer valid");
            Ok(Liveness::Expired)
        }
    }
}
