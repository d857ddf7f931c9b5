//! Persisted session models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity record as issued by the backend.
///
/// Field names follow the backend's JSON, which mixes conventions
/// (`first_name` but `companyName`); the renames below pin that down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: String,
    /// Email address
    pub email: String,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// Avatar URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Role label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Company name
    #[serde(default, rename = "companyName", skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    /// Phone number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// When the account was created
    #[serde(default, rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Merge a partial profile update into this record.
    /// Absent fields keep their current values.
    pub fn apply(&mut self, update: UserUpdate) {
        if let Some(first_name) = update.first_name {
            self.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            self.last_name = last_name;
        }
        if let Some(avatar) = update.avatar {
            self.avatar = Some(avatar);
        }
        if let Some(role) = update.role {
            self.role = Some(role);
        }
        if let Some(company_name) = update.company_name {
            self.company_name = Some(company_name);
        }
        if let Some(phone) = update.phone {
            self.phone = Some(phone);
        }
    }
}

/// Partial profile update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar: Option<String>,
    pub role: Option<String>,
    pub company_name: Option<String>,
    pub phone: Option<String>,
}

/// Access/refresh token pair.
///
/// Tokens are only ever stored together; an access token without a
/// refresh token (or vice versa) is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived token authorizing API calls
    pub access_token: String,
    /// Long-lived token used solely to obtain a new access token
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// A complete persisted session as read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSession {
    pub user: User,
    pub tokens: TokenPair,
}
