//! Wire types for the Supabase auth, REST and storage endpoints.

use chrono::{DateTime, Utc};
use pocket_catalog_core::UserId;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::gateway::{AuthUser, GatewaySession};

/// Body of `POST /auth/v1/signup` and `POST /auth/v1/token?grant_type=password`.
#[derive(Debug, Serialize)]
pub(super) struct PasswordRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Body of `POST /auth/v1/token?grant_type=refresh_token`.
#[derive(Debug, Serialize)]
pub(super) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// User object returned by the auth endpoints.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct UserResponse {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<UserResponse> for AuthUser {
    fn from(user: UserResponse) -> Self {
        Self {
            id: UserId::from(user.id),
            email: user.email,
        }
    }
}

/// Token grant response.
#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Unix timestamp; preferred over `expires_in` when present.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: UserResponse,
}

impl TokenResponse {
    pub fn into_session(self, now: DateTime<Utc>) -> GatewaySession {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| now + chrono::Duration::seconds(secs))
            });

        GatewaySession {
            access_token: SecretString::from(self.access_token),
            refresh_token: self.refresh_token.map(SecretString::from),
            expires_at,
            user: self.user.into(),
        }
    }
}

/// Sign-up response: a full token grant when the project auto-confirms
/// accounts, or a bare user object when email confirmation is pending.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum SignUpResponse {
    Session(TokenResponse),
    PendingConfirmation(UserResponse),
}

/// Error body shapes used across auth, PostgREST and storage.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    /// Most specific message available, falling back to the raw body.
    pub fn message(self, raw: &str) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or_else(|| raw.chars().take(200).collect())
    }
}

/// Projection used for the fresh owner check before a delete.
#[derive(Debug, Deserialize)]
pub(super) struct OwnerRow {
    pub owner_id: String,
}

/// Response of a storage upload.
#[derive(Debug, Deserialize)]
pub(super) struct UploadResponse {
    #[serde(rename = "Key", default)]
    pub key: Option<String>,
}

/// Body of a storage bulk delete.
#[derive(Debug, Serialize)]
pub(super) struct RemoveObjectsRequest<'a> {
    pub prefixes: &'a [String],
}
