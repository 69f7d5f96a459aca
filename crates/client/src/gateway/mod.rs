//! Ports to the hosted backend.
//!
//! # Architecture
//!
//! The backend is an external collaborator reached through three narrow traits:
//!
//! - [`AuthGateway`] - password sign-up/sign-in/sign-out, session and user
//!   lookup, and a push channel of [`AuthEvent`]s
//! - [`ProductGateway`] - row operations on the `products` relation
//! - [`ObjectStorage`] - photo upload, public URL resolution, removal
//!
//! Row ownership is enforced by the backend: a delete issued by someone other
//! than the owner affects zero rows. [`SupabaseGateway`] implements all three
//! over HTTP; tests substitute an in-memory backend.

mod supabase;

pub use supabase::SupabaseGateway;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pocket_catalog_core::{Credentials, NewProduct, ProductId, ProductRow, UserId};
use secrecy::SecretString;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors returned by the backend or the transport in front of it.
///
/// These are propagated to callers unchanged.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("Backend error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be parsed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl GatewayError {
    /// Status code of a backend rejection, if this is one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The authenticated user as reported by the auth backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: Option<String>,
}

/// An issued auth session.
#[derive(Clone)]
pub struct GatewaySession {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: AuthUser,
}

impl GatewaySession {
    /// Seconds of slack before expiry at which a token counts as expired.
    pub const EXPIRY_MARGIN_SECS: i64 = 60;

    /// Whether the access token is expired (or about to be).
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| {
            now >= expires_at - chrono::Duration::seconds(Self::EXPIRY_MARGIN_SECS)
        })
    }
}

impl std::fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Kind of session change pushed by the auth backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    SignedIn,
    TokenRefreshed,
    SignedOut,
}

/// A session-change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    /// User carried by the session, when the event has one.
    pub user: Option<AuthUser>,
}

impl AuthEvent {
    #[must_use]
    pub const fn signed_in(user: AuthUser) -> Self {
        Self {
            kind: AuthEventKind::SignedIn,
            user: Some(user),
        }
    }

    #[must_use]
    pub const fn token_refreshed(user: AuthUser) -> Self {
        Self {
            kind: AuthEventKind::TokenRefreshed,
            user: Some(user),
        }
    }

    #[must_use]
    pub const fn signed_out() -> Self {
        Self {
            kind: AuthEventKind::SignedOut,
            user: None,
        }
    }
}

/// Authentication operations (driven port).
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Create an account. Returns `None` when the backend requires the email
    /// to be confirmed before a session is issued.
    async fn sign_up(&self, credentials: &Credentials)
    -> Result<Option<GatewaySession>, GatewayError>;

    /// Sign in with email and password.
    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<GatewaySession, GatewayError>;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), GatewayError>;

    /// Current session, if any. May refresh an expired token.
    async fn get_session(&self) -> Result<Option<GatewaySession>, GatewayError>;

    /// Ask the backend who the current session belongs to.
    async fn get_user(&self) -> Result<Option<AuthUser>, GatewayError>;

    /// Subscribe to session-change notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Row operations on the products relation (driven port).
#[async_trait]
pub trait ProductGateway: Send + Sync {
    /// Every row visible to the caller, in backend order.
    async fn select_products(&self) -> Result<Vec<ProductRow>, GatewayError>;

    async fn insert_product(&self, product: &NewProduct) -> Result<(), GatewayError>;

    /// Owner of a single row, fetched fresh. `None` if the row is gone.
    async fn select_product_owner(&self, id: &ProductId) -> Result<Option<UserId>, GatewayError>;

    /// Delete a row. Returns how many rows the backend actually removed;
    /// zero means the row-level policy refused (or the row vanished).
    async fn delete_product(&self, id: &ProductId) -> Result<u64, GatewayError>;
}

/// Binary object storage for product photos (driven port).
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload an object and return the path it was stored under.
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, GatewayError>;

    /// Stable public URL of a stored object.
    fn public_url(&self, path: &str) -> String;

    /// Inverse of [`public_url`](Self::public_url), for objects in this store.
    fn object_path(&self, public_url: &str) -> Option<String>;

    async fn remove(&self, paths: &[String]) -> Result<(), GatewayError>;
}

/// Everything the catalog store needs from the backend.
pub trait CatalogBackend: AuthGateway + ProductGateway + ObjectStorage {}

impl<T: AuthGateway + ProductGateway + ObjectStorage + ?Sized> CatalogBackend for T {}
