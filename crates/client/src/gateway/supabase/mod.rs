//! Supabase implementation of the gateway ports.
//!
//! Talks to three services of a Supabase project over plain HTTP with `reqwest`:
//!
//! - GoTrue (`/auth/v1`) for password auth and user lookup
//! - PostgREST (`/rest/v1`) for the products relation
//! - Storage (`/storage/v1`) for product photos
//!
//! The issued session is held in memory only. Session changes are fanned out
//! on a `broadcast` channel, mirroring the `onAuthStateChange` contract.

mod types;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pocket_catalog_core::{Credentials, NewProduct, ProductId, ProductRow, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info, instrument, warn};

use crate::config::SupabaseConfig;
use crate::gateway::{
    AuthEvent, AuthGateway, AuthUser, GatewayError, GatewaySession, ObjectStorage,
    ProductGateway,
};

use types::{
    ErrorBody, OwnerRow, PasswordRequest, RefreshRequest, RemoveObjectsRequest, SignUpResponse,
    TokenResponse, UploadResponse, UserResponse,
};

/// Buffered session-change events per subscriber before it starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// SupabaseGateway
// =============================================================================

/// Client for a Supabase project.
///
/// Cheaply cloneable; clones share the HTTP pool, the in-memory session and
/// the event channel.
#[derive(Clone)]
pub struct SupabaseGateway {
    inner: Arc<SupabaseGatewayInner>,
}

struct SupabaseGatewayInner {
    http: reqwest::Client,
    base_url: String,
    anon_key: SecretString,
    table: String,
    bucket: String,
    session: RwLock<Option<GatewaySession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseGateway {
    /// Create a new client from configuration.
    #[must_use]
    pub fn new(config: &SupabaseConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(SupabaseGatewayInner {
                http: reqwest::Client::new(),
                base_url: config.url.trim_end_matches('/').to_string(),
                anon_key: config.anon_key.clone(),
                table: config.products_table.clone(),
                bucket: config.image_bucket.clone(),
                session: RwLock::new(None),
                events,
            }),
        }
    }

    // =========================================================================
    // URL building
    // =========================================================================

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.inner.base_url)
    }

    fn rest_url(&self) -> String {
        format!("{}/rest/v1/{}", self.inner.base_url, self.inner.table)
    }

    fn row_filter_url(&self, select: Option<&str>, id: &ProductId) -> String {
        let id = encode(id.as_str());
        match select {
            Some(columns) => format!("{}?select={columns}&id=eq.{id}", self.rest_url()),
            None => format!("{}?id=eq.{id}", self.rest_url()),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.inner.base_url, self.inner.bucket, path
        )
    }

    fn public_prefix(&self) -> String {
        format!(
            "{}/storage/v1/object/public/{}/",
            self.inner.base_url, self.inner.bucket
        )
    }

    // =========================================================================
    // Session bookkeeping
    // =========================================================================

    async fn store_session(&self, session: GatewaySession, event: AuthEvent) {
        *self.inner.session.write().await = Some(session);
        self.emit(event);
    }

    async fn clear_session(&self) {
        *self.inner.session.write().await = None;
        self.emit(AuthEvent::signed_out());
    }

    fn emit(&self, event: AuthEvent) {
        debug!(kind = ?event.kind, "Auth state change");
        // No receivers is fine: nobody is listening yet.
        let _ = self.inner.events.send(event);
    }

    /// Bearer token for data and storage requests: the user's access token
    /// when signed in, the anon key otherwise.
    async fn bearer(&self) -> Result<String, GatewayError> {
        Ok(match self.get_session().await? {
            Some(session) => session.access_token.expose_secret().to_string(),
            None => self.inner.anon_key.expose_secret().to_string(),
        })
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<Option<GatewaySession>, GatewayError> {
        let response = self
            .inner
            .http
            .post(self.auth_url("token?grant_type=refresh_token"))
            .header("apikey", self.inner.anon_key.expose_secret())
            .json(&RefreshRequest {
                refresh_token: refresh_token.expose_secret(),
            })
            .send()
            .await?;

        match check(response).await {
            Ok(response) => {
                let token: TokenResponse = parse(response).await?;
                let session = token.into_session(Utc::now());
                info!(user_id = %session.user.id, "Session refreshed");
                self.store_session(
                    session.clone(),
                    AuthEvent::token_refreshed(session.user.clone()),
                )
                .await;
                Ok(Some(session))
            }
            // The refresh token was revoked or already used; the session is over.
            Err(GatewayError::Api { status, message }) if status < 500 => {
                warn!(status, %message, "Refresh token rejected, signing out locally");
                self.clear_session().await;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn with_keys(&self, request: reqwest::RequestBuilder, bearer: &str) -> reqwest::RequestBuilder {
        request
            .header("apikey", self.inner.anon_key.expose_secret())
            .header("Authorization", format!("Bearer {bearer}"))
    }
}

impl std::fmt::Debug for SupabaseGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseGateway")
            .field("base_url", &self.inner.base_url)
            .field("table", &self.inner.table)
            .field("bucket", &self.inner.bucket)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Auth
// =============================================================================

#[async_trait]
impl AuthGateway for SupabaseGateway {
    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    async fn sign_up(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<GatewaySession>, GatewayError> {
        let response = self
            .inner
            .http
            .post(self.auth_url("signup"))
            .header("apikey", self.inner.anon_key.expose_secret())
            .json(&PasswordRequest {
                email: credentials.email().as_str(),
                password: credentials.password(),
            })
            .send()
            .await?;

        match parse::<SignUpResponse>(check(response).await?).await? {
            SignUpResponse::Session(token) => {
                let session = token.into_session(Utc::now());
                info!(user_id = %session.user.id, "Account created and signed in");
                self.store_session(session.clone(), AuthEvent::signed_in(session.user.clone()))
                    .await;
                Ok(Some(session))
            }
            SignUpResponse::PendingConfirmation(user) => {
                info!(user_id = %user.id, "Account created, awaiting email confirmation");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<GatewaySession, GatewayError> {
        let response = self
            .inner
            .http
            .post(self.auth_url("token?grant_type=password"))
            .header("apikey", self.inner.anon_key.expose_secret())
            .json(&PasswordRequest {
                email: credentials.email().as_str(),
                password: credentials.password(),
            })
            .send()
            .await?;

        let token: TokenResponse = parse(check(response).await?).await?;
        let session = token.into_session(Utc::now());
        info!(user_id = %session.user.id, "Signed in");

        self.store_session(session.clone(), AuthEvent::signed_in(session.user.clone()))
            .await;
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), GatewayError> {
        let current = self.inner.session.read().await.clone();

        if let Some(session) = current {
            let request = self.with_keys(
                self.inner.http.post(self.auth_url("logout")),
                session.access_token.expose_secret(),
            );
            match check(request.send().await?).await {
                Ok(_) => {}
                // Session already gone server-side: finish signing out locally.
                Err(GatewayError::Api { status: 401 | 403 | 404, .. }) => {
                    debug!("Session already invalid on the server");
                }
                Err(err) => return Err(err),
            }
        }

        info!("Signed out");
        self.clear_session().await;
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<GatewaySession>, GatewayError> {
        let current = self.inner.session.read().await.clone();

        match current {
            Some(session) if session.is_expired(Utc::now()) => match &session.refresh_token {
                Some(refresh_token) => self.refresh(refresh_token).await,
                None => {
                    warn!(user_id = %session.user.id, "Session expired without a refresh token");
                    self.clear_session().await;
                    Ok(None)
                }
            },
            other => Ok(other),
        }
    }

    #[instrument(skip(self))]
    async fn get_user(&self) -> Result<Option<AuthUser>, GatewayError> {
        let Some(session) = self.get_session().await? else {
            return Ok(None);
        };

        let request = self.with_keys(
            self.inner.http.get(self.auth_url("user")),
            session.access_token.expose_secret(),
        );

        match check(request.send().await?).await {
            Ok(response) => {
                let user: UserResponse = parse(response).await?;
                Ok(Some(user.into()))
            }
            Err(GatewayError::Api { status: 401 | 403, .. }) => {
                warn!(user_id = %session.user.id, "Server rejected session");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}

// =============================================================================
// Products
// =============================================================================

#[async_trait]
impl ProductGateway for SupabaseGateway {
    #[instrument(skip(self))]
    async fn select_products(&self) -> Result<Vec<ProductRow>, GatewayError> {
        let bearer = self.bearer().await?;
        let request = self.with_keys(
            self.inner.http.get(format!("{}?select=*", self.rest_url())),
            &bearer,
        );

        let rows: Vec<ProductRow> = parse(check(request.send().await?).await?).await?;
        debug!(count = rows.len(), "Fetched products");
        Ok(rows)
    }

    #[instrument(skip(self, product), fields(owner_id = %product.owner_id))]
    async fn insert_product(&self, product: &NewProduct) -> Result<(), GatewayError> {
        let bearer = self.bearer().await?;
        let request = self
            .with_keys(self.inner.http.post(self.rest_url()), &bearer)
            .header("Prefer", "return=minimal")
            .json(product);

        check(request.send().await?).await?;
        debug!("Product inserted");
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn select_product_owner(&self, id: &ProductId) -> Result<Option<UserId>, GatewayError> {
        let bearer = self.bearer().await?;
        let request = self.with_keys(
            self.inner
                .http
                .get(self.row_filter_url(Some("owner_id"), id)),
            &bearer,
        );

        let rows: Vec<OwnerRow> = parse(check(request.send().await?).await?).await?;
        Ok(rows.into_iter().next().map(|row| UserId::from(row.owner_id)))
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn delete_product(&self, id: &ProductId) -> Result<u64, GatewayError> {
        let bearer = self.bearer().await?;
        let request = self
            .with_keys(self.inner.http.delete(self.row_filter_url(None, id)), &bearer)
            .header("Prefer", "return=representation");

        let deleted: Vec<serde_json::Value> = parse(check(request.send().await?).await?).await?;
        debug!(count = deleted.len(), "Delete acknowledged");
        Ok(deleted.len() as u64)
    }
}

// =============================================================================
// Storage
// =============================================================================

#[async_trait]
impl ObjectStorage for SupabaseGateway {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, GatewayError> {
        let bearer = self.bearer().await?;
        let request = self
            .with_keys(self.inner.http.post(self.object_url(path)), &bearer)
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes);

        let uploaded: UploadResponse = parse(check(request.send().await?).await?).await?;

        // `Key` is "<bucket>/<path>"; strip the bucket to get the object path.
        let bucket_prefix = format!("{}/", self.inner.bucket);
        let stored = uploaded
            .key
            .as_deref()
            .and_then(|key| key.strip_prefix(&bucket_prefix))
            .unwrap_or(path)
            .to_string();

        debug!(path = %stored, "Object uploaded");
        Ok(stored)
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}{path}", self.public_prefix())
    }

    fn object_path(&self, public_url: &str) -> Option<String> {
        public_url
            .strip_prefix(&self.public_prefix())
            .filter(|path| !path.is_empty())
            .map(str::to_string)
    }

    #[instrument(skip(self))]
    async fn remove(&self, paths: &[String]) -> Result<(), GatewayError> {
        if paths.is_empty() {
            return Ok(());
        }

        let bearer = self.bearer().await?;
        let request = self
            .with_keys(
                self.inner.http.delete(format!(
                    "{}/storage/v1/object/{}",
                    self.inner.base_url, self.inner.bucket
                )),
                &bearer,
            )
            .json(&RemoveObjectsRequest { prefixes: paths });

        check(request.send().await?).await?;
        debug!(count = paths.len(), "Objects removed");
        Ok(())
    }
}

// =============================================================================
// HTTP helpers
// =============================================================================

/// Turn a non-success response into `GatewayError::Api`.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let raw = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&raw)
        .unwrap_or_default()
        .message(&raw);

    if status.is_server_error() {
        error!(status = %status, %message, "Supabase request failed");
    } else {
        debug!(status = %status, %message, "Supabase rejected request");
    }

    Err(GatewayError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Parse a JSON body, logging the payload head on failure.
async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        error!(
            error = %e,
            body = %text.chars().take(500).collect::<String>(),
            "Failed to parse Supabase response"
        );
        GatewayError::Parse(e)
    })
}

/// Percent-encode a value for use inside a PostgREST filter.
fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gateway() -> SupabaseGateway {
        SupabaseGateway::new(&SupabaseConfig {
            url: "https://abcd.supabase.co".to_string(),
            anon_key: SecretString::from("anon"),
            products_table: "products".to_string(),
            image_bucket: "product-images".to_string(),
        })
    }

    #[test]
    fn test_endpoint_urls() {
        let gw = gateway();
        assert_eq!(
            gw.auth_url("token?grant_type=password"),
            "https://abcd.supabase.co/auth/v1/token?grant_type=password"
        );
        assert_eq!(gw.rest_url(), "https://abcd.supabase.co/rest/v1/products");
        assert_eq!(
            gw.row_filter_url(Some("owner_id"), &ProductId::new("a b")),
            "https://abcd.supabase.co/rest/v1/products?select=owner_id&id=eq.a+b"
        );
        assert_eq!(
            gw.object_url("u1/x.jpg"),
            "https://abcd.supabase.co/storage/v1/object/product-images/u1/x.jpg"
        );
    }

    #[test]
    fn test_public_url_round_trip() {
        let gw = gateway();
        let url = gw.public_url("u1/photo.png");
        assert_eq!(
            url,
            "https://abcd.supabase.co/storage/v1/object/public/product-images/u1/photo.png"
        );
        assert_eq!(gw.object_path(&url).as_deref(), Some("u1/photo.png"));
        assert_eq!(gw.object_path("https://elsewhere.test/a.png"), None);
    }

    #[tokio::test]
    async fn test_no_session_initially() {
        let gw = gateway();
        assert!(gw.get_session().await.unwrap().is_none());
        assert!(gw.get_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_without_session_emits_event() {
        let gw = gateway();
        let mut events = gw.subscribe();
        gw.sign_out().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), AuthEvent::signed_out());
    }
}
