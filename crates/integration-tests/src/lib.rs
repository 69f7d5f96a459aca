//! Integration test support for Pocket Catalog.
//!
//! [`MemoryBackend`] stands in for the hosted backend. It behaves like the
//! real one where the data layer depends on it:
//!
//! - sign-in, sign-up and sign-out push session-change notifications
//! - inserts and deletes are checked against the signed-in user, so a delete
//!   by a non-owner affects zero rows
//! - stored objects are addressable by public URL
//!
//! Individual operations can be made to fail to exercise error paths.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p pocket-catalog-integration-tests
//! ```

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use pocket_catalog_client::config::CatalogConfig;
use pocket_catalog_client::gateway::{
    AuthEvent, AuthGateway, AuthUser, GatewayError, GatewaySession, ObjectStorage,
    ProductGateway,
};
use pocket_catalog_client::{AppState, Session};
use pocket_catalog_core::{Credentials, NewProduct, ProductId, ProductRow, UserId};
use secrecy::SecretString;
use tokio::sync::broadcast;

const PUBLIC_PREFIX: &str = "memory://product-images/";

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SignUp,
    SignIn,
    SignOut,
    GetSession,
    GetUser,
    Select,
    Insert,
    SelectOwner,
    Delete,
    Upload,
    RemoveObjects,
}

#[derive(Debug, Clone)]
struct Account {
    id: UserId,
    email: String,
    password: String,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: Vec<Account>,
    current: Option<AuthUser>,
    rows: Vec<ProductRow>,
    objects: HashMap<String, Vec<u8>>,
    failing: HashSet<Operation>,
    require_confirmation: bool,
    next_row: u64,
}

/// In-memory backend with server-side ownership checks.
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    events: broadcast::Sender<AuthEvent>,
    calls: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Mutex::new(Inner::default()),
            events,
            calls: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a call and fail it if `op` was made to fail.
    fn enter(&self, op: Operation) -> Result<MutexGuard<'_, Inner>, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock();
        if inner.failing.contains(&op) {
            return Err(GatewayError::Api {
                status: 503,
                message: format!("{op:?} unavailable"),
            });
        }
        Ok(inner)
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Register an account and return its user id.
    pub fn register(&self, email: &str, password: &str) -> UserId {
        let mut inner = self.lock();
        let id = UserId::new(format!("user-{}", inner.accounts.len() + 1));
        inner.accounts.push(Account {
            id: id.clone(),
            email: email.to_string(),
            password: password.to_string(),
        });
        id
    }

    /// Insert a row directly, bypassing the ownership check.
    pub fn seed_product(&self, owner: &UserId, name: &str, price: f64) -> ProductId {
        let mut inner = self.lock();
        inner.next_row += 1;
        let id = inner.next_row.to_string();
        let path = format!("{owner}/{id}.jpg");
        inner.objects.insert(path.clone(), vec![0xFF, 0xD8]);
        inner.rows.push(ProductRow {
            id: id.clone(),
            name: name.to_string(),
            price,
            image_url: format!("{PUBLIC_PREFIX}{path}"),
            owner_id: owner.to_string(),
            created_at: Some(Utc::now()),
        });
        ProductId::new(id)
    }

    /// Change a row's owner behind the client's back.
    pub fn reassign(&self, id: &ProductId, owner: &UserId) {
        let mut inner = self.lock();
        if let Some(row) = inner.rows.iter_mut().find(|row| row.id == id.as_str()) {
            row.owner_id = owner.to_string();
        }
    }

    /// Make `op` fail until [`recover`](Self::recover) is called.
    pub fn fail(&self, op: Operation) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: Operation) {
        self.lock().failing.remove(&op);
    }

    /// Sign-ups create the account but issue no session.
    pub fn require_email_confirmation(&self) {
        self.lock().require_confirmation = true;
    }

    /// End the session server-side, as an expired refresh token would.
    pub fn revoke_session(&self) {
        self.lock().current = None;
        let _ = self.events.send(AuthEvent::signed_out());
    }

    /// End the session without a notification.
    pub fn expire_session(&self) {
        self.lock().current = None;
    }

    /// Rotate the current session's tokens and notify listeners.
    pub fn refresh_session(&self) {
        let current = self.lock().current.clone();
        if let Some(user) = current {
            self.emit(AuthEvent::token_refreshed(user));
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    #[must_use]
    pub fn rows(&self) -> Vec<ProductRow> {
        self.lock().rows.clone()
    }

    #[must_use]
    pub fn object_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.lock().objects.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of backend calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn session_for(user: AuthUser) -> GatewaySession {
        GatewaySession {
            access_token: SecretString::from(format!("access-{}", user.id)),
            refresh_token: Some(SecretString::from(format!("refresh-{}", user.id))),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            user,
        }
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AuthGateway for MemoryBackend {
    async fn sign_up(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<GatewaySession>, GatewayError> {
        let mut inner = self.enter(Operation::SignUp)?;
        let email = credentials.email().as_str();

        if inner.accounts.iter().any(|account| account.email == email) {
            return Err(GatewayError::Api {
                status: 422,
                message: "User already registered".to_string(),
            });
        }

        let id = UserId::new(format!("user-{}", inner.accounts.len() + 1));
        inner.accounts.push(Account {
            id: id.clone(),
            email: email.to_string(),
            password: credentials.password().to_string(),
        });

        if inner.require_confirmation {
            return Ok(None);
        }

        let user = AuthUser {
            id,
            email: Some(email.to_string()),
        };
        inner.current = Some(user.clone());
        drop(inner);

        self.emit(AuthEvent::signed_in(user.clone()));
        Ok(Some(Self::session_for(user)))
    }

    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<GatewaySession, GatewayError> {
        let mut inner = self.enter(Operation::SignIn)?;

        let account = inner
            .accounts
            .iter()
            .find(|account| {
                account.email == credentials.email().as_str()
                    && account.password == credentials.password()
            })
            .cloned()
            .ok_or_else(|| GatewayError::Api {
                status: 400,
                message: "Invalid login credentials".to_string(),
            })?;

        let user = AuthUser {
            id: account.id,
            email: Some(account.email),
        };
        inner.current = Some(user.clone());
        drop(inner);

        self.emit(AuthEvent::signed_in(user.clone()));
        Ok(Self::session_for(user))
    }

    async fn sign_out(&self) -> Result<(), GatewayError> {
        let mut inner = self.enter(Operation::SignOut)?;
        inner.current = None;
        drop(inner);

        self.emit(AuthEvent::signed_out());
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<GatewaySession>, GatewayError> {
        let inner = self.enter(Operation::GetSession)?;
        Ok(inner.current.clone().map(Self::session_for))
    }

    async fn get_user(&self) -> Result<Option<AuthUser>, GatewayError> {
        let inner = self.enter(Operation::GetUser)?;
        Ok(inner.current.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl ProductGateway for MemoryBackend {
    async fn select_products(&self) -> Result<Vec<ProductRow>, GatewayError> {
        let inner = self.enter(Operation::Select)?;
        Ok(inner.rows.clone())
    }

    async fn insert_product(&self, product: &NewProduct) -> Result<(), GatewayError> {
        let mut inner = self.enter(Operation::Insert)?;

        let allowed = inner
            .current
            .as_ref()
            .is_some_and(|user| user.id == product.owner_id);
        if !allowed {
            return Err(GatewayError::Api {
                status: 403,
                message: "new row violates row-level security policy".to_string(),
            });
        }

        inner.next_row += 1;
        let id = inner.next_row.to_string();
        inner.rows.push(ProductRow {
            id,
            name: product.name.clone(),
            price: product.price.into(),
            image_url: product.image_url.clone(),
            owner_id: product.owner_id.to_string(),
            created_at: Some(Utc::now()),
        });
        Ok(())
    }

    async fn select_product_owner(&self, id: &ProductId) -> Result<Option<UserId>, GatewayError> {
        let inner = self.enter(Operation::SelectOwner)?;
        Ok(inner
            .rows
            .iter()
            .find(|row| row.id == id.as_str())
            .map(|row| UserId::new(row.owner_id.clone())))
    }

    async fn delete_product(&self, id: &ProductId) -> Result<u64, GatewayError> {
        let mut inner = self.enter(Operation::Delete)?;
        let Some(current) = inner.current.as_ref().map(|user| user.id.to_string()) else {
            return Ok(0);
        };

        let before = inner.rows.len();
        inner
            .rows
            .retain(|row| !(row.id == id.as_str() && row.owner_id == current));
        Ok((before - inner.rows.len()) as u64)
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, GatewayError> {
        let mut inner = self.enter(Operation::Upload)?;
        if inner.objects.contains_key(path) {
            return Err(GatewayError::Api {
                status: 409,
                message: "The resource already exists".to_string(),
            });
        }
        inner.objects.insert(path.to_string(), bytes);
        Ok(path.to_string())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{PUBLIC_PREFIX}{path}")
    }

    fn object_path(&self, public_url: &str) -> Option<String> {
        public_url.strip_prefix(PUBLIC_PREFIX).map(str::to_string)
    }

    async fn remove(&self, paths: &[String]) -> Result<(), GatewayError> {
        let mut inner = self.enter(Operation::RemoveObjects)?;
        for path in paths {
            inner.objects.remove(path);
        }
        Ok(())
    }
}

/// Write a throwaway image file and return its path.
///
/// # Panics
///
/// Panics if the temp directory is not writable.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn temp_image(extension: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("pocket-catalog-{}.{extension}", uuid::Uuid::new_v4()));
    std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
    path
}

/// Data layer over `backend` with default catalog settings.
#[must_use]
pub fn app(backend: &Arc<MemoryBackend>) -> AppState {
    AppState::new(Arc::clone(backend), CatalogConfig::default())
}

/// Sign in through the session manager and wait for the outcome.
///
/// # Panics
///
/// Panics if the credentials are malformed or rejected.
#[allow(clippy::unwrap_used)]
pub async fn sign_in(state: &AppState, email: &str, password: &str) -> Session {
    let credentials = Credentials::new(email, password).unwrap();
    state.session().login(&credentials).await.unwrap();
    state.session().settled().await
}
