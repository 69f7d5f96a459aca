//! Application state owned by the application root.

use std::sync::Arc;

use crate::catalog::CatalogStore;
use crate::config::{CatalogConfig, ClientConfig};
use crate::gateway::{AuthGateway, CatalogBackend, SupabaseGateway};
use crate::session::SessionManager;

/// The data layer: session manager plus catalog store over one backend.
///
/// Cheaply cloneable via `Arc`. Build one at startup and hand clones to
/// whatever needs them; there are no globals.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    session: Arc<SessionManager>,
    catalog: CatalogStore,
}

impl AppState {
    /// Wire the data layer over `backend`.
    ///
    /// Subscribes to session notifications, so must be called from within a
    /// Tokio runtime.
    #[must_use]
    pub fn new<B>(backend: Arc<B>, catalog: CatalogConfig) -> Self
    where
        B: CatalogBackend + 'static,
    {
        let auth: Arc<dyn AuthGateway> = backend.clone();
        let store: Arc<dyn CatalogBackend> = backend;

        Self {
            inner: Arc::new(AppStateInner {
                session: SessionManager::start(auth),
                catalog: CatalogStore::new(store, catalog.max_products_per_user),
            }),
        }
    }

    /// Wire the data layer over the configured Supabase project.
    #[must_use]
    pub fn connect(config: &ClientConfig) -> Self {
        Self::new(
            Arc::new(SupabaseGateway::new(&config.supabase)),
            config.catalog,
        )
    }

    /// Restore any existing session. Failures are logged and leave the user
    /// signed out.
    pub async fn start(&self) {
        if let Err(err) = self.inner.session.initialize().await {
            tracing::warn!(error = %err, "Starting signed out");
        }
    }

    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogStore {
        &self.inner.catalog
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("session", &self.inner.session)
            .field("catalog", &self.inner.catalog)
            .finish()
    }
}
