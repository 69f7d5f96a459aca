//! Catalog store.
//!
//! Holds the in-memory product list and mediates every product mutation. The
//! list is only ever replaced wholesale by [`CatalogStore::fetch_all`]; each
//! mutation ends with a re-fetch so the snapshot reflects the backend.
//!
//! Concurrent fetches are not sequenced: whichever resolves last wins.

use std::sync::Arc;

use pocket_catalog_core::{NewProduct, Product, ProductId, Quota, UserId, ValidatedProduct};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::{CatalogError, add_breadcrumb, report};
use crate::gateway::CatalogBackend;
use crate::loading::{InFlight, LoadingGuard};
use crate::media;

/// Observable catalog state.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    products: Arc<[Product]>,
    in_flight: usize,
}

impl Default for CatalogSnapshot {
    fn default() -> Self {
        Self {
            products: Arc::from(Vec::new()),
            in_flight: 0,
        }
    }
}

impl CatalogSnapshot {
    /// Every product, in backend order.
    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.in_flight > 0
    }
}

impl InFlight for CatalogSnapshot {
    fn in_flight_mut(&mut self) -> &mut usize {
        &mut self.in_flight
    }
}

/// Owns the product list.
pub struct CatalogStore {
    backend: Arc<dyn CatalogBackend>,
    state: watch::Sender<CatalogSnapshot>,
    max_products_per_user: usize,
}

impl CatalogStore {
    #[must_use]
    pub fn new(backend: Arc<dyn CatalogBackend>, max_products_per_user: usize) -> Self {
        let (state, _) = watch::channel(CatalogSnapshot::default());
        Self {
            backend,
            state,
            max_products_per_user,
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Replace the snapshot with every row the backend returns.
    ///
    /// On failure the previous snapshot is kept. A single malformed row fails
    /// the whole fetch.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure unchanged, or `CatalogError::MalformedRow`
    /// if a row violates the product invariants.
    #[instrument(skip(self))]
    pub async fn fetch_all(&self) -> Result<(), CatalogError> {
        let _loading = LoadingGuard::new(&self.state);

        let rows = match self.backend.select_products().await {
            Ok(rows) => rows,
            Err(err) => {
                let err = CatalogError::from(err);
                report(&err, err.is_server_error(), "Failed to fetch products");
                return Err(err);
            }
        };

        let products = match rows
            .into_iter()
            .map(Product::try_from)
            .collect::<Result<Vec<Product>, _>>()
        {
            Ok(products) => products,
            Err(err) => {
                let err = CatalogError::from(err);
                report(&err, err.is_server_error(), "Backend returned a malformed product");
                return Err(err);
            }
        };

        debug!(count = products.len(), "Catalog refreshed");
        self.state.send_modify(|snapshot| {
            snapshot.products = Arc::from(products);
        });
        Ok(())
    }

    /// Re-sync when a screen gains focus. Failures are logged, not returned.
    pub async fn refresh_on_focus(&self) {
        if let Err(err) = self.fetch_all().await {
            warn!(error = %err, "Focus refresh failed; showing previous catalog");
        }
    }

    /// List a new product for the signed-in user.
    ///
    /// Input must already be validated. The quota is not checked here; use
    /// [`quota_for`](Self::quota_for) before offering the add flow. If the
    /// insert fails the uploaded photo is removed again, best effort.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Unauthenticated` if the backend reports no user
    /// - `CatalogError::Image` if the photo cannot be read
    /// - `CatalogError::Gateway` if upload, insert or re-fetch fails
    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn add(&self, product: ValidatedProduct) -> Result<(), CatalogError> {
        let _loading = LoadingGuard::new(&self.state);

        let user = self
            .backend
            .get_user()
            .await?
            .ok_or(CatalogError::Unauthenticated)?;

        let image = media::materialize(&product.image_uri).await?;
        let path = image.object_path(&user.id);
        let stored = self
            .backend
            .upload(&path, image.bytes, &image.content_type)
            .await?;
        let image_url = self.backend.public_url(&stored);

        let inserted = self
            .backend
            .insert_product(&NewProduct {
                name: product.name,
                price: product.price,
                image_url: image_url.clone(),
                owner_id: user.id.clone(),
            })
            .await;
        if let Err(err) = inserted {
            self.remove_image(&image_url).await;
            return Err(err.into());
        }

        info!(owner_id = %user.id, "Product added");
        add_breadcrumb("catalog", "Added product", Some(&[("owner_id", user.id.as_str())]));

        self.fetch_all().await
    }

    /// Delete one of the signed-in user's products.
    ///
    /// The snapshot check is advisory; ownership is confirmed against the
    /// backend before the delete, and a delete the backend refuses is treated
    /// as forbidden. Removing the photo is best effort.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Unauthenticated` if the backend reports no user
    /// - `CatalogError::NotFound` if the product is unknown
    /// - `CatalogError::Forbidden` if someone else owns it
    /// - `CatalogError::Gateway` if a backend call fails
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn remove(&self, id: &ProductId) -> Result<(), CatalogError> {
        let _loading = LoadingGuard::new(&self.state);

        let user = self
            .backend
            .get_user()
            .await?
            .ok_or(CatalogError::Unauthenticated)?;

        let product = self
            .get_by_id(id)
            .ok_or_else(|| CatalogError::NotFound(id.clone()))?;
        if !product.is_owned_by(&user.id) {
            return Err(CatalogError::Forbidden(id.clone()));
        }

        match self.backend.select_product_owner(id).await? {
            None => return Err(CatalogError::NotFound(id.clone())),
            Some(owner) if owner != user.id => {
                warn!(owner_id = %owner, "Snapshot owner is stale");
                return Err(CatalogError::Forbidden(id.clone()));
            }
            Some(_) => {}
        }

        if self.backend.delete_product(id).await? == 0 {
            return Err(CatalogError::Forbidden(id.clone()));
        }
        info!("Product removed");
        add_breadcrumb("catalog", "Removed product", Some(&[("product_id", id.as_str())]));

        self.remove_image(&product.image_url).await;

        self.fetch_all().await
    }

    async fn remove_image(&self, image_url: &str) {
        let Some(path) = self.backend.object_path(image_url) else {
            debug!(%image_url, "Image is not in the bucket; nothing to remove");
            return;
        };
        if let Err(err) = self.backend.remove(&[path]).await {
            warn!(error = %err, %image_url, "Failed to remove product image");
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    #[must_use]
    pub fn get_by_id(&self, id: &ProductId) -> Option<Product> {
        self.state
            .borrow()
            .products
            .iter()
            .find(|product| &product.id == id)
            .cloned()
    }

    /// Products listed by `owner`, in snapshot order.
    #[must_use]
    pub fn get_by_owner(&self, owner: &UserId) -> Vec<Product> {
        self.state
            .borrow()
            .products
            .iter()
            .filter(|product| product.is_owned_by(owner))
            .cloned()
            .collect()
    }

    /// The whole feed.
    #[must_use]
    pub fn products(&self) -> Arc<[Product]> {
        Arc::clone(&self.state.borrow().products)
    }

    /// How much of the per-user quota `owner` has used.
    #[must_use]
    pub fn quota_for(&self, owner: &UserId) -> Quota {
        let used = self
            .state
            .borrow()
            .products
            .iter()
            .filter(|product| product.is_owned_by(owner))
            .count();
        Quota::new(used, self.max_products_per_user)
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CatalogSnapshot> {
        self.state.subscribe()
    }
}

impl std::fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.state.borrow();
        f.debug_struct("CatalogStore")
            .field("products", &snapshot.products.len())
            .field("in_flight", &snapshot.in_flight)
            .field("max_products_per_user", &self.max_products_per_user)
            .finish_non_exhaustive()
    }
}
