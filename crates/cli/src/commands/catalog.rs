//! Catalog commands.

use pocket_catalog_client::AppState;
use pocket_catalog_core::{Product, ProductForm, ProductId};

use super::{CommandError, sign_in};
use crate::AuthArgs;

fn log_product(product: &Product) {
    tracing::info!(
        "{}  {}  {}  (owner {})",
        product.id,
        product.price.display(),
        product.name,
        product.owner_id
    );
}

/// List the whole feed.
///
/// # Errors
///
/// Returns `CommandError` if the fetch fails.
pub async fn feed(state: &AppState) -> Result<(), CommandError> {
    state.catalog().fetch_all().await?;

    let products = state.catalog().products();
    if products.is_empty() {
        tracing::info!("No products yet");
    }
    for product in products.iter() {
        log_product(product);
    }
    Ok(())
}

/// List the caller's products and remaining quota.
///
/// # Errors
///
/// Returns `CommandError` if sign-in or the fetch fails.
pub async fn mine(state: &AppState, auth: &AuthArgs) -> Result<(), CommandError> {
    let user_id = sign_in(state, auth).await?;
    state.catalog().fetch_all().await?;

    for product in state.catalog().get_by_owner(&user_id) {
        log_product(&product);
    }

    let quota = state.catalog().quota_for(&user_id);
    tracing::info!(
        "{} of {} products listed, {} remaining",
        quota.used,
        quota.limit,
        quota.remaining()
    );
    Ok(())
}

/// Show one product.
///
/// # Errors
///
/// Returns `CommandError` if the fetch fails or the product does not exist.
pub async fn show(state: &AppState, id: &str) -> Result<(), CommandError> {
    let id = ProductId::new(id);
    state.catalog().fetch_all().await?;

    let product = state
        .catalog()
        .get_by_id(&id)
        .ok_or(pocket_catalog_client::CatalogError::NotFound(id))?;

    log_product(&product);
    tracing::info!("Image: {}", product.image_url);
    if let Some(created_at) = product.created_at {
        tracing::info!("Listed: {created_at}");
    }
    Ok(())
}

/// Validate and list a new product.
///
/// # Errors
///
/// Returns `CommandError` if validation fails, the quota is reached, or any
/// backend step fails.
pub async fn add(
    state: &AppState,
    auth: &AuthArgs,
    name: String,
    price: String,
    image: String,
) -> Result<(), CommandError> {
    let product = ProductForm {
        name,
        price,
        image_uri: Some(image),
    }
    .validate()?;

    let user_id = sign_in(state, auth).await?;
    state.catalog().fetch_all().await?;

    let quota = state.catalog().quota_for(&user_id);
    if quota.is_reached() {
        return Err(CommandError::QuotaReached(quota.limit));
    }

    state.catalog().add(product).await?;
    tracing::info!(
        "Product listed ({} of {} used)",
        state.catalog().quota_for(&user_id).used,
        quota.limit
    );
    Ok(())
}

/// Remove one of the caller's products.
///
/// # Errors
///
/// Returns `CommandError` if sign-in fails, the product is unknown or not
/// owned by the caller, or a backend step fails.
pub async fn remove(state: &AppState, auth: &AuthArgs, id: &str) -> Result<(), CommandError> {
    sign_in(state, auth).await?;
    state.catalog().fetch_all().await?;

    state.catalog().remove(&ProductId::new(id)).await?;
    tracing::info!("Product {id} removed");
    Ok(())
}
