//! CLI commands.

pub mod auth;
pub mod catalog;

use pocket_catalog_client::{AppState, CatalogError, ClientConfig, SessionError};
use pocket_catalog_core::{Credentials, UserId, ValidationErrors};
use thiserror::Error;

use crate::AuthArgs;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Form input was rejected before any request was made.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The backend accepted the request but no session was issued.
    #[error("Not signed in (is email confirmation pending?)")]
    NotSignedIn,

    /// The caller already lists as many products as allowed.
    #[error("Product limit reached ({0} per user)")]
    QuotaReached(usize),
}

/// Build the data layer and restore any existing session.
pub async fn connect(config: &ClientConfig) -> AppState {
    let state = AppState::connect(config);
    state.start().await;
    state
}

/// Sign in and wait for the session to settle.
///
/// # Errors
///
/// Returns `CommandError` if the credentials are malformed, the backend
/// rejects them, or no session results.
pub async fn sign_in(state: &AppState, auth: &AuthArgs) -> Result<UserId, CommandError> {
    let credentials = Credentials::new(&auth.email, &auth.password)?;
    state.session().login(&credentials).await?;

    state
        .session()
        .settled()
        .await
        .user_id()
        .cloned()
        .ok_or(CommandError::NotSignedIn)
}
