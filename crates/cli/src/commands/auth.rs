//! Account commands.

use pocket_catalog_client::route_guard::{Location, Navigator, RouteGuard};
use pocket_catalog_client::AppState;
use pocket_catalog_core::Credentials;

use super::{CommandError, sign_in};
use crate::AuthArgs;

/// Create an account.
///
/// # Errors
///
/// Returns `CommandError` if the input is malformed or the backend refuses.
pub async fn signup(state: &AppState, auth: &AuthArgs) -> Result<(), CommandError> {
    let credentials = Credentials::new(&auth.email, &auth.password)?;
    state.session().signup(&credentials).await?;

    let session = state.session().settled().await;
    match session.user_id() {
        Some(user_id) => tracing::info!("Account created and signed in as {user_id}"),
        None => tracing::info!(
            "Account created for {}. Confirm your email, then sign in.",
            credentials.email()
        ),
    }
    Ok(())
}

/// Sign in, report the user, then end the session again.
///
/// # Errors
///
/// Returns `CommandError` if sign-in fails.
pub async fn login(state: &AppState, auth: &AuthArgs) -> Result<(), CommandError> {
    let user_id = sign_in(state, auth).await?;
    tracing::info!("Signed in as {user_id}");

    state.session().logout().await?;
    state.session().settled().await;
    tracing::info!("Signed out");
    Ok(())
}

pub fn whoami(state: &AppState) {
    let session = state.session().current();
    match (session.user_id(), session.email()) {
        (Some(id), Some(email)) => tracing::info!("{email} ({id})"),
        (Some(id), None) => tracing::info!("{id}"),
        _ => tracing::info!("Not signed in"),
    }
}

/// Logs navigation instead of performing it.
struct LogNavigator;

impl Navigator for LogNavigator {
    fn replace(&self, path: &str) {
        tracing::info!("Redirect -> {path}");
    }
}

/// Evaluate the route guard for `path`, optionally after signing in.
///
/// # Errors
///
/// Returns `CommandError` if sign-in was requested and fails.
pub async fn route(
    state: &AppState,
    auth: Option<&AuthArgs>,
    path: &str,
) -> Result<(), CommandError> {
    if let Some(auth) = auth {
        sign_in(state, auth).await?;
    }

    let session = state.session().settled().await;
    let location = Location::from_path(path);

    match RouteGuard::new().evaluate(&location, session.is_authenticated()) {
        Some(redirect) => LogNavigator.replace(redirect.path()),
        None => tracing::info!("Stay on {path}"),
    }
    Ok(())
}
