//! Error taxonomy with Sentry integration.
//!
//! Backend and transport failures travel through every layer as
//! [`GatewayError`] unchanged. Only the server kind of error is captured to
//! Sentry; user-caused outcomes (bad credentials, forbidden, not found) are not.

use pocket_catalog_core::{ProductId, ProductRowError};
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::media::MediaError;

/// Errors from the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl SessionError {
    /// The underlying gateway failure.
    #[must_use]
    pub const fn gateway(&self) -> &GatewayError {
        match self {
            Self::Gateway(err) => err,
        }
    }
}

/// Errors from the catalog store.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No user is signed in.
    #[error("Not signed in")]
    Unauthenticated,

    /// The product is not in the catalog.
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    /// The product belongs to someone else.
    #[error("Not allowed to modify product {0}")]
    Forbidden(ProductId),

    /// The photo could not be read.
    #[error("Image error: {0}")]
    Image(#[from] MediaError),

    /// The backend returned a row that is not a valid product.
    #[error("Malformed product row: {0}")]
    MalformedRow(#[from] ProductRowError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Whether a gateway error is worth an error report.
///
/// Transport and parse failures always are; backend rejections only when the
/// backend itself failed.
#[must_use]
pub const fn is_server_error(err: &GatewayError) -> bool {
    match err {
        GatewayError::Http(_) | GatewayError::Parse(_) => true,
        GatewayError::Api { status, .. } => *status >= 500,
    }
}

impl CatalogError {
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        match self {
            Self::Gateway(err) => is_server_error(err),
            Self::MalformedRow(_) => true,
            Self::Unauthenticated | Self::NotFound(_) | Self::Forbidden(_) | Self::Image(_) => {
                false
            }
        }
    }
}

/// Capture a server-kind error to Sentry and log it; other errors are only
/// logged at debug level.
pub fn report<E>(err: &E, server_error: bool, context: &str)
where
    E: std::error::Error + ?Sized,
{
    if server_error {
        let event_id = sentry::capture_error(err);
        tracing::error!(
            error = %err,
            sentry_event_id = %event_id,
            "{context}"
        );
    } else {
        tracing::debug!(error = %err, "{context}");
    }
}

/// Set the Sentry user context.
///
/// Call this when a session is issued to associate errors with the user.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("catalog", "Removed product", Some(&[("product_id", "42")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_display() {
        let err = CatalogError::NotFound(ProductId::new("p1"));
        assert_eq!(err.to_string(), "Product not found: p1");

        let err = CatalogError::Forbidden(ProductId::new("p2"));
        assert_eq!(err.to_string(), "Not allowed to modify product p2");

        assert_eq!(CatalogError::Unauthenticated.to_string(), "Not signed in");
    }

    #[test]
    fn test_gateway_errors_pass_through_unchanged() {
        let err = CatalogError::from(GatewayError::Api {
            status: 409,
            message: "duplicate key".to_string(),
        });
        assert_eq!(err.to_string(), "Backend error (409): duplicate key");

        let err = SessionError::from(GatewayError::Api {
            status: 400,
            message: "Invalid login credentials".to_string(),
        });
        assert_eq!(err.gateway().status(), Some(400));
    }

    #[test]
    fn test_server_error_classification() {
        let rejected = GatewayError::Api {
            status: 400,
            message: "bad".to_string(),
        };
        let failed = GatewayError::Api {
            status: 503,
            message: "down".to_string(),
        };
        assert!(!is_server_error(&rejected));
        assert!(is_server_error(&failed));

        assert!(CatalogError::Gateway(failed).is_server_error());
        assert!(!CatalogError::Forbidden(ProductId::new("p")).is_server_error());
        assert!(!CatalogError::Image(MediaError::Empty).is_server_error());
        assert!(CatalogError::from(ProductRowError::EmptyName("p".to_string())).is_server_error());
    }
}
