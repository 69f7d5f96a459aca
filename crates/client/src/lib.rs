//! Pocket Catalog client data layer.
//!
//! Coordinates the auth session, the shared product catalog and photo
//! storage against a hosted backend. Start from [`AppState`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
mod loading;
pub mod media;
pub mod route_guard;
pub mod session;
pub mod state;

pub use catalog::{CatalogSnapshot, CatalogStore};
pub use config::ClientConfig;
pub use error::{CatalogError, SessionError};
pub use route_guard::{Location, Navigator, Redirect, RouteGuard};
pub use session::{AuthPhase, Session, SessionManager};
pub use state::AppState;
