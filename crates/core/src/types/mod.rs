//! Core types for Pocket Catalog.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod credentials;
pub mod email;
pub mod form;
pub mod id;
pub mod price;
pub mod product;
pub mod quota;

pub use credentials::Credentials;
pub use email::{Email, EmailError};
pub use form::{FieldError, ProductForm, ValidatedProduct, ValidationErrors};
pub use id::*;
pub use price::{Price, PriceError};
pub use product::{NewProduct, Product, ProductRow, ProductRowError};
pub use quota::{MAX_PRODUCTS_PER_USER, Quota};
