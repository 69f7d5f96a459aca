//! Pocket Catalog Core - Shared types library.
//!
//! This crate provides the domain types used across all Pocket Catalog components:
//! - `client` - Session, catalog and routing data layer over the hosted backend
//! - `cli` - Terminal front-end driving the data layer
//! - `integration-tests` - In-memory backend and scenario tests
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no HTTP
//! clients, no async runtime. This keeps it lightweight and allows it to be
//! used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, prices, products, form validation and quotas

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
