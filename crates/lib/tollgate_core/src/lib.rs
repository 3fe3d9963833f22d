//! # tollgate_core
//!
//! Core domain logic for Tollgate: access/refresh token issuance and
//! rotation, and routing of storage calls across a highly-available
//! PostgreSQL cluster.

pub mod auth;
pub mod cluster;
pub mod config;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
