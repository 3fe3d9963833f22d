//! Token persistence.
//!
//! [`TokenStore`] is the seam between the token service and storage. The
//! PostgreSQL implementation routes reads to a standby-preferred node and
//! writes to the primary; the in-memory one backs tests and local runs.

pub mod memory;
pub mod pg;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::cluster::ClusterError;
use crate::models::token::TokenRecord;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Routing error: {0}")]
    Routing(#[from] ClusterError),

    #[error("Query failed ({op}): {source}")]
    Query {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query timed out ({op}) after {after:?}")]
    Timeout { op: &'static str, after: Duration },
}

/// Read/upsert access to the single token record per user.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Fetch the record for a user, or [`StoreError::NotFound`].
    async fn get_by_user_id(&self, user_id: Uuid) -> Result<TokenRecord, StoreError>;

    /// Atomically insert or replace the hash for a user, returning the record id.
    async fn upsert_token(&self, user_id: Uuid, hash: &str) -> Result<i32, StoreError>;
}
