//! Token issuance and rotation.
//!
//! Provides refresh-secret hashing, access/refresh token codecs and the
//! [`service::TokenService`] that ties them to a token store.

pub mod hasher;
pub mod jwt;
pub mod refresh;
pub mod service;

use thiserror::Error;

use crate::cluster::ClusterError;
use crate::store::StoreError;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage unavailable ({context}): {source}")]
    Routing {
        context: &'static str,
        #[source]
        source: ClusterError,
    },

    #[error("Storage error ({context}): {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Token error: {0}")]
    Token(String),
}

impl AuthError {
    /// Wrap a store failure with the operation that triggered it, keeping
    /// routing failures distinct from query failures.
    pub fn storage(context: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::Routing(source) => AuthError::Routing { context, source },
            source => AuthError::Storage { context, source },
        }
    }

    /// Whether the failure is a rejected credential rather than a fault.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthError::Unauthorized(_))
    }
}
