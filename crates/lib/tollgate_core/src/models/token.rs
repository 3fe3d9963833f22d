//! Token domain models.
//!
//! Only [`TokenRecord`] is persisted; access claims and refresh payloads
//! travel inside the tokens themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored refresh-token record. At most one per user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    /// Storage-assigned surrogate key.
    pub id: i32,
    pub user_id: Uuid,
    /// bcrypt output for the current refresh token.
    pub hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: String,
    /// Address the token was issued to.
    pub ip: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// Decoded content of a refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPayload {
    pub user_id: String,
    pub ip: String,
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}
