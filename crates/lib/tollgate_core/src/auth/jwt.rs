//! JWT access token generation and verification.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};

use super::AuthError;
use crate::models::token::AccessClaims;

/// Access token lifetime: 15 minutes.
pub const ACCESS_TOKEN_EXPIRY_SECS: i64 = 15 * 60;

/// Generate a signed JWT access token (HS512, 15 min expiry).
pub fn generate_access_token(user_id: &str, ip: &str, secret: &[u8]) -> Result<String, AuthError> {
    let claims = AccessClaims {
        user_id: user_id.to_string(),
        ip: ip.to_string(),
        exp: (Utc::now() + Duration::seconds(ACCESS_TOKEN_EXPIRY_SECS)).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS512),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::Token(format!("jwt encode: {e}")))
}

/// Verify a JWT access token, returning the claims on success.
pub fn verify_access_token(token: &str, secret: &[u8]) -> Option<AccessClaims> {
    let key = DecodingKey::from_secret(secret);
    let validation = Validation::new(Algorithm::HS512);
    decode::<AccessClaims>(token, &key, &validation)
        .ok()
        .map(|data| data.claims)
}

/// Generate a random process-lifetime signing key (64 alphanumeric chars).
pub fn generate_signing_key() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}
