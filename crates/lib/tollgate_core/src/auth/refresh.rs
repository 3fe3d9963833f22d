//! Refresh token wire format.
//!
//! A refresh token is `base64("<user_id> <ip>") + "." + <nonce>`. The payload
//! part carries no signature: anyone who knows a user id and address can
//! build one that parses. Only the stored hash, which also covers the nonce,
//! makes a token usable.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::debug;

use super::AuthError;
use crate::models::token::RefreshPayload;

/// Length of the random suffix that makes each issued token unique.
const NONCE_LEN: usize = 32;

/// Build a new refresh token for `(user_id, ip)`.
pub fn generate_refresh_token(user_id: &str, ip: &str) -> String {
    let payload = STANDARD.encode(format!("{user_id} {ip}"));
    let nonce: String = rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect();
    format!("{payload}.{nonce}")
}

/// Decode a presented refresh token.
///
/// Any structural problem is reported as [`AuthError::Unauthorized`]; the
/// precise reason is only logged.
pub fn parse_refresh_token(token: &str) -> Result<RefreshPayload, AuthError> {
    decode(token).map_err(|reason| {
        debug!(reason, "rejecting malformed refresh token");
        AuthError::Unauthorized("Invalid refresh token".into())
    })
}

fn decode(token: &str) -> Result<RefreshPayload, &'static str> {
    let (payload, nonce) = token.split_once('.').ok_or("missing nonce")?;
    if nonce.len() != NONCE_LEN || !nonce.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err("bad nonce");
    }

    let bytes = STANDARD.decode(payload).map_err(|_| "bad base64")?;
    let text = String::from_utf8(bytes).map_err(|_| "payload is not utf-8")?;

    let fields: Vec<&str> = text.split(' ').collect();
    match fields.as_slice() {
        [user_id, ip] if !user_id.is_empty() && !ip.is_empty() => Ok(RefreshPayload {
            user_id: (*user_id).to_string(),
            ip: (*ip).to_string(),
        }),
        _ => Err("expected two fields"),
    }
}
