#[cfg(test)]
#[path = "jwt_test.rs"]
mod tests;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Expiry time carried by a JWT, if `token` is one and has an `exp` claim.
/// Opaque tokens yield `None`.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let payload = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&payload).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}

pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    match expires_at(token) {
        Some(exp) => now >= exp,
        None => false,
    }
}
