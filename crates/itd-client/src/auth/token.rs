//! Offline decoding of access token expiry
//!
//! Access tokens are JWT-shaped: `header.payload[.signature]`. Only the `exp`
//! claim of the payload is read; signatures are never checked.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde_json::Value;
use thiserror::Error;

/// Placeholder access token whose payload is `{"exp": 0}`
///
/// Sessions start with this so the first expiry check forces a refresh.
pub const EXPIRED_SENTINEL: &str = ".eyJleHAiOiAwfQ==";

const BEARER_PREFIX: &str = "Bearer ";

/// Claims read from an access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenClaims {
    /// Expiry as a unix timestamp (seconds)
    pub exp: i64,
}

/// The token could not be evaluated
#[derive(Debug, Error)]
pub enum MalformedToken {
    #[error("expected 2 or 3 dot-separated segments, found {0}")]
    SegmentCount(usize),
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload has no numeric `exp` claim")]
    MissingExp,
}

/// Decodes the claims embedded in an access token
pub fn decode(token: &str) -> Result<TokenClaims, MalformedToken> {
    let token = strip_bearer(token);
    let segments: Vec<&str> = token.split('.').collect();
    if !(2..=3).contains(&segments.len()) {
        return Err(MalformedToken::SegmentCount(segments.len()));
    }

    let mut payload = segments[1].to_owned();
    while payload.len() % 4 != 0 {
        payload.push('=');
    }

    let bytes = URL_SAFE.decode(payload.as_bytes())?;
    let claims: Value = serde_json::from_slice(&bytes)?;
    let exp = claims
        .get("exp")
        .and_then(|exp| exp.as_i64().or_else(|| exp.as_f64().map(|f| f.floor() as i64)))
        .ok_or(MalformedToken::MissingExp)?;

    Ok(TokenClaims { exp })
}

/// Returns true once `now` is within one second of the token's expiry
///
/// `now` is a unix timestamp in seconds.
pub fn is_expired(token: &str, now: i64) -> Result<bool, MalformedToken> {
    let claims = decode(token)?;
    Ok(now - 1 >= claims.exp)
}

/// Prefixes `Bearer ` unless the token already carries it
pub fn add_bearer(token: &str) -> String {
    let token = token.trim();
    if token.starts_with(BEARER_PREFIX) {
        token.to_owned()
    } else {
        format!("{BEARER_PREFIX}{token}")
    }
}

fn strip_bearer(token: &str) -> &str {
    token.strip_prefix(BEARER_PREFIX).unwrap_or(token).trim()
}
