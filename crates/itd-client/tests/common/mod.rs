//! Common test utilities for integration tests

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use itd_client::{Pacing, SessionOptions};
use wiremock::MockServer;

/// Builds an unsigned JWT-shaped token valid for `secs` more seconds
pub fn token_valid_for(secs: i64) -> String {
    let exp = Utc::now().timestamp() + secs;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
    format!("{header}.{payload}.c2ln")
}

/// Options pointing at the mock server with pacing off
pub fn options(server: &MockServer) -> SessionOptions {
    SessionOptions::default()
        .base_url(server.uri())
        .pacing(Pacing::Disabled)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
