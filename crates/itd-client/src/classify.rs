//! Response classification
//!
//! The API reports failures in several shapes: bare sentinel bodies, bare
//! status codes, a `{"type", "on", "found"}` parameter-validation object, and
//! the usual `{"error": {"code", "message"}}` envelope. [`ErrorClassifier`]
//! folds all of them into [`ApiError`].

use std::collections::HashMap;
use std::sync::LazyLock;

use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::http::HttpResponse;

/// Legacy rate-limit body: `{"error": "Too Many Requests", ...}`
const LEGACY_RATE_LIMIT: &str = "Too Many Requests";

/// Code used when the body is not JSON at all
const UNPARSEABLE_CODE: &str = "UNKNOWN";

/// What an error code maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    TokenNotFound,
    TokenRevoked,
    TokenExpired,
    TokenMissing,
    InvalidPassword,
    InvalidOldPassword,
    SamePassword,
    Forbidden,
    Validation,
    NotPinned,
    Conflict,
    RateLimited,
    NotFound,
    Unknown,
    ServerError,
    Upload,
    UserBlocked,
}

impl ErrorKind {
    fn build(self, code: &str, message: String, error: &Map<String, Value>) -> ApiError {
        match self {
            Self::Unauthorized => ApiError::Unauthorized,
            Self::TokenNotFound => ApiError::TokenNotFound,
            Self::TokenRevoked => ApiError::TokenRevoked,
            Self::TokenExpired => ApiError::TokenExpired,
            Self::TokenMissing => ApiError::TokenMissing,
            Self::InvalidPassword => ApiError::InvalidPassword,
            Self::InvalidOldPassword => ApiError::InvalidOldPassword,
            Self::SamePassword => ApiError::SamePassword,
            Self::Forbidden => ApiError::Forbidden { message },
            Self::Validation => ApiError::Validation { detail: message },
            Self::NotPinned => ApiError::NotPinned { message },
            Self::Conflict => ApiError::Conflict { message },
            Self::RateLimited => ApiError::RateLimited {
                retry_after: retry_after(error),
                message,
            },
            Self::NotFound => ApiError::NotFound { message },
            Self::Unknown => ApiError::Unknown {
                code: code.to_owned(),
                message,
            },
            Self::ServerError => ApiError::ServerError { message },
            Self::Upload => ApiError::Upload { message },
            Self::UserBlocked => ApiError::UserBlocked { message },
        }
    }
}

/// Immutable mapping from wire error codes to error kinds
#[derive(Debug)]
pub struct CodeTable {
    entries: HashMap<&'static str, ErrorKind>,
}

impl CodeTable {
    /// The table of codes the API is known to emit
    pub fn standard() -> Self {
        Self::from_entries([
            ("UNAUTHORIZED", ErrorKind::Unauthorized),
            ("SESSION_NOT_FOUND", ErrorKind::TokenNotFound),
            ("SESSION_REVOKED", ErrorKind::TokenRevoked),
            ("SESSION_EXPIRED", ErrorKind::TokenExpired),
            ("REFRESH_TOKEN_MISSING", ErrorKind::TokenMissing),
            ("INVALID_PASSWORD", ErrorKind::InvalidPassword),
            ("INVALID_OLD_PASSWORD", ErrorKind::InvalidOldPassword),
            ("SAME_PASSWORD", ErrorKind::SamePassword),
            ("FORBIDDEN", ErrorKind::Forbidden),
            ("VALIDATION_ERROR", ErrorKind::Validation),
            ("NOT_PINNED", ErrorKind::NotPinned),
            ("CONFLICT", ErrorKind::Conflict),
            ("RATE_LIMIT_EXCEEDED", ErrorKind::RateLimited),
            ("NOT_FOUND", ErrorKind::NotFound),
            ("UNKNOWN_ERROR", ErrorKind::Unknown),
            ("SERVER_ERROR", ErrorKind::ServerError),
            ("UPLOAD_ERROR", ErrorKind::Upload),
            ("USER_BLOCKED", ErrorKind::UserBlocked),
        ])
    }

    /// Builds a table from explicit entries
    pub fn from_entries(entries: impl IntoIterator<Item = (&'static str, ErrorKind)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn lookup(&self, code: &str) -> Option<ErrorKind> {
        self.entries.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Process-wide standard code table, built on first use
pub static CODE_TABLE: LazyLock<CodeTable> = LazyLock::new(CodeTable::standard);

/// Maps raw responses to either a passthrough success or an [`ApiError`]
///
/// Holds no state besides a reference to the code table.
#[derive(Debug, Clone, Copy)]
pub struct ErrorClassifier {
    table: &'static CodeTable,
}

impl ErrorClassifier {
    pub fn new(table: &'static CodeTable) -> Self {
        Self { table }
    }

    /// Returns the response untouched, or the error it encodes
    pub fn classify(&self, response: HttpResponse) -> Result<HttpResponse, ApiError> {
        match response.body.as_str() {
            "UNAUTHORIZED" => return Err(ApiError::Unauthorized),
            "NOT_FOUND" => {
                return Err(ApiError::NotFound {
                    message: response.body,
                })
            }
            _ => {}
        }

        match response.status {
            413 => return Err(ApiError::TooLarge),
            405 => return Err(ApiError::MethodNotAllowed),
            504 => return Err(ApiError::GatewayTimeout),
            _ => {}
        }

        let Ok(value) = serde_json::from_str::<Value>(&response.body) else {
            if response.status == 204 {
                return Ok(response);
            }
            return Err(ApiError::Unknown {
                code: UNPARSEABLE_CODE.to_owned(),
                message: response.body,
            });
        };

        if let Some(object) = value.as_object() {
            if let Some(expected) = object.get("type") {
                return Err(ApiError::ParamsValidation {
                    field: object.get("on").map(text).unwrap_or_default(),
                    expected: text(expected),
                    found: object.get("found").map(text).unwrap_or_default(),
                });
            }
            if let Some(error) = object.get("error") {
                return Err(self.classify_envelope(error, object));
            }
        }

        if response.status >= 400 {
            return Err(status_fallback(response.status, response.body));
        }

        Ok(response)
    }

    fn classify_envelope(&self, error: &Value, envelope: &Map<String, Value>) -> ApiError {
        match error {
            Value::Object(error) => {
                let code = error
                    .get("code")
                    .map(text)
                    .unwrap_or_else(|| UNPARSEABLE_CODE.to_owned());
                let message = message(error);
                match self.table.lookup(&code) {
                    Some(kind) => kind.build(&code, message, error),
                    None => ApiError::Unknown { code, message },
                }
            }
            Value::String(legacy) if legacy == LEGACY_RATE_LIMIT => ApiError::RateLimited {
                retry_after: retry_after(envelope),
                message: envelope
                    .get("message")
                    .map(text)
                    .unwrap_or_else(|| LEGACY_RATE_LIMIT.to_owned()),
            },
            other => ApiError::Unknown {
                code: text(other),
                message: message(envelope),
            },
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(&CODE_TABLE)
    }
}

/// Classifies an error status whose body carried no recognisable envelope
fn status_fallback(status: u16, body: String) -> ApiError {
    match status {
        401 => ApiError::Unauthorized,
        403 => ApiError::Forbidden { message: body },
        404 => ApiError::NotFound { message: body },
        409 => ApiError::Conflict { message: body },
        429 => ApiError::RateLimited {
            retry_after: None,
            message: body,
        },
        500..=599 => ApiError::ServerError { message: body },
        _ => ApiError::Unknown {
            code: status.to_string(),
            message: body,
        },
    }
}

fn retry_after(object: &Map<String, Value>) -> Option<u64> {
    object.get("retryAfter").and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_f64().map(|f| f.ceil() as u64))
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    })
}

fn message(object: &Map<String, Value>) -> String {
    object.get("message").map(text).unwrap_or_default()
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(status: u16, body: &str) -> Result<HttpResponse, ApiError> {
        ErrorClassifier::default().classify(HttpResponse {
            status,
            body: body.to_string(),
        })
    }

    fn error(status: u16, body: &str) -> ApiError {
        classify(status, body).unwrap_err()
    }

    #[test]
    fn sentinel_bodies_skip_json_parsing() {
        assert_eq!(error(401, "UNAUTHORIZED"), ApiError::Unauthorized);
        assert!(matches!(error(404, "NOT_FOUND"), ApiError::NotFound { .. }));
        // even with a success status
        assert_eq!(error(200, "UNAUTHORIZED"), ApiError::Unauthorized);
    }

    #[test]
    fn status_fast_path_ignores_body() {
        assert_eq!(error(413, "<html>too big</html>"), ApiError::TooLarge);
        assert_eq!(error(405, ""), ApiError::MethodNotAllowed);
        assert_eq!(error(504, "<html>504 Gateway Time-out</html>"), ApiError::GatewayTimeout);
    }

    #[test]
    fn known_code_maps_to_variant() {
        let err = error(404, r#"{"error": {"code": "NOT_FOUND", "message": "x"}}"#);
        assert_eq!(err, ApiError::NotFound { message: "x".into() });

        assert_eq!(
            error(401, r#"{"error": {"code": "SESSION_REVOKED", "message": "Session revoked"}}"#),
            ApiError::TokenRevoked
        );
        assert_eq!(
            error(400, r#"{"error": {"code": "SAME_PASSWORD", "message": "m"}}"#),
            ApiError::SamePassword
        );
        assert_eq!(
            error(400, r#"{"error": {"code": "NOT_PINNED", "message": "This post is not pinned"}}"#),
            ApiError::NotPinned {
                message: "This post is not pinned".into()
            }
        );
    }

    #[test]
    fn unknown_code_is_kept_verbatim() {
        let err = error(400, r#"{"error": {"code": "TOTALLY_UNKNOWN", "message": "y"}}"#);
        assert_eq!(
            err,
            ApiError::Unknown {
                code: "TOTALLY_UNKNOWN".into(),
                message: "y".into()
            }
        );
    }

    #[test]
    fn unknown_error_code_is_unclassified() {
        let err = error(500, r#"{"error": {"code": "UNKNOWN_ERROR", "message": "boom"}}"#);
        assert_eq!(
            err,
            ApiError::Unknown {
                code: "UNKNOWN_ERROR".into(),
                message: "boom".into()
            }
        );
    }

    #[test]
    fn structured_rate_limit_carries_retry_after() {
        let err = error(
            429,
            r#"{"error": {"code": "RATE_LIMIT_EXCEEDED", "message": "slow down", "retryAfter": 12}}"#,
        );
        assert_eq!(
            err,
            ApiError::RateLimited {
                retry_after: Some(12),
                message: "slow down".into()
            }
        );
    }

    #[test]
    fn legacy_rate_limit_string_is_supported() {
        let err = error(429, r#"{"error": "Too Many Requests", "message": "Rate limit"}"#);
        assert_eq!(
            err,
            ApiError::RateLimited {
                retry_after: None,
                message: "Rate limit".into()
            }
        );

        let err = error(429, r#"{"error": "Too Many Requests", "retryAfter": "7"}"#);
        assert!(matches!(
            err,
            ApiError::RateLimited {
                retry_after: Some(7),
                ..
            }
        ));
    }

    #[test]
    fn other_string_error_is_unknown() {
        let err = error(400, r#"{"error": "Bad Request", "message": "nope"}"#);
        assert_eq!(
            err,
            ApiError::Unknown {
                code: "Bad Request".into(),
                message: "nope".into()
            }
        );
    }

    #[test]
    fn type_key_is_params_validation() {
        let err = error(
            422,
            r#"{"type": "uuid", "on": "postId", "found": "not-a-uuid"}"#,
        );
        assert_eq!(
            err,
            ApiError::ParamsValidation {
                field: "postId".into(),
                expected: "uuid".into(),
                found: "not-a-uuid".into()
            }
        );
    }

    #[test]
    fn params_validation_renders_non_string_found() {
        let err = error(422, r#"{"type": "string", "on": "content", "found": 42}"#);
        assert!(matches!(
            err,
            ApiError::ParamsValidation { ref found, .. } if found == "42"
        ));
    }

    #[test]
    fn plain_json_success_is_returned_unmodified() {
        let body = r#"{"data": {"id": 1}, "message": "ok"}"#;
        let response = classify(200, body).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, body);
    }

    #[test]
    fn empty_204_passes_through() {
        let response = classify(204, "").unwrap();
        assert_eq!(response.status, 204);
    }

    #[test]
    fn unparseable_body_is_unknown() {
        let err = error(200, "<html>oops</html>");
        assert_eq!(
            err,
            ApiError::Unknown {
                code: "UNKNOWN".into(),
                message: "<html>oops</html>".into()
            }
        );
        assert!(matches!(error(502, "Bad Gateway"), ApiError::Unknown { .. }));
    }

    #[test]
    fn error_status_without_envelope_falls_back_on_status() {
        assert_eq!(error(401, "{}"), ApiError::Unauthorized);
        assert!(matches!(error(403, "{}"), ApiError::Forbidden { .. }));
        assert!(matches!(error(500, "{}"), ApiError::ServerError { .. }));
        assert!(matches!(
            error(418, "[]"),
            ApiError::Unknown { ref code, .. } if code == "418"
        ));
    }

    #[test]
    fn standard_table_covers_required_codes() {
        for code in [
            "UNAUTHORIZED",
            "SESSION_NOT_FOUND",
            "SESSION_REVOKED",
            "SESSION_EXPIRED",
            "REFRESH_TOKEN_MISSING",
            "INVALID_PASSWORD",
            "INVALID_OLD_PASSWORD",
            "SAME_PASSWORD",
            "FORBIDDEN",
            "VALIDATION_ERROR",
            "NOT_PINNED",
            "CONFLICT",
            "RATE_LIMIT_EXCEEDED",
            "NOT_FOUND",
            "UNKNOWN_ERROR",
            "SERVER_ERROR",
            "UPLOAD_ERROR",
            "USER_BLOCKED",
        ] {
            assert!(CODE_TABLE.lookup(code).is_some(), "missing {code}");
        }
        assert_eq!(CODE_TABLE.len(), 18);
    }

    #[test]
    fn custom_table_is_honoured() {
        static TABLE: LazyLock<CodeTable> =
            LazyLock::new(|| CodeTable::from_entries([("GONE", ErrorKind::NotFound)]));
        let classifier = ErrorClassifier::new(&TABLE);

        let err = classifier
            .classify(HttpResponse {
                status: 410,
                body: r#"{"error": {"code": "GONE", "message": "bye"}}"#.into(),
            })
            .unwrap_err();
        assert_eq!(err, ApiError::NotFound { message: "bye".into() });

        let err = classifier
            .classify(HttpResponse {
                status: 404,
                body: r#"{"error": {"code": "NOT_FOUND", "message": "x"}}"#.into(),
            })
            .unwrap_err();
        assert!(matches!(err, ApiError::Unknown { .. }));
    }
}
