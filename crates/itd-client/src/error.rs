//! Error types for the ITD client
//!
//! Remote failures are classified into [`ApiError`]. Network failures stay
//! [`TransportError`] and are never reclassified as remote errors.

use thiserror::Error;

use crate::auth::MalformedToken;

/// Coarse grouping of [`ApiError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Credential problems. Only `Unauthorized` is recovered automatically.
    Auth,
    /// The request itself was rejected; retrying unchanged will fail again
    ClientInput,
    /// The target resource is missing or in the wrong state
    ResourceState,
    /// Server-side throttling or overload
    Throttling,
    /// Anything the code table does not know about
    Unclassified,
}

/// A failure reported by the remote API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("unauthorized: access token expired or invalid")]
    Unauthorized,
    #[error("refresh token does not exist")]
    TokenNotFound,
    #[error("refresh token has been revoked")]
    TokenRevoked,
    #[error("refresh token is missing")]
    TokenMissing,
    #[error("refresh token has expired")]
    TokenExpired,

    #[error("validation failed: {detail}")]
    Validation { detail: String },
    #[error("invalid value for `{field}`: expected {expected}, found {found}")]
    ParamsValidation {
        field: String,
        expected: String,
        found: String,
    },
    #[error("request entity too large")]
    TooLarge,
    #[error("password does not meet the requirements")]
    InvalidPassword,
    #[error("old password is incorrect")]
    InvalidOldPassword,
    #[error("new password must differ from the current one")]
    SamePassword,

    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String },
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("post is not pinned: {message}")]
    NotPinned { message: String },
    #[error("user is blocked: {message}")]
    UserBlocked { message: String },

    #[error("rate limited (retry after {retry_after:?}s): {message}")]
    RateLimited {
        retry_after: Option<u64>,
        message: String,
    },
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("gateway timeout")]
    GatewayTimeout,

    #[error("upload failed: {message}")]
    Upload { message: String },
    #[error("server error: {message}")]
    ServerError { message: String },
    #[error("unknown error {code}: {message}")]
    Unknown { code: String, message: String },
}

impl ApiError {
    /// Returns the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized
            | Self::TokenNotFound
            | Self::TokenRevoked
            | Self::TokenMissing
            | Self::TokenExpired => ErrorCategory::Auth,
            Self::Validation { .. }
            | Self::ParamsValidation { .. }
            | Self::TooLarge
            | Self::InvalidPassword
            | Self::InvalidOldPassword
            | Self::SamePassword
            | Self::Upload { .. } => ErrorCategory::ClientInput,
            Self::NotFound { .. }
            | Self::Forbidden { .. }
            | Self::Conflict { .. }
            | Self::NotPinned { .. }
            | Self::UserBlocked { .. } => ErrorCategory::ResourceState,
            Self::RateLimited { .. } | Self::MethodNotAllowed | Self::GatewayTimeout => {
                ErrorCategory::Throttling
            }
            Self::ServerError { .. } | Self::Unknown { .. } => ErrorCategory::Unclassified,
        }
    }

    /// Wire code the server uses for this error
    pub fn code(&self) -> &str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::TokenNotFound => "SESSION_NOT_FOUND",
            Self::TokenRevoked => "SESSION_REVOKED",
            Self::TokenMissing => "REFRESH_TOKEN_MISSING",
            Self::TokenExpired => "SESSION_EXPIRED",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::ParamsValidation { .. } => "PARAMS_VALIDATION",
            Self::TooLarge => "413",
            Self::InvalidPassword => "INVALID_PASSWORD",
            Self::InvalidOldPassword => "INVALID_OLD_PASSWORD",
            Self::SamePassword => "SAME_PASSWORD",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::Conflict { .. } => "CONFLICT",
            Self::NotPinned { .. } => "NOT_PINNED",
            Self::UserBlocked { .. } => "USER_BLOCKED",
            Self::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            Self::MethodNotAllowed => "405",
            Self::GatewayTimeout => "504",
            Self::Upload { .. } => "UPLOAD_ERROR",
            Self::ServerError { .. } => "SERVER_ERROR",
            Self::Unknown { code, .. } => code,
        }
    }

    /// Returns true for errors that invalidate the refresh token itself
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            Self::TokenNotFound | Self::TokenRevoked | Self::TokenMissing | Self::TokenExpired
        )
    }

    pub(crate) fn validation(detail: impl Into<String>) -> Self {
        Self::Validation {
            detail: detail.into(),
        }
    }
}

/// Network-level failure, distinct from anything the server said
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("session is closed")]
    Closed,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("malformed event stream: {0}")]
    Stream(String),
    #[error("HTTP transport error: {0}")]
    Http(#[source] reqwest::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}

/// Any failure the client can produce
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed access token: {0}")]
    MalformedToken(#[from] MalformedToken),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl Error {
    /// Returns the remote error, if this is one
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if the server rejected the access token
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api(ApiError::Unauthorized))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
