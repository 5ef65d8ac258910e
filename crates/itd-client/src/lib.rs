//! Async client for the ITD social network REST API
//!
//! Start with [`ItdClient::new`] and a refresh token. Access tokens are
//! obtained, cached and renewed by the client; requests are paced to stay
//! under the server's rate limit.

pub mod auth;
pub mod classify;
pub mod client;
pub mod config;
mod dispatch;
pub mod error;
pub mod executor;
pub mod http;
pub mod pacer;
pub mod request;
pub mod stream;
pub mod time;
pub mod types;

pub use auth::{Session, SessionState};
pub use client::{ItdClient, NewPost};
pub use config::{ClientConfig, ConfigManager, SessionOptions, DEFAULT_DOMAIN};
pub use error::{ApiError, Error, ErrorCategory, Result, TransportError};
pub use pacer::{Pacing, RequestPacer};
pub use request::ApiRequest;
pub use stream::{NotificationStream, StreamEvent};
