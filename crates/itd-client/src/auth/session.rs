//! Access token lifecycle
//!
//! A [`Session`] owns the refresh token, the current access token and the
//! transport. Refreshes are serialised by a mutex and tagged with a
//! generation number, so callers that saw the same stale token share a
//! single exchange.

use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::auth::token::{self, EXPIRED_SENTINEL};
use crate::config::SessionOptions;
use crate::dispatch::Dispatcher;
use crate::error::{ApiError, Error, Result, TransportError};
use crate::http::{HttpClient, ReqwestClient};
use crate::request::ApiRequest;

const REFRESH_PATH: &str = "api/v1/auth/refresh";
const LOGOUT_PATH: &str = "api/v1/auth/logout";
const REFRESH_COOKIE: &str = "refresh_token";

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No access token obtained yet
    Unauthenticated,
    /// Holding an access token from a successful refresh
    Authenticated,
    /// Transport released; every further call fails
    Closed,
}

#[derive(Debug)]
struct TokenState {
    access_token: String,
    generation: u64,
    status: SessionState,
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(rename = "accessToken", default)]
    access_token: String,
}

/// Owns the credential pair and the transport they are used on
pub struct Session<H: HttpClient = ReqwestClient> {
    dispatcher: Dispatcher<H>,
    refresh_token: String,
    check_expiry: bool,
    state: RwLock<TokenState>,
    refresh_lock: Mutex<()>,
}

impl<H: HttpClient> Session<H> {
    /// Creates a session; fails with `TokenMissing` on an empty refresh token
    ///
    /// No request is made until the first call needs an access token.
    pub fn new(refresh_token: impl Into<String>, http: H, options: &SessionOptions) -> Result<Self> {
        let refresh_token = refresh_token.into();
        if refresh_token.is_empty() {
            return Err(ApiError::TokenMissing.into());
        }

        let dispatcher = Dispatcher::new(
            http,
            options.pacing.clone().into_pacer(),
            options.base_url.clone(),
            options.timeout,
        );

        Ok(Self {
            dispatcher,
            refresh_token,
            check_expiry: options.check_token_expiry,
            state: RwLock::new(TokenState {
                access_token: EXPIRED_SENTINEL.to_string(),
                generation: 0,
                status: SessionState::Unauthenticated,
            }),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Seeds a previously obtained access token
    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        if !access_token.is_empty() {
            let state = self.state.get_mut();
            state.access_token = access_token;
            state.status = SessionState::Authenticated;
        }
        self
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.status
    }

    /// Current access token; the expired placeholder before the first refresh
    pub async fn access_token(&self) -> String {
        self.state.read().await.access_token.clone()
    }

    /// Exchanges the refresh token for a new access token
    pub async fn refresh(&self) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;
        self.exchange().await
    }

    /// Refreshes on behalf of a caller that saw token generation `seen`
    ///
    /// If another caller already replaced that generation, its token is
    /// returned without a second exchange.
    pub(crate) async fn refresh_stale(&self, seen: u64) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;
        {
            let state = self.state.read().await;
            if state.status == SessionState::Closed {
                return Err(TransportError::Closed.into());
            }
            if state.generation != seen {
                return Ok(state.access_token.clone());
            }
        }
        self.exchange().await
    }

    /// Refreshes first if expiry checks are on and the token is expired
    ///
    /// `now` is a unix timestamp in seconds.
    pub async fn ensure_valid(&self, now: i64) -> Result<()> {
        if !self.check_expiry {
            return Ok(());
        }
        self.refresh_if_expired(now).await
    }

    /// Refreshes if the current access token is expired at `now`
    pub(crate) async fn refresh_if_expired(&self, now: i64) -> Result<()> {
        let (access_token, generation) = self.snapshot().await?;
        if token::is_expired(&access_token, now)? {
            self.refresh_stale(generation).await?;
        }
        Ok(())
    }

    /// Current token and its generation, for a single dispatch attempt
    pub(crate) async fn snapshot(&self) -> Result<(String, u64)> {
        let state = self.state.read().await;
        if state.status == SessionState::Closed {
            return Err(TransportError::Closed.into());
        }
        Ok((state.access_token.clone(), state.generation))
    }

    /// Revokes the refresh token on the server
    ///
    /// Sent with the cookie only, so it works whatever state the access
    /// token is in.
    pub async fn logout(&self) -> Result<()> {
        self.snapshot().await?;
        let request = ApiRequest::post(LOGOUT_PATH).cookie(REFRESH_COOKIE, &self.refresh_token);
        self.dispatcher.dispatch(&request, None).await?;
        info!("logged out");
        Ok(())
    }

    /// Releases the transport; later calls fail with `TransportError::Closed`
    pub async fn close(&self) {
        {
            let mut state = self.state.write().await;
            if state.status == SessionState::Closed {
                return;
            }
            state.status = SessionState::Closed;
        }
        self.dispatcher.http().close().await;
        info!("session closed");
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher<H> {
        &self.dispatcher
    }

    async fn exchange(&self) -> Result<String> {
        if self.refresh_token.is_empty() {
            return Err(ApiError::TokenMissing.into());
        }
        self.snapshot().await?;

        let request = ApiRequest::post(REFRESH_PATH).cookie(REFRESH_COOKIE, &self.refresh_token);
        let response = self
            .dispatcher
            .dispatch(&request, None)
            .await
            .map_err(remap_refresh_error)?;

        let RefreshResponse { access_token } = response.json()?;
        if access_token.is_empty() {
            return Err(ApiError::Unknown {
                code: "INVALID_RESPONSE".into(),
                message: "refresh response has no access token".into(),
            }
            .into());
        }

        let mut state = self.state.write().await;
        if state.status == SessionState::Closed {
            return Err(TransportError::Closed.into());
        }
        state.access_token.clone_from(&access_token);
        state.generation += 1;
        state.status = SessionState::Authenticated;
        info!(generation = state.generation, "access token refreshed");

        Ok(access_token)
    }
}

/// Errors from the refresh call describe the refresh token, not the request
fn remap_refresh_error(err: Error) -> Error {
    match err {
        Error::Api(ApiError::Unauthorized) => ApiError::TokenExpired.into(),
        Error::Api(ApiError::NotFound { .. }) => ApiError::TokenNotFound.into(),
        other => other,
    }
}
