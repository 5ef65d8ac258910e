//! Authenticated request execution
//!
//! [`RequestExecutor::send`] runs the expiry pre-check, dispatches with the
//! current bearer token and, if the server answers `Unauthorized`, refreshes
//! once and repeats the dispatch exactly once.

use tracing::warn;

use crate::auth::Session;
use crate::config::SessionOptions;
use crate::error::Result;
use crate::http::{HttpClient, HttpResponse, ReqwestClient, StreamResponse};
use crate::request::ApiRequest;
use crate::time::{Clock, SystemClock};

pub struct RequestExecutor<H: HttpClient = ReqwestClient> {
    session: Session<H>,
    clock: Box<dyn Clock>,
    retry_on_unauthorized: bool,
}

impl<H: HttpClient> RequestExecutor<H> {
    pub fn new(session: Session<H>, options: &SessionOptions) -> Self {
        Self {
            session,
            clock: Box::new(SystemClock),
            retry_on_unauthorized: options.refresh_on_unauthorized,
        }
    }

    /// Replaces the clock used for expiry pre-checks
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn session(&self) -> &Session<H> {
        &self.session
    }

    /// Sends a request with transparent re-authentication
    ///
    /// Transport failures are returned as is and never retried.
    pub async fn send(&self, request: &ApiRequest) -> Result<HttpResponse> {
        self.session.ensure_valid(self.clock.unix_now()).await?;

        let (token, generation) = self.session.snapshot().await?;
        let dispatcher = self.session.dispatcher();

        match dispatcher.dispatch(request, Some(&token)).await {
            Err(err) if self.retry_on_unauthorized && err.is_unauthorized() => {
                warn!(path = %request.path, "access token rejected, refreshing once");
                let token = self.session.refresh_stale(generation).await?;
                dispatcher.dispatch(request, Some(&token)).await
            }
            result => result,
        }
    }

    /// Opens a streaming response after the expiry pre-check
    ///
    /// The pre-check always runs here, whatever the session's setting. No
    /// retry is attempted once the stream is open.
    pub async fn open_stream(&self, request: &ApiRequest) -> Result<StreamResponse> {
        self.session.refresh_if_expired(self.clock.unix_now()).await?;

        let (token, _) = self.session.snapshot().await?;
        self.session.dispatcher().open_stream(request, Some(&token)).await
    }

    pub async fn close(&self) {
        self.session.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::testing::make_token;
    use crate::error::{ApiError, Error, TransportError};
    use crate::http::mock::{MockHttpClient, MockOutcome};
    use crate::pacer::Pacing;
    use crate::time::FixedClock;
    use chrono::{DateTime, Utc};
    use reqwest::header::AUTHORIZATION;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const REFRESH_URL: &str = "https://api.test/api/v1/auth/refresh";
    const ME_URL: &str = "https://api.test/api/users/me";
    const NOW: i64 = 1_700_000_000;

    fn options() -> SessionOptions {
        SessionOptions::default()
            .base_url("https://api.test")
            .pacing(Pacing::Disabled)
    }

    fn executor_with(http: &MockHttpClient, options: &SessionOptions) -> RequestExecutor<MockHttpClient> {
        let session = Session::new("refresh-1", http.clone(), options)
            .unwrap()
            .with_access_token(make_token(NOW + 60));
        RequestExecutor::new(session, options).with_clock(FixedClock::at(NOW))
    }

    fn executor(http: &MockHttpClient) -> RequestExecutor<MockHttpClient> {
        executor_with(http, &options())
    }

    fn with_refresh(http: MockHttpClient, token: &str) -> MockHttpClient {
        http.respond_json(Method::POST, REFRESH_URL, &json!({"accessToken": token}))
    }

    #[tokio::test]
    async fn unauthorized_then_success_refreshes_once() {
        let fresh = make_token(NOW + 3600);
        let http = with_refresh(
            MockHttpClient::new()
                .respond(Method::GET, ME_URL, 401, "UNAUTHORIZED")
                .respond(Method::GET, ME_URL, 200, r#"{"id": "me"}"#),
            &fresh,
        );

        let response = executor(&http).send(&ApiRequest::get("api/users/me")).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(http.count(REFRESH_URL), 1);
        assert_eq!(http.count(ME_URL), 2);

        let retried = http
            .get_requests()
            .into_iter()
            .filter(|r| r.url == ME_URL)
            .last()
            .unwrap();
        assert_eq!(retried.headers[AUTHORIZATION], format!("Bearer {fresh}").as_str());
    }

    #[tokio::test]
    async fn unauthorized_twice_surfaces_after_one_refresh() {
        let http = with_refresh(
            MockHttpClient::new().respond(Method::GET, ME_URL, 401, "UNAUTHORIZED"),
            &make_token(NOW + 3600),
        );

        let err = executor(&http)
            .send(&ApiRequest::get("api/users/me"))
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(http.count(REFRESH_URL), 1);
        assert_eq!(http.count(ME_URL), 2);
    }

    #[tokio::test]
    async fn retry_can_be_disabled() {
        let http = with_refresh(
            MockHttpClient::new().respond(Method::GET, ME_URL, 401, "UNAUTHORIZED"),
            &make_token(NOW + 3600),
        );

        let executor = executor_with(&http, &options().refresh_on_unauthorized(false));
        let err = executor.send(&ApiRequest::get("api/users/me")).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(http.count(REFRESH_URL), 0);
        assert_eq!(http.count(ME_URL), 1);
    }

    #[tokio::test]
    async fn other_errors_surface_without_refresh() {
        let http = MockHttpClient::new().respond(
            Method::GET,
            ME_URL,
            429,
            r#"{"error": {"code": "RATE_LIMIT_EXCEEDED", "message": "slow", "retryAfter": 5}}"#,
        );

        let err = executor(&http)
            .send(&ApiRequest::get("api/users/me"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Api(ApiError::RateLimited {
                retry_after: Some(5),
                ..
            })
        ));
        assert_eq!(http.count(ME_URL), 1);
        assert_eq!(http.count(REFRESH_URL), 0);
    }

    #[tokio::test]
    async fn transport_errors_are_not_retried() {
        let http = MockHttpClient::new().on(Method::GET, ME_URL, MockOutcome::Timeout);

        let err = executor(&http)
            .send(&ApiRequest::get("api/users/me"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(TransportError::Timeout)));
        assert_eq!(http.count(ME_URL), 1);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_before_dispatch() {
        let fresh = make_token(NOW + 3600);
        let http = with_refresh(
            MockHttpClient::new().respond(Method::GET, ME_URL, 200, "{}"),
            &fresh,
        );
        let session = Session::new("refresh-1", http.clone(), &options()).unwrap();
        let executor = RequestExecutor::new(session, &options()).with_clock(FixedClock::at(NOW));

        executor.send(&ApiRequest::get("api/users/me")).await.unwrap();

        let requests = http.get_requests();
        assert_eq!(requests[0].url, REFRESH_URL);
        assert_eq!(requests[1].headers[AUTHORIZATION], format!("Bearer {fresh}").as_str());
    }

    #[tokio::test]
    async fn token_expiring_next_second_counts_as_expired() {
        let http = with_refresh(
            MockHttpClient::new().respond(Method::GET, ME_URL, 200, "{}"),
            &make_token(NOW + 3600),
        );
        let session = Session::new("refresh-1", http.clone(), &options())
            .unwrap()
            .with_access_token(make_token(NOW - 1));
        let executor = RequestExecutor::new(session, &options()).with_clock(FixedClock::at(NOW));

        executor.send(&ApiRequest::get("api/users/me")).await.unwrap();
        assert_eq!(http.count(REFRESH_URL), 1);
    }

    #[tokio::test]
    async fn stream_open_always_checks_expiry() {
        let stream_url = "https://api.test/api/notifications/stream";
        let http = with_refresh(
            MockHttpClient::new().on(
                Method::GET,
                stream_url,
                MockOutcome::Stream {
                    status: 200,
                    chunks: vec![": ping\n\n".into()],
                },
            ),
            &make_token(NOW + 3600),
        );
        let options = options().check_token_expiry(false);
        let session = Session::new("refresh-1", http.clone(), &options).unwrap();
        let executor = RequestExecutor::new(session, &options).with_clock(FixedClock::at(NOW));

        let response = executor
            .open_stream(&ApiRequest::get("api/notifications/stream"))
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(http.count(REFRESH_URL), 1);
        assert!(http.get_requests()[1].timeout.is_none());
    }

    /// Reports `first` on the first reading and `later` afterwards
    struct SteppingClock {
        first: i64,
        later: i64,
        read: AtomicBool,
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let ts = if self.read.swap(true, Ordering::SeqCst) {
                self.later
            } else {
                self.first
            };
            DateTime::from_timestamp(ts, 0).unwrap_or_default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_send_and_expired_send_share_one_refresh() {
        let fresh = make_token(NOW + 3600);
        let feed_url = "https://api.test/api/posts/feed/following";
        let http = MockHttpClient::new()
            .on(
                Method::GET,
                ME_URL,
                MockOutcome::Delayed {
                    delay: Duration::from_millis(50),
                    status: 401,
                    body: "UNAUTHORIZED".into(),
                },
            )
            .respond(Method::GET, ME_URL, 200, "{}")
            .respond(Method::GET, feed_url, 200, "{}")
            .on(
                Method::POST,
                REFRESH_URL,
                MockOutcome::Delayed {
                    delay: Duration::from_millis(60),
                    status: 200,
                    body: json!({"accessToken": fresh}).to_string(),
                },
            );
        let session = Session::new("refresh-1", http.clone(), &options())
            .unwrap()
            .with_access_token(make_token(NOW + 60));
        let executor = RequestExecutor::new(session, &options()).with_clock(SteppingClock {
            first: NOW,
            later: NOW + 120,
            read: AtomicBool::new(false),
        });

        let me = ApiRequest::get("api/users/me");
        let feed = ApiRequest::get("api/posts/feed/following");
        let (rejected, expired) = tokio::join!(executor.send(&me), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            executor.send(&feed).await
        });

        assert_eq!(rejected.unwrap().status, 200);
        assert_eq!(expired.unwrap().status, 200);
        assert_eq!(http.count(REFRESH_URL), 1);

        let bearer = format!("Bearer {fresh}");
        let requests = http.get_requests();
        let retried = requests.iter().filter(|r| r.url == ME_URL).last().unwrap();
        let fed = requests.iter().find(|r| r.url == feed_url).unwrap();
        assert_eq!(retried.headers[AUTHORIZATION], bearer.as_str());
        assert_eq!(fed.headers[AUTHORIZATION], bearer.as_str());
    }

    #[tokio::test]
    async fn closed_executor_fails_fast() {
        let http = MockHttpClient::new().respond(Method::GET, ME_URL, 200, "{}");
        let executor = executor(&http);

        executor.close().await;
        let err = executor
            .send(&ApiRequest::get("api/users/me"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(TransportError::Closed)));
        assert!(http.get_requests().is_empty());
    }
}
