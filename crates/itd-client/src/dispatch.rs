//! Single-attempt dispatch: pace, send, classify

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, COOKIE};
use tracing::debug;

use crate::auth::token::add_bearer;
use crate::classify::ErrorClassifier;
use crate::error::{ApiError, Result, TransportError};
use crate::http::{HttpClient, HttpRequest, HttpResponse, StreamResponse};
use crate::pacer::RequestPacer;
use crate::request::ApiRequest;

/// Turns [`ApiRequest`]s into classified responses, one attempt each
pub(crate) struct Dispatcher<H> {
    http: H,
    pacer: Option<Arc<RequestPacer>>,
    classifier: ErrorClassifier,
    base_url: String,
    timeout: Duration,
}

impl<H: HttpClient> Dispatcher<H> {
    pub(crate) fn new(
        http: H,
        pacer: Option<Arc<RequestPacer>>,
        base_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            pacer,
            classifier: ErrorClassifier::default(),
            base_url,
            timeout,
        }
    }

    pub(crate) fn http(&self) -> &H {
        &self.http
    }

    /// Sends once, with `bearer` as the access token if given
    pub(crate) async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<HttpResponse> {
        let prepared = self.prepare(request, bearer, Some(request.timeout.unwrap_or(self.timeout)))?;
        self.pace().await;

        debug!(method = %prepared.method, url = %prepared.url, "dispatching request");
        let response = self.http.send(prepared).await?;
        debug!(status = response.status, path = %request.path, "response received");

        Ok(self.classifier.classify(response)?)
    }

    /// Opens a streaming response; a non-2xx status is classified from its body
    pub(crate) async fn open_stream(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<StreamResponse> {
        let prepared = self.prepare(request, bearer, request.timeout)?;
        self.pace().await;

        debug!(url = %prepared.url, "opening stream");
        let response = self.http.open_stream(prepared).await?;
        if response.is_success() {
            return Ok(response);
        }

        let status = response.status;
        let body = tokio::time::timeout(self.timeout, response.into_text())
            .await
            .map_err(|_| TransportError::Timeout)??;
        match self.classifier.classify(HttpResponse { status, body }) {
            Err(err) => Err(err.into()),
            Ok(response) => Err(ApiError::Unknown {
                code: status.to_string(),
                message: response.body,
            }
            .into()),
        }
    }

    async fn pace(&self) {
        if let Some(pacer) = &self.pacer {
            pacer.interval().await;
        }
    }

    fn prepare(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<HttpRequest, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = bearer {
            headers.insert(AUTHORIZATION, header_value(&add_bearer(token))?);
        }
        if let Some(cookies) = request.cookie_header() {
            headers.insert(COOKIE, header_value(&cookies)?);
        }

        Ok(HttpRequest {
            method: request.method.clone(),
            url: self.url(&request.path),
            headers,
            query: request.query.clone(),
            json: request.json.clone(),
            files: request.files.clone(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|err| TransportError::InvalidRequest(format!("invalid header value: {err}")))
}
