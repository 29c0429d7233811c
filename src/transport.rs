//! HTTP transport seam.
//!
//! The executor never talks to `reqwest` directly. It hands an [`HttpRequest`]
//! to a [`Transport`] and gets parsed JSON back, so hosts can plug in their own
//! HTTP layer (retries, proxies, deadlines) and tests can use an in-memory one.

use std::{
    future::Future,
    pin::Pin,
    time::{Duration, Instant},
};

use reqwest::{
    header::{HeaderName, HeaderValue, ACCEPT},
    Method,
};
use serde_json::Value;
use tokio::time::sleep;

use crate::{
    core::AttemptLog,
    errors::{Error, Result, TransportError, TransportErrorKind},
    http::{api_error, request_id, HeaderList, RetryConfig},
    telemetry::{HttpRequestMetrics, MetricsCallbacks, RequestContext, Telemetry},
};

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

/// A fully built outbound call.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderList,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderList::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {token}"))
    }

    /// Value of the first header matching `key` (case-insensitive).
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }
}

/// Issues HTTP calls and returns the parsed JSON body.
///
/// Implementations fail with [`Error::Api`] on non-2xx responses and
/// [`Error::Transport`] on network failures. An empty 2xx body is `Value::Null`.
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// Options for [`ReqwestTransport`].
#[derive(Clone, Debug, Default)]
pub struct TransportOptions {
    /// Overall per-request timeout; `None` leaves the reqwest client's setting.
    pub timeout: Option<Duration>,
    pub retry: RetryConfig,
    /// Headers added to every request before the request's own headers.
    pub default_headers: Option<HeaderList>,
    pub metrics: Option<MetricsCallbacks>,
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    timeout: Option<Duration>,
    retry: RetryConfig,
    default_headers: Option<HeaderList>,
    telemetry: Telemetry,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client, options: TransportOptions) -> Self {
        Self {
            http,
            timeout: options.timeout,
            retry: options.retry,
            default_headers: options.default_headers,
            telemetry: Telemetry::new(options.metrics),
        }
    }

    fn build(&self, request: &HttpRequest) -> Result<reqwest::RequestBuilder> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|err| Error::Config(format!("invalid url {}: {err}", request.url)))?;
        // One value per name: request headers win over defaults, defaults over Accept.
        let mut headers = HeaderList::new().with(ACCEPT.as_str(), "application/json");
        for entry in self.default_headers.iter().flat_map(HeaderList::iter) {
            headers.insert(entry.key.clone(), entry.value.clone());
        }
        for entry in request.headers.iter() {
            headers.insert(entry.key.clone(), entry.value.clone());
        }
        let mut builder =
            apply_header_list(self.http.request(request.method.clone(), url), &headers)?;
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }

    async fn execute(&self, request: HttpRequest) -> Result<Value> {
        let builder = self.build(&request)?;
        let path = reqwest::Url::parse(&request.url)
            .map(|url| url.path().to_string())
            .unwrap_or_default();
        let ctx = RequestContext::new(request.method.as_str(), path);
        let resp = self.send_with_retry(builder, &request.method, ctx).await?;
        let text = resp.text().await.map_err(|err| {
            Error::Transport(TransportError::from_reqwest(err, None))
        })?;
        Ok(parse_body(text))
    }

    /// Send under the retry policy and return the first 2xx response.
    async fn send_with_retry(
        &self,
        builder: reqwest::RequestBuilder,
        method: &Method,
        ctx: RequestContext,
    ) -> Result<reqwest::Response> {
        let max_attempts = self.retry.max_attempts.max(1);
        let started = Instant::now();
        let mut log = AttemptLog::default();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let last = attempt >= max_attempts;
            let pending = builder
                .try_clone()
                .ok_or_else(|| {
                    Error::Transport(TransportError::new(
                        TransportErrorKind::Request,
                        "request body cannot be replayed",
                    ))
                })?
                .send();
            #[cfg(feature = "tracing")]
            let pending = tracing::Instrument::instrument(
                pending,
                tracing::debug_span!(
                    "agent700.http",
                    method = %ctx.method,
                    path = %ctx.path,
                    attempt
                ),
            );

            let err = match pending.await {
                Ok(resp) if resp.status().is_success() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        status = resp.status().as_u16(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "request completed"
                    );
                    let id = request_id(resp.headers());
                    self.report(&ctx, started, Some(resp.status().as_u16()), None, &log, id);
                    return Ok(resp);
                }
                Ok(resp) => {
                    let status = resp.status();
                    log.failed_status(attempt, status);
                    if !last && self.retry.should_retry_status(method, status) {
                        sleep(self.retry.backoff_delay(attempt)).await;
                        continue;
                    }
                    let headers = resp.headers().clone();
                    let body = resp.text().await.unwrap_or_default();
                    let err = api_error(status, &headers, body, log.retries());
                    self.report(
                        &ctx,
                        started,
                        Some(err.status),
                        Some(err.message.clone()),
                        &log,
                        err.request_id.clone(),
                    );
                    Error::Api(err)
                }
                Err(err) => {
                    log.failed_error(attempt, &err);
                    if !last && self.retry.should_retry_error(method, &err) {
                        sleep(self.retry.backoff_delay(attempt)).await;
                        continue;
                    }
                    self.report(&ctx, started, None, Some(err.to_string()), &log, None);
                    Error::Transport(TransportError::from_reqwest(err, log.retries()))
                }
            };

            #[cfg(feature = "tracing")]
            tracing::warn!(
                method = %ctx.method,
                path = %ctx.path,
                attempt,
                error = %err,
                "request failed"
            );
            return Err(err);
        }
    }

    fn report(
        &self,
        ctx: &RequestContext,
        started: Instant,
        status: Option<u16>,
        error: Option<String>,
        log: &AttemptLog,
        request_id: Option<String>,
    ) {
        if !self.telemetry.tracks_http() {
            return;
        }
        self.telemetry.http(HttpRequestMetrics {
            latency: started.elapsed(),
            status,
            error,
            retries: log.retries(),
            context: ctx.clone().answered_by(request_id),
        });
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
        Box::pin(self.execute(request))
    }
}

fn apply_header_list(
    mut builder: reqwest::RequestBuilder,
    headers: &HeaderList,
) -> Result<reqwest::RequestBuilder> {
    for entry in headers.iter() {
        if !entry.is_valid() {
            continue;
        }
        let name = HeaderName::from_bytes(entry.key.trim().as_bytes())
            .map_err(|err| Error::Config(format!("invalid header name: {err}")))?;
        let val = HeaderValue::from_str(entry.value.trim())
            .map_err(|err| Error::Config(format!("invalid header value: {err}")))?;
        builder = builder.header(name, val);
    }
    Ok(builder)
}

/// Empty bodies become `null`; bodies that are not JSON are kept as a string.
fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}
