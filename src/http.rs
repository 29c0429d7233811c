//! Retry policy, header lists and API error decoding for the reqwest transport.

use std::time::Duration;

use reqwest::{header::HeaderMap, Method, StatusCode};
use serde_json::Value;

use crate::errors::{APIError, RetryMetadata, TransportErrorKind};

/// Retry/backoff policy of [`crate::ReqwestTransport`].
///
/// The default makes a single attempt. Retrying is something a host opts into;
/// the executor never repeats a login or an item call on its own.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Chat turns and entry creation are POSTs; replaying them can duplicate work.
    pub retry_post: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
            retry_post: false,
        }
    }
}

impl RetryConfig {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    fn covers(&self, method: &Method) -> bool {
        *method != Method::POST || self.retry_post
    }

    /// 5xx, 408 and 429 are worth another attempt.
    pub fn should_retry_status(&self, method: &Method, status: StatusCode) -> bool {
        let transient = status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT;
        transient && self.covers(method)
    }

    pub fn should_retry_error(&self, method: &Method, err: &reqwest::Error) -> bool {
        TransportErrorKind::classify(err).is_transient() && self.covers(method)
    }

    /// Delay before attempt `attempt + 1`: doubles from `base_backoff`, capped at
    /// `max_backoff`, then jittered into the upper half of that window.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        let window = self
            .base_backoff
            .checked_mul(1u32 << doublings)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff);
        let floor = window / 2;
        let spread = window.saturating_sub(floor).as_millis() as u64;
        floor + Duration::from_millis(fastrand::u64(0..=spread))
    }
}

/// Ordered request headers; names compare case-insensitively.
///
/// Entries with a blank name or value are skipped when a request is built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderList(Vec<HeaderEntry>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn is_valid(&self) -> bool {
        !self.key.trim().is_empty() && !self.value.trim().is_empty()
    }
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a header, replacing any entry with the same name.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.0.retain(|entry| !entry.key.eq_ignore_ascii_case(&key));
        self.0.push(HeaderEntry {
            key,
            value: value.into(),
        });
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|entry| entry.key.eq_ignore_ascii_case(key))
            .map(|entry| entry.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub(crate) fn request_id(headers: &HeaderMap) -> Option<String> {
    ["x-request-id", "x-correlation-id"].iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    })
}

/// Decode a non-2xx response.
///
/// Understands `{"error": {"message", "code"}}` as well as a flat `message`,
/// `error` or `msg` string. Any other body becomes the message verbatim, and an
/// empty one falls back to the status reason.
pub(crate) fn api_error(
    status: StatusCode,
    headers: &HeaderMap,
    body: String,
    retries: Option<RetryMetadata>,
) -> APIError {
    let parsed = serde_json::from_str::<Value>(&body).ok();
    let (code, message) = parsed
        .as_ref()
        .and_then(error_fields)
        .unwrap_or_else(|| match body.trim() {
            "" => (
                None,
                status.canonical_reason().unwrap_or("request failed").to_string(),
            ),
            text => (None, text.to_string()),
        });
    let request_id = parsed
        .as_ref()
        .and_then(|value| value.get("requestId").or_else(|| value.get("request_id")))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| request_id(headers));

    APIError {
        status: status.as_u16(),
        code,
        message,
        request_id,
        retries,
        raw_body: (!body.trim().is_empty()).then_some(body),
    }
}

fn error_fields(body: &Value) -> Option<(Option<String>, String)> {
    let string = |value: &Value| value.as_str().map(str::to_owned);
    if let Some(nested) = body.get("error").filter(|value| value.is_object()) {
        let message = nested.get("message").and_then(string)?;
        return Some((nested.get("code").and_then(string), message));
    }
    let message = ["message", "error", "msg"]
        .iter()
        .find_map(|key| body.get(*key).and_then(string))?;
    Some((body.get("code").and_then(string), message))
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    fn decode(status: StatusCode, body: &str) -> APIError {
        api_error(status, &HeaderMap::new(), body.to_string(), None)
    }

    #[test]
    fn backoff_doubles_within_the_cap() {
        let retry = RetryConfig {
            max_attempts: 4,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
            retry_post: false,
        };
        for _ in 0..20 {
            let first = retry.backoff_delay(1);
            assert!(first >= Duration::from_millis(50) && first <= Duration::from_millis(100));
            let capped = retry.backoff_delay(8);
            assert!(capped >= Duration::from_millis(150) && capped <= Duration::from_millis(300));
        }
    }

    #[test]
    fn posts_are_only_retried_on_request() {
        let retry = RetryConfig::with_attempts(3);
        assert!(retry.should_retry_status(&Method::GET, StatusCode::BAD_GATEWAY));
        assert!(retry.should_retry_status(&Method::DELETE, StatusCode::TOO_MANY_REQUESTS));
        assert!(!retry.should_retry_status(&Method::GET, StatusCode::NOT_FOUND));
        assert!(!retry.should_retry_status(&Method::POST, StatusCode::BAD_GATEWAY));

        let retry = RetryConfig {
            retry_post: true,
            ..retry
        };
        assert!(retry.should_retry_status(&Method::POST, StatusCode::BAD_GATEWAY));
        assert_eq!(RetryConfig::default().max_attempts, 1);
    }

    #[test]
    fn header_list_replaces_by_name() {
        let mut headers = HeaderList::new().with("Authorization", "Bearer a");
        headers.insert("authorization", "Bearer b");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("AUTHORIZATION"), Some("Bearer b"));
        assert!(!HeaderEntry {
            key: " ".into(),
            value: "x".into()
        }
        .is_valid());
    }

    #[test]
    fn decodes_nested_error_object() {
        let err = decode(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"code":"invalid_app_password","message":"Invalid app password"}}"#,
        );
        assert_eq!(err.status, 401);
        assert_eq!(err.code.as_deref(), Some("invalid_app_password"));
        assert_eq!(err.message, "Invalid app password");
    }

    #[test]
    fn decodes_flat_messages() {
        let err = decode(StatusCode::NOT_FOUND, r#"{"error":"Not found","requestId":"req_9"}"#);
        assert_eq!(err.message, "Not found");
        assert_eq!(err.request_id.as_deref(), Some("req_9"));

        let err = decode(StatusCode::UNAUTHORIZED, r#"{"msg":"Token has expired"}"#);
        assert_eq!(err.message, "Token has expired");
    }

    #[test]
    fn keeps_unrecognised_bodies_verbatim() {
        let err = decode(StatusCode::BAD_GATEWAY, "upstream unavailable");
        assert_eq!(err.message, "upstream unavailable");
        assert_eq!(err.raw_body.as_deref(), Some("upstream unavailable"));

        let err = decode(StatusCode::BAD_REQUEST, r#"{"detail":1}"#);
        assert_eq!(err.message, r#"{"detail":1}"#);
    }

    #[test]
    fn empty_body_uses_status_reason_and_header_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Request-Id", HeaderValue::from_static("req_1"));
        let err = api_error(StatusCode::INTERNAL_SERVER_ERROR, &headers, String::new(), None);
        assert_eq!(err.message, "Internal Server Error");
        assert_eq!(err.request_id.as_deref(), Some("req_1"));
        assert!(err.raw_body.is_none());
    }
}
