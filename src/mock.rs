#![cfg(any(test, feature = "mock"))]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use serde_json::Value;

use crate::{
    errors::{Error, Result, TransportError, TransportErrorKind},
    transport::{HttpRequest, Transport, TransportFuture},
};

/// In-memory [`Transport`] for offline tests.
///
/// Responses are served in the order they were queued; every request is
/// recorded so tests can assert on the exact calls made.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    responses: Mutex<VecDeque<Result<Value>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful login returning `token`.
    pub fn with_login(self, token: &str) -> Self {
        self.with_response(serde_json::json!({ "accessToken": token }))
    }

    pub fn with_response(self, body: Value) -> Self {
        self.push(Ok(body));
        self
    }

    pub fn with_error(self, err: Error) -> Self {
        self.push(Err(err));
        self
    }

    pub fn push(&self, response: Result<Value>) {
        self.inner
            .responses
            .lock()
            .expect("lock poisoned")
            .push_back(response);
    }

    /// All requests sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner.requests.lock().expect("lock poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.inner.requests.lock().expect("lock poisoned").len()
    }

    fn next(&self, request: HttpRequest) -> Result<Value> {
        self.inner
            .requests
            .lock()
            .expect("lock poisoned")
            .push(request);
        self.inner
            .responses
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::new(TransportErrorKind::Other, "no mock response queued").into())
            })
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
        let result = self.next(request);
        Box::pin(async move { result })
    }
}
