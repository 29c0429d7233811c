//! Metrics hooks for hosts that do not use `tracing`.

use std::{fmt, sync::Arc, time::Duration};

use crate::{errors::RetryMetadata, isolation::UnitState};

/// Callbacks a host registers to observe HTTP calls and settled items.
#[derive(Clone, Default)]
pub struct MetricsCallbacks {
    pub http_request: Option<Arc<dyn Fn(HttpRequestMetrics) + Send + Sync>>,
    pub item_settled: Option<Arc<dyn Fn(ItemMetrics) + Send + Sync>>,
}

impl fmt::Debug for MetricsCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCallbacks")
            .field("http_request", &self.http_request.is_some())
            .field("item_settled", &self.item_settled.is_some())
            .finish()
    }
}

/// Method and path of an HTTP call, plus the server's request id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            request_id: None,
        }
    }

    pub(crate) fn answered_by(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id.filter(|id| !id.trim().is_empty());
        self
    }
}

/// One finished HTTP call, after any retries.
#[derive(Clone, Debug)]
pub struct HttpRequestMetrics {
    pub latency: Duration,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub retries: Option<RetryMetadata>,
    pub context: RequestContext,
}

/// One work unit after the failure policy has dealt with it.
#[derive(Clone, Debug)]
pub struct ItemMetrics {
    /// 1-based item number.
    pub item: usize,
    /// Operation label such as `Entry:Get`, or `resource:verb` when unknown.
    pub operation: String,
    /// `Done`, `Recorded` or `Aborted`.
    pub state: UnitState,
    /// Output items appended for this unit.
    pub produced: usize,
    pub latency: Duration,
}

#[derive(Clone, Default)]
pub(crate) struct Telemetry(MetricsCallbacks);

impl Telemetry {
    pub(crate) fn new(callbacks: Option<MetricsCallbacks>) -> Self {
        Self(callbacks.unwrap_or_default())
    }

    pub(crate) fn tracks_http(&self) -> bool {
        self.0.http_request.is_some()
    }

    pub(crate) fn http(&self, metrics: HttpRequestMetrics) {
        if let Some(cb) = &self.0.http_request {
            cb(metrics);
        }
    }

    pub(crate) fn tracks_items(&self) -> bool {
        self.0.item_settled.is_some()
    }

    pub(crate) fn item(&self, metrics: ItemMetrics) {
        if let Some(cb) = &self.0.item_settled {
            cb(metrics);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn forwards_http_metrics_to_the_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let telemetry = Telemetry::new(Some(MetricsCallbacks {
            http_request: Some(Arc::new(move |m: HttpRequestMetrics| {
                sink.lock().unwrap().push(m.context.path);
            })),
            ..Default::default()
        }));

        assert!(telemetry.tracks_http());
        assert!(!telemetry.tracks_items());
        telemetry.http(HttpRequestMetrics {
            latency: Duration::from_millis(5),
            status: Some(200),
            error: None,
            retries: None,
            context: RequestContext::new("GET", "/api/alignment-data"),
        });
        assert_eq!(*seen.lock().unwrap(), vec!["/api/alignment-data".to_string()]);
    }

    #[test]
    fn blank_request_ids_are_dropped() {
        let ctx = RequestContext::new("GET", "/").answered_by(Some("  ".into()));
        assert!(ctx.request_id.is_none());
        let ctx = RequestContext::new("GET", "/").answered_by(Some("req_1".into()));
        assert_eq!(ctx.request_id.as_deref(), Some("req_1"));
    }

    #[test]
    fn debug_lists_registered_hooks() {
        let callbacks = MetricsCallbacks {
            item_settled: Some(Arc::new(|_: ItemMetrics| {})),
            ..Default::default()
        };
        assert_eq!(
            format!("{callbacks:?}"),
            "MetricsCallbacks { http_request: false, item_settled: true }"
        );
    }
}
