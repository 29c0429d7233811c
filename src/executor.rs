//! Batch executor.
//!
//! One `run` logs in once, then processes the work units strictly in order:
//! resolve, validate, call, transform. Unit `i + 1` never starts before unit
//! `i` has finished, so output order follows input order and fail-fast stops
//! before any later side effect.

use std::time::Instant;

use serde_json::Value;

use crate::{
    auth::{exchange, Credential, Session},
    errors::Result,
    isolation::{trace_state, FailureIsolator, FailureMode, UnitState},
    operations::OperationRegistry,
    telemetry::{ItemMetrics, MetricsCallbacks, Telemetry},
    transport::Transport,
    types::{ItemResult, WorkUnit},
};

/// Runs batches of work units against one transport.
pub struct BatchExecutor<'a> {
    transport: &'a dyn Transport,
    isolator: FailureIsolator,
    telemetry: Telemetry,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(transport: &'a dyn Transport, mode: FailureMode) -> Self {
        Self {
            transport,
            isolator: FailureIsolator::new(mode),
            telemetry: Telemetry::default(),
        }
    }

    /// Report every settled item through `item_settled`.
    pub fn with_metrics(mut self, metrics: Option<MetricsCallbacks>) -> Self {
        self.telemetry = Telemetry::new(metrics);
        self
    }

    /// Execute a whole batch.
    ///
    /// Login failures abort the batch in every mode. An empty batch still
    /// logs in, so a bad app password is reported even with no input.
    pub async fn run(&self, credential: &Credential, units: &[WorkUnit]) -> Result<Vec<ItemResult>> {
        let session = exchange(self.transport, credential).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            units = units.len(),
            mode = ?self.isolator.mode(),
            "running batch"
        );

        let mut results = Vec::with_capacity(units.len());
        for unit in units {
            let started = Instant::now();
            let before = results.len();
            let outcome = self.execute_unit(&session, unit).await;
            let settled = self.isolator.settle(unit, outcome, &mut results);
            let state = settled.as_ref().map_or(UnitState::Aborted, |state| *state);
            #[cfg(feature = "tracing")]
            tracing::debug!(item = unit.index + 1, state = ?state, "item settled");
            self.report(unit, state, results.len() - before, started);
            settled?;
        }
        Ok(results)
    }

    /// Run one unit to completion, returning the items it produced.
    pub async fn execute_unit(&self, session: &Session, unit: &WorkUnit) -> Result<Vec<Value>> {
        trace_state(unit, UnitState::Pending);
        let spec = OperationRegistry::resolve(&unit.resource, &unit.verb)?;

        trace_state(unit, UnitState::Validating);
        let request = spec.build_request(session, &unit.params)?;

        trace_state(unit, UnitState::Requesting);
        let raw = self.transport.send(request).await?;

        trace_state(unit, UnitState::Transforming);
        Ok(spec.shape(&unit.params).apply(raw, &unit.params))
    }

    fn report(&self, unit: &WorkUnit, state: UnitState, produced: usize, started: Instant) {
        if !self.telemetry.tracks_items() {
            return;
        }
        let operation = OperationRegistry::resolve(&unit.resource, &unit.verb)
            .map(|spec| spec.label.to_string())
            .unwrap_or_else(|_| format!("{}:{}", unit.resource, unit.verb));
        self.telemetry.item(ItemMetrics {
            item: unit.index + 1,
            operation,
            state,
            produced,
            latency: started.elapsed(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;
    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::{
        auth::AppPassword, errors::Error, mock::MockTransport, types::UnitParams, APIError,
    };

    fn credential() -> Credential {
        Credential::new(
            "https://api.agent700.ai/",
            AppPassword::new(format!("app_a7_{}", "x".repeat(32))).unwrap(),
        )
    }

    async fn run(
        transport: &MockTransport,
        mode: FailureMode,
        units: &[WorkUnit],
    ) -> Result<Vec<ItemResult>> {
        BatchExecutor::new(transport, mode)
            .run(&credential(), units)
            .await
    }

    #[tokio::test]
    async fn simplified_chat_scenario() {
        let transport = MockTransport::new()
            .with_login("tok")
            .with_response(json!({"response": "hello", "finish_reason": "stop"}));
        let units = [WorkUnit::chat(0, UnitParams::default().message("hi").simplify(true))];

        let results = run(&transport, FailureMode::FailFast, &units).await.unwrap();

        assert_eq!(
            results,
            vec![ItemResult::Success {
                json: json!({
                    "response": "hello",
                    "finish_reason": "stop",
                    "scrubbed_message": null,
                    "error": null
                }),
                item: 0,
            }]
        );
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url, "https://api.agent700.ai/api/auth/app-login");
        assert_eq!(requests[1].method, Method::POST);
        assert_eq!(requests[1].url, "https://api.agent700.ai/api/chat");
        assert_eq!(requests[1].header("Authorization"), Some("Bearer tok"));
        assert_eq!(
            requests[1].body,
            Some(json!({"messages": [{"role": "user", "content": "hi"}]}))
        );
    }

    #[tokio::test]
    async fn missing_token_aborts_before_any_item() {
        let units = [
            WorkUnit::entry(0, "getMany", UnitParams::default()),
            WorkUnit::entry(1, "getMany", UnitParams::default()),
        ];

        for mode in [FailureMode::FailFast, FailureMode::Continue] {
            let transport = MockTransport::new().with_response(json!({}));
            let err = run(&transport, mode, &units).await.unwrap_err();
            assert!(err.is_authentication());
            assert_eq!(err.to_string(), "App login did not return accessToken");
            assert_eq!(transport.request_count(), 1);
        }
    }

    #[tokio::test]
    async fn login_transport_failure_propagates_unwrapped() {
        let transport = MockTransport::new().with_error(APIError::new(401, "Invalid token").into());
        let err = run(
            &transport,
            FailureMode::Continue,
            &[WorkUnit::entry(0, "getMany", UnitParams::default())],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Api(_)));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn continue_mode_records_invalid_item_and_proceeds() {
        let transport = MockTransport::new()
            .with_login("tok")
            .with_response(json!([{"key": "a"}, {"key": "b"}]));
        let units = [
            WorkUnit::entry(0, "get", UnitParams::default().key("")),
            WorkUnit::entry(1, "getMany", UnitParams::default()),
        ];

        let results = run(&transport, FailureMode::Continue, &units).await.unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_failure());
        assert_eq!(results[0].item(), 0);
        assert!(results[1..].iter().all(|r| !r.is_failure() && r.item() == 1));
        // login + getMany only; the invalid item never hit the network
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn fail_fast_stops_before_later_side_effects() {
        let transport = MockTransport::new()
            .with_login("tok")
            .with_error(APIError::new(500, "boom").into());
        let units = [
            WorkUnit::entry(0, "get", UnitParams::default().key("k")),
            WorkUnit::entry(1, "delete", UnitParams::default().key("k")),
        ];

        let err = run(&transport, FailureMode::FailFast, &units).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "[Item 1] Entry:Get — 500: boom. How to solve: Check required parameters and ensure your App Password is valid."
        );
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn query_construct_fans_out_in_remote_order() {
        let transport = MockTransport::new()
            .with_login("tok")
            .with_response(json!([{"key": "user_1", "value": "v1"}, {"key": "user_2", "value": "v2"}]));
        let units = [WorkUnit::entry(
            0,
            "queryConstruct",
            UnitParams::default().pattern("user_*"),
        )];

        let results = run(&transport, FailureMode::FailFast, &units).await.unwrap();

        let json: Vec<_> = results.iter().filter_map(|r| r.json().cloned()).collect();
        assert_eq!(
            json,
            vec![
                json!({"key": "user_1", "value": "v1"}),
                json!({"key": "user_2", "value": "v2"})
            ]
        );
        assert!(results.iter().all(|r| r.item() == 0));
        assert!(transport.requests()[1].url.ends_with(
            "/by-pattern/user_*/construct-json?template=%7B%22key%22%3A%22%7B%7Bkey%7D%7D%22%2C%22value%22%3A%22%7B%7Bvalue%7D%7D%22%7D"
        ));
    }

    #[tokio::test]
    async fn delete_ignores_remote_body() {
        let transport = MockTransport::new()
            .with_login("tok")
            .with_response(json!({"message": "gone", "id": 7}));
        let units = [WorkUnit::entry(0, "delete", UnitParams::default().key("k"))];

        let results = run(&transport, FailureMode::FailFast, &units).await.unwrap();

        assert_eq!(results[0].json(), Some(&json!({"deleted": true, "key": "k"})));
        assert_eq!(transport.requests()[1].method, Method::DELETE);
    }

    #[tokio::test]
    async fn logs_in_once_for_many_units() {
        let transport = MockTransport::new().with_login("tok");
        let mut units = Vec::new();
        for i in 0..5 {
            transport.push(Ok(json!({"key": format!("k{i}"), "value": i})));
            units.push(WorkUnit::entry(i, "get", UnitParams::default().key(format!("k{i}"))));
        }

        let results = run(&transport, FailureMode::FailFast, &units).await.unwrap();

        let order: Vec<_> = results.iter().map(ItemResult::item).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        let logins = transport
            .requests()
            .iter()
            .filter(|r| r.url.ends_with("/api/auth/app-login"))
            .count();
        assert_eq!(logins, 1);
    }

    #[tokio::test]
    async fn empty_batch_still_logs_in() {
        let transport = MockTransport::new().with_login("tok");
        let results = run(&transport, FailureMode::FailFast, &[]).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn reports_each_settled_item() {
        let transport = MockTransport::new()
            .with_login("tok")
            .with_response(json!([{"key": "a"}, {"key": "b"}]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let metrics = MetricsCallbacks {
            item_settled: Some(Arc::new(move |m: ItemMetrics| {
                sink.lock().unwrap().push((m.item, m.operation, m.state, m.produced));
            })),
            ..Default::default()
        };
        let units = [
            WorkUnit::entry(0, "getMany", UnitParams::default()),
            WorkUnit::entry(1, "get", UnitParams::default()),
            WorkUnit::entry(2, "get", UnitParams::default().key("k")),
        ];

        let err = BatchExecutor::new(&transport, FailureMode::FailFast)
            .with_metrics(Some(metrics))
            .run(&credential(), &units)
            .await
            .unwrap_err();

        assert!(err.root().is_validation());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (1, "Entry:Get Many".to_string(), UnitState::Done, 2),
                (2, "Entry:Get".to_string(), UnitState::Aborted, 0),
            ]
        );
    }

    #[tokio::test]
    async fn unsupported_operation_is_isolated_in_continue_mode() {
        let transport = MockTransport::new()
            .with_login("tok")
            .with_response(json!({"p1": "v"}));
        let units = [
            WorkUnit::entry(0, "rename", UnitParams::default()),
            WorkUnit::entry(1, "query", UnitParams::default().pattern("p*")),
        ];

        let results = run(&transport, FailureMode::Continue, &units).await.unwrap();

        assert_eq!(
            results[0].clone().into_json(),
            json!({
                "error": "[Item 1] Entry:rename — Unsupported operation. How to solve: Select a valid operation from the list.",
                "itemIndex": 1,
                "operation": "rename"
            })
        );
        assert_eq!(
            results[1].json(),
            Some(&json!({"pattern": "p*", "result": {"p1": "v"}}))
        );
    }
}
