//! Per-item failure policy.

use serde_json::Value;

use crate::{
    errors::{Error, ItemError, Result},
    operations::OperationRegistry,
    types::{ItemResult, WorkUnit},
};

/// What happens when one item fails. Chosen once per batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailureMode {
    /// Abort the batch on the first item error.
    #[default]
    FailFast,
    /// Record the error as an output item and keep going.
    Continue,
}

/// Lifecycle of one work unit inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Validating,
    Requesting,
    Transforming,
    Done,
    Failed,
    /// Failed, kept as an error item (continue mode).
    Recorded,
    /// Failed, batch stopped (fail-fast mode).
    Aborted,
}

impl UnitState {
    /// Where a `Failed` unit ends up under `mode`; other states are unchanged.
    pub fn resolve(self, mode: FailureMode) -> UnitState {
        match (self, mode) {
            (UnitState::Failed, FailureMode::Continue) => UnitState::Recorded,
            (UnitState::Failed, FailureMode::FailFast) => UnitState::Aborted,
            (other, _) => other,
        }
    }
}

#[cfg(feature = "tracing")]
pub(crate) fn trace_state(unit: &WorkUnit, state: UnitState) {
    tracing::trace!(
        item = unit.index + 1,
        resource = %unit.resource,
        verb = %unit.verb,
        state = ?state,
        "item state"
    );
}

#[cfg(not(feature = "tracing"))]
pub(crate) fn trace_state(_unit: &WorkUnit, _state: UnitState) {}

/// Turns a unit's outcome into output items or a batch-terminating error.
#[derive(Debug, Clone, Copy)]
pub struct FailureIsolator {
    mode: FailureMode,
}

impl FailureIsolator {
    pub fn new(mode: FailureMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> FailureMode {
        self.mode
    }

    /// Append the unit's results, or decide what its error means for the batch.
    pub fn settle(
        &self,
        unit: &WorkUnit,
        outcome: Result<Vec<Value>>,
        results: &mut Vec<ItemResult>,
    ) -> Result<UnitState> {
        let err = match outcome {
            Ok(items) => {
                results.extend(items.into_iter().map(|json| ItemResult::Success {
                    json,
                    item: unit.index,
                }));
                return Ok(UnitState::Done);
            }
            Err(err) => err,
        };
        trace_state(unit, UnitState::Failed);
        let state = UnitState::Failed.resolve(self.mode);
        trace_state(unit, state);

        match state {
            UnitState::Recorded => {
                let error = recorded_message(unit, err);
                #[cfg(feature = "tracing")]
                tracing::warn!(item = unit.index + 1, error = %error, "item failed; recorded");
                results.push(ItemResult::Failure {
                    error,
                    item: unit.index,
                    operation: Some(unit.verb.clone()),
                });
                Ok(state)
            }
            _ => {
                let escalated = escalate(unit, err);
                #[cfg(feature = "tracing")]
                tracing::warn!(item = unit.index + 1, error = %escalated, "item failed; aborting batch");
                Err(escalated)
            }
        }
    }
}

/// Wrap an item error with its 1-based number, label and remediation hint.
pub fn escalate(unit: &WorkUnit, err: Error) -> Error {
    if matches!(err, Error::Item(_) | Error::Authentication(_)) {
        return err;
    }
    let (label, message, hint) = describe(unit, &err);
    Error::Item(ItemError {
        item: unit.index + 1,
        label,
        message,
        hint: hint.to_string(),
        source: Box::new(err),
    })
}

/// Message stored on an error item in continue mode.
///
/// Parameter and selection problems read the same as in fail-fast mode; remote
/// and network failures keep their own message.
fn recorded_message(unit: &WorkUnit, err: Error) -> String {
    match err {
        Error::Validation(_) | Error::UnsupportedOperation { .. } => {
            escalate(unit, err).to_string()
        }
        other => other.to_string(),
    }
}

fn describe(unit: &WorkUnit, err: &Error) -> (String, String, &'static str) {
    let spec = match OperationRegistry::resolve(&unit.resource, &unit.verb) {
        Ok(spec) => spec,
        Err(_) => {
            let (label, message, hint) = OperationRegistry::unsupported(&unit.resource, &unit.verb);
            return (label, message.to_string(), hint);
        }
    };
    match err {
        Error::Validation(v) => (spec.label.to_string(), v.message.clone(), spec.validation_hint),
        other => (spec.label.to_string(), other.to_string(), spec.failure_hint),
    }
}
