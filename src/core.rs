//! Small runtime helpers shared by the transport and the executor.

use reqwest::StatusCode;

use crate::errors::{Error, Result, RetryMetadata, ValidationError};

/// Failed attempts of one HTTP call, for the error and metrics it ends with.
#[derive(Debug, Default)]
pub(crate) struct AttemptLog {
    attempts: u32,
    last_status: Option<u16>,
    last_error: Option<String>,
}

impl AttemptLog {
    pub(crate) fn failed_status(&mut self, attempt: u32, status: StatusCode) {
        self.attempts = attempt;
        self.last_status = Some(status.as_u16());
    }

    pub(crate) fn failed_error(&mut self, attempt: u32, err: &reqwest::Error) {
        self.attempts = attempt;
        self.last_error = Some(err.to_string());
    }

    /// `None` unless the call was actually retried.
    pub(crate) fn retries(&self) -> Option<RetryMetadata> {
        (self.attempts > 1).then(|| RetryMetadata {
            attempts: self.attempts,
            last_status: self.last_status,
            last_error: self.last_error.clone(),
        })
    }
}

/// Returns the value unchanged, or a validation error naming the field.
///
/// With `trim` set, whitespace-only values count as missing.
pub(crate) fn require_field<'a>(
    value: Option<&'a str>,
    field: &str,
    message: &str,
    trim: bool,
) -> Result<&'a str> {
    match value {
        Some(v) if !(if trim { v.trim() } else { v }).is_empty() => Ok(v),
        _ => Err(Error::Validation(ValidationError::new(field, message))),
    }
}

/// Strip exactly one trailing slash from a base URL.
pub(crate) fn normalize_base_url(raw: &str) -> &str {
    raw.strip_suffix('/').unwrap_or(raw)
}
