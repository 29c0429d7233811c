use std::fmt;

use thiserror::Error;

/// How many attempts a call took before it gave up. Only present after a retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryMetadata {
    pub attempts: u32,
    pub last_status: Option<u16>,
    pub last_error: Option<String>,
}

/// A parameter the selected operation needs was missing or blank.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Parameter name as the host knows it, e.g. `key` or `app_password`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Non-2xx answer from the Agent700 API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct APIError {
    pub status: u16,
    pub code: Option<String>,
    pub message: String,
    pub request_id: Option<String>,
    pub retries: Option<RetryMetadata>,
    /// Body as received, when there was one.
    pub raw_body: Option<String>,
}

impl APIError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
            request_id: None,
            retries: None,
            raw_body: None,
        }
    }

    /// 401 or 403: the token or app password was refused.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status, 401 | 403)
    }
}

impl fmt::Display for APIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)?;
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for APIError {}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The request never produced an HTTP answer, or its body could not be read.
#[derive(Debug, Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    #[source]
    pub source: Option<reqwest::Error>,
    pub retries: Option<RetryMetadata>,
}

impl TransportError {
    pub(crate) fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            retries: None,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, retries: Option<RetryMetadata>) -> Self {
        Self {
            kind: TransportErrorKind::classify(&err),
            message: err.to_string(),
            source: Some(err),
            retries,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    /// The response body could not be read.
    Body,
    Other,
}

impl TransportErrorKind {
    pub fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect
        } else if err.is_body() || err.is_decode() {
            Self::Body
        } else if err.is_request() {
            Self::Request
        } else {
            Self::Other
        }
    }

    /// Timeouts and refused connections may succeed on another attempt.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::Connect)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Other => "transport",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-item failure escalated in fail-fast mode.
///
/// Renders as `[Item <n>] <label> — <message>. How to solve: <hint>` where `n`
/// is the 1-based item number.
#[derive(Debug, Error)]
#[error("[Item {item}] {label} — {message}. How to solve: {hint}")]
pub struct ItemError {
    /// 1-based item number.
    pub item: usize,
    /// Resource/operation label, e.g. `Entry:Get`.
    pub label: String,
    pub message: String,
    pub hint: String,
    #[source]
    pub source: Box<Error>,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Login answered 2xx but carried no access token.
    #[error("{0}")]
    Authentication(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unsupported operation {resource}:{verb}")]
    UnsupportedOperation { resource: String, verb: String },

    #[error(transparent)]
    Api(#[from] APIError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Item(#[from] ItemError),
}

impl Error {
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Network failures and non-2xx responses.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Api(_))
    }

    /// HTTP status of the failed call, when the remote answered.
    pub fn status(&self) -> Option<u16> {
        match self.root() {
            Error::Api(err) => Some(err.status),
            _ => None,
        }
    }

    /// The error that caused an escalated item failure, or `self`.
    pub fn root(&self) -> &Error {
        match self {
            Error::Item(err) => err.source.root(),
            other => other,
        }
    }
}
