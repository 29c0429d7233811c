//! Authenticated batch executor for the Agent700 API.
//!
//! A host hands over a batch of [`WorkUnit`]s. The executor trades the app
//! password for a session once, sends one chat or context-library request per
//! unit and returns the resulting [`ItemResult`]s in input order.
//!
//! ```ignore
//! use agent700::{Client, Config, FailureMode, UnitParams, WorkUnit};
//!
//! let client = Client::new(Config {
//!     app_password: Some("app_a7_...".into()),
//!     failure_mode: FailureMode::Continue,
//!     ..Default::default()
//! })?;
//! let results = client
//!     .run(&[WorkUnit::chat(0, UnitParams::default().message("Summarize our policy"))])
//!     .await?;
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::result_large_err)]

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.agent700.ai";

/// User-Agent sent with the login request.
pub const DEFAULT_CLIENT_HEADER: &str = "A700cli/1.0.0";

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Default request timeout (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

pub mod auth;
mod client;
mod core;
mod errors;
mod executor;
mod http;
mod isolation;
#[cfg(any(test, feature = "mock"))]
mod mock;
pub mod operations;
mod telemetry;
pub mod testing;
mod transport;
mod types;

pub use auth::{exchange, verify_credential, AppPassword, Credential, Session};
pub use client::{Client, Config, APP_PASSWORD_ENV, BASE_URL_ENV};
pub use errors::{
    APIError, Error, ItemError, Result, RetryMetadata, TransportError, TransportErrorKind,
    ValidationError,
};
pub use executor::BatchExecutor;
pub use http::{HeaderEntry, HeaderList, RetryConfig};
pub use isolation::{escalate, FailureIsolator, FailureMode, UnitState};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockTransport;
pub use operations::{OperationKind, OperationRegistry, OperationSpec, ResponseShape};
pub use telemetry::{HttpRequestMetrics, ItemMetrics, MetricsCallbacks, RequestContext};
pub use transport::{HttpRequest, ReqwestTransport, Transport, TransportFuture, TransportOptions};
pub use types::{ItemResult, UnitParams, WorkUnit, DEFAULT_CONSTRUCT_TEMPLATE};
