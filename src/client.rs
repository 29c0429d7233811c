use std::{env, sync::Arc, time::Duration};

use crate::{
    auth::{self, AppPassword, Credential},
    core::normalize_base_url,
    errors::{Error, Result},
    executor::BatchExecutor,
    http::{HeaderList, RetryConfig},
    isolation::FailureMode,
    telemetry::MetricsCallbacks,
    transport::{ReqwestTransport, Transport, TransportOptions},
    types::{ItemResult, WorkUnit},
    DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};

/// Environment variable holding the API base URL.
pub const BASE_URL_ENV: &str = "AGENT700_BASE_URL";
/// Environment variable holding the app password.
pub const APP_PASSWORD_ENV: &str = "AGENT700_APP_PASSWORD";

#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Defaults to `https://api.agent700.ai`.
    pub base_url: Option<String>,
    pub app_password: Option<String>,
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
    /// Retry/backoff policy (defaults to a single attempt).
    pub retry: Option<RetryConfig>,
    /// Extra headers applied to all requests.
    pub default_headers: Option<HeaderList>,
    /// Failure policy for batches run through [`Client::run`].
    pub failure_mode: FailureMode,
    /// Optional metrics callbacks for HTTP calls and settled items.
    pub metrics: Option<MetricsCallbacks>,
}

impl Config {
    /// Read `AGENT700_BASE_URL` (optional) and `AGENT700_APP_PASSWORD`.
    pub fn from_env() -> Result<Self> {
        let app_password = env::var(APP_PASSWORD_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{APP_PASSWORD_ENV} is not set")))?;
        Ok(Self {
            base_url: env::var(BASE_URL_ENV).ok().filter(|v| !v.trim().is_empty()),
            app_password: Some(app_password),
            ..Default::default()
        })
    }
}

/// Entry point for hosts: holds the credential and transport, runs batches.
///
/// Cloning is cheap. No state is carried from one batch to the next; each
/// [`Client::run`] logs in afresh.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    credential: Credential,
    transport: Arc<dyn Transport>,
    failure_mode: FailureMode,
    metrics: Option<MetricsCallbacks>,
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        let credential = credential_from_config(&cfg)?;

        let http = match cfg.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
                .build()
                .map_err(|err| Error::Config(format!("failed to build http client: {err}")))?,
        };
        let transport = ReqwestTransport::new(
            http,
            TransportOptions {
                timeout: Some(cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT)),
                retry: cfg.retry.unwrap_or_default(),
                default_headers: cfg.default_headers,
                metrics: cfg.metrics.clone(),
            },
        );

        Ok(Self::from_parts(
            credential,
            Arc::new(transport),
            cfg.failure_mode,
            cfg.metrics,
        ))
    }

    /// Use a host-provided transport instead of reqwest.
    pub fn with_transport(cfg: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let credential = credential_from_config(&cfg)?;
        Ok(Self::from_parts(
            credential,
            transport,
            cfg.failure_mode,
            cfg.metrics,
        ))
    }

    fn from_parts(
        credential: Credential,
        transport: Arc<dyn Transport>,
        failure_mode: FailureMode,
        metrics: Option<MetricsCallbacks>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                credential,
                transport,
                failure_mode,
                metrics,
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        self.inner.credential.base_url()
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.inner.failure_mode
    }

    /// Run a batch with the configured failure mode.
    pub async fn run(&self, units: &[WorkUnit]) -> Result<Vec<ItemResult>> {
        self.run_with_mode(units, self.inner.failure_mode).await
    }

    pub async fn run_with_mode(
        &self,
        units: &[WorkUnit],
        mode: FailureMode,
    ) -> Result<Vec<ItemResult>> {
        BatchExecutor::new(self.inner.transport.as_ref(), mode)
            .with_metrics(self.inner.metrics.clone())
            .run(&self.inner.credential, units)
            .await
    }

    /// Log in once and discard the session; checks the app password.
    pub async fn verify(&self) -> Result<()> {
        auth::verify_credential(self.inner.transport.as_ref(), &self.inner.credential).await
    }
}

fn credential_from_config(cfg: &Config) -> Result<Credential> {
    let base = cfg
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_BASE_URL);
    let base = normalize_base_url(base);
    reqwest::Url::parse(base).map_err(|err| Error::Config(format!("invalid base url: {err}")))?;

    let secret = cfg
        .app_password
        .as_deref()
        .ok_or_else(|| Error::Config("app password is required".to_string()))?;
    let secret = AppPassword::new(secret)
        .map_err(|_| Error::Config("app password is required".to_string()))?;
    Ok(Credential::new(base, secret))
}
