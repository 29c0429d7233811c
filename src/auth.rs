//! App password exchange.
//!
//! An Agent700 app password is long-lived. Every batch trades it for a
//! short-lived access token with a single `POST /api/auth/app-login` and uses
//! that token as a bearer credential for the rest of the batch.

use std::fmt;

use reqwest::Method;
use serde_json::{json, Value};

use crate::{
    core::normalize_base_url,
    errors::{Error, Result, ValidationError},
    transport::{HttpRequest, Transport},
    DEFAULT_BASE_URL, DEFAULT_CLIENT_HEADER,
};

const APP_PASSWORD_PREFIX: &str = "app_a7_";
const APP_PASSWORD_SUFFIX_LEN: usize = 32;

/// Path of the login endpoint, relative to the base URL.
pub const APP_LOGIN_PATH: &str = "/api/auth/app-login";

/// Message of the error raised when login succeeds without a token.
pub const MISSING_ACCESS_TOKEN: &str = "App login did not return accessToken";

/// Long-lived Agent700 app password.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AppPassword(String);

impl AppPassword {
    /// Strict parse: `app_a7_` followed by exactly 32 characters.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let value = raw.as_ref().trim();
        let valid = value
            .strip_prefix(APP_PASSWORD_PREFIX)
            .is_some_and(|rest| rest.chars().count() == APP_PASSWORD_SUFFIX_LEN);
        if valid {
            return Ok(Self(value.to_string()));
        }
        Err(Error::Validation(ValidationError::new(
            "app_password",
            "invalid app password (expected app_a7_ + 32 chars)",
        )))
    }

    /// Accept any non-empty secret; the format check is left to the caller.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let value = raw.into();
        if value.trim().is_empty() {
            return Err(Error::Validation(
                ValidationError::new("app_password", "app password is required"),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AppPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AppPassword(***)")
    }
}

/// Base URL plus app password, as supplied by the host for one batch.
#[derive(Clone, Debug)]
pub struct Credential {
    pub base_url: String,
    pub secret: AppPassword,
}

impl Credential {
    pub fn new(base_url: impl Into<String>, secret: AppPassword) -> Self {
        Self {
            base_url: base_url.into(),
            secret,
        }
    }

    /// Build from raw parts; a blank base URL falls back to the public API.
    pub fn from_parts(base_url: Option<&str>, app_password: &str) -> Result<Self> {
        let base_url = base_url
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_BASE_URL);
        Ok(Self::new(base_url, AppPassword::new(app_password)?))
    }

    /// Base URL with one trailing slash removed.
    pub fn base_url(&self) -> &str {
        normalize_base_url(&self.base_url)
    }
}

/// Access token obtained for one batch execution.
///
/// Created once by [`exchange`] and only borrowed afterwards.
#[derive(Clone)]
pub struct Session {
    base_url: String,
    access_token: String,
}

impl Session {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Absolute URL for an API path such as `/api/chat`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Start an authenticated request against this session.
    pub fn request(&self, method: Method, path: &str) -> HttpRequest {
        HttpRequest::new(method, self.url(path)).bearer(&self.access_token)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("access_token", &"***")
            .finish()
    }
}

fn login_request(credential: &Credential) -> HttpRequest {
    HttpRequest::new(
        Method::POST,
        format!("{}{}", credential.base_url(), APP_LOGIN_PATH),
    )
    .with_header("Content-Type", "application/json")
    .with_header("User-Agent", DEFAULT_CLIENT_HEADER)
    .with_json(json!({ "token": credential.secret.as_str() }))
}

fn access_token(payload: &Value) -> Option<&str> {
    payload
        .get("accessToken")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
}

/// Trade the app password for a session with exactly one login call.
///
/// Transport failures propagate unchanged and are not retried here.
pub async fn exchange(transport: &dyn Transport, credential: &Credential) -> Result<Session> {
    if credential.secret.as_str().trim().is_empty() {
        return Err(Error::Validation(
            ValidationError::new("app_password", "app password is required"),
        ));
    }

    let payload = transport.send(login_request(credential)).await?;
    let token = access_token(&payload)
        .ok_or_else(|| Error::Authentication(MISSING_ACCESS_TOKEN.to_string()))?;

    #[cfg(feature = "tracing")]
    tracing::debug!(base_url = credential.base_url(), "app login succeeded");

    Ok(Session {
        base_url: credential.base_url().to_string(),
        access_token: token.to_string(),
    })
}

/// Check that an app password can log in, discarding the session.
pub async fn verify_credential(transport: &dyn Transport, credential: &Credential) -> Result<()> {
    exchange(transport, credential).await.map(|_| ())
}
