//! Helpers for tests that run against a local mock server.

use crate::{isolation::FailureMode, Client, Config, RetryConfig};

/// App password accepted by the strict format check.
pub const TEST_APP_PASSWORD: &str = "app_a7_0123456789abcdef0123456789abcdef";

/// Create a client pointed at `base_url` with retries disabled.
pub fn test_client(base_url: &str) -> Client {
    test_client_with_mode(base_url, FailureMode::FailFast)
}

pub fn test_client_with_mode(base_url: &str, failure_mode: FailureMode) -> Client {
    Client::new(Config {
        base_url: Some(base_url.to_string()),
        app_password: Some(TEST_APP_PASSWORD.to_string()),
        retry: Some(RetryConfig::disabled()),
        failure_mode,
        ..Default::default()
    })
    .expect("client")
}
