//! HTTP client construction.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Client as HttpClient;

use super::config::ClientOptions;
use super::errors::ClientError;

/// TCP connection timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a client carrying the default headers for `options`.
///
/// Every request accepts `text/event-stream`, and carries a bearer token when
/// an API key is configured.
pub fn build_http_client(
    options: &ClientOptions,
    timeout: Duration,
) -> Result<HttpClient, ClientError> {
    HttpClient::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .default_headers(default_headers(options)?)
        .build()
        .map_err(|e| ClientError::ConnectionFailed {
            endpoint: options.base_url.clone(),
            reason: format!("failed to build HTTP client: {e}"),
        })
}

fn default_headers(options: &ClientOptions) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

    if let Some(key) = options.api_key.as_deref().filter(|k| !k.is_empty()) {
        let mut value =
            HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| ClientError::ConfigError {
                reason: format!("api_key is not a valid header value: {e}"),
            })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}

/// Map a send failure to a client error.
pub(crate) fn map_send_error(err: reqwest::Error, url: &str, timeout: Duration) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout {
            duration_secs: timeout.as_secs(),
        }
    } else {
        ClientError::ConnectionFailed {
            endpoint: url.to_string(),
            reason: err.to_string(),
        }
    }
}
