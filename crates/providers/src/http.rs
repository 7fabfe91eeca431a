//! HTTP plumbing shared by the remote adapters.
//!
//! Every reqwest failure and every non-success status is mapped into a
//! [`BackendError`] here, so no adapter lets a raw transport error escape.

use std::time::Duration;

use parley_core::error::BackendError;
use tracing::warn;

/// Build a client with a request timeout.
pub(crate) fn client(timeout_secs: u64) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BackendError::NotConfigured(format!("Failed to create HTTP client: {e}")))
}

/// Map a reqwest send/receive error.
pub(crate) fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else if e.is_decode() {
        BackendError::MalformedResponse(e.to_string())
    } else {
        BackendError::Network(e.to_string())
    }
}

/// Turn a non-success status into a [`BackendError`], passing 2xx through.
pub(crate) async fn check_status(
    backend: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(BackendError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(BackendError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if !response.status().is_success() {
        let error_body = response.text().await.unwrap_or_default();
        warn!(backend, status, body = %error_body, "Backend returned error");
        return Err(BackendError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

/// Read a successful response body as JSON.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, BackendError> {
    let body = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&body)
        .map_err(|e| BackendError::MalformedResponse(format!("Failed to parse response: {e}")))
}

/// Cut `text` at the earliest occurrence of any stop sequence.
pub(crate) fn truncate_at_stop<'a>(text: &'a str, stops: &[String]) -> &'a str {
    let cut = stops
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
        .unwrap_or(text.len());
    &text[..cut]
}
