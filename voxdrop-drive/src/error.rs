//! Mapping of HTTP and Drive API failures onto [`StoreError`].

use serde::Deserialize;
use voxdrop_core::StoreError;

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: ApiError,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

/// Map a transport-level reqwest failure
pub(crate) fn from_reqwest(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else if err.is_body() {
        StoreError::truncated(err.to_string())
    } else if err.is_decode() {
        StoreError::protocol(err.to_string())
    } else if err.is_builder() {
        StoreError::invalid(err.to_string())
    } else {
        StoreError::connection(err.to_string())
    }
}

/// Read a failed response into a [`StoreError`]
pub(crate) async fn from_response(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    match response.text().await {
        Ok(body) => from_status(status, &body),
        Err(err) => from_reqwest(err),
    }
}

/// Map a status code and Drive error body
pub fn from_status(status: u16, body: &str) -> StoreError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let reason = parsed
        .error
        .errors
        .first()
        .map(|d| d.reason.as_str())
        .unwrap_or_default();
    let message = if parsed.error.message.is_empty() {
        format!("HTTP {}", status)
    } else {
        parsed.error.message.clone()
    };

    match status {
        400 => StoreError::invalid(message),
        401 => StoreError::Unauthenticated(message),
        403 => match reason {
            "rateLimitExceeded" | "userRateLimitExceeded" => StoreError::RateLimited(message),
            "storageQuotaExceeded" | "quotaExceeded" => StoreError::QuotaExceeded(message),
            _ => StoreError::permission_denied(message),
        },
        404 => StoreError::not_found(message),
        408 => StoreError::Timeout,
        429 => StoreError::RateLimited(message),
        500..=599 => StoreError::unavailable(status, message),
        _ => StoreError::protocol(format!("unexpected status {}: {}", status, message)),
    }
}
