//! Failure classification for YouTube Data API responses.

use crate::error::GatewayError;
use serde_json::Value;

/// Error reasons that mean "this credential is out of quota or rate-limited"
pub const QUOTA_REASONS: [&str; 4] = [
    "quotaExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "dailyLimitExceeded",
];

/// Classify a non-success HTTP response
///
/// - 429, or 403 carrying a quota reason: `QuotaExceeded`
/// - 408 and 5xx: `Transient`
/// - 400 and 404: `Malformed` (the request for this item cannot succeed)
/// - anything else: `Fatal`
pub fn classify_status(status: u16, body: &str, credential: usize) -> GatewayError {
    let (reason, message) = error_reason(body);
    let describe = || match (&reason, &message) {
        (Some(r), Some(m)) => format!("HTTP {status} {r}: {m}"),
        (Some(r), None) => format!("HTTP {status} {r}"),
        (None, Some(m)) => format!("HTTP {status}: {m}"),
        (None, None) => format!("HTTP {status}"),
    };

    let quota_reason = reason
        .as_deref()
        .filter(|r| QUOTA_REASONS.contains(r) || *r == "RESOURCE_EXHAUSTED");

    match status {
        429 => GatewayError::QuotaExceeded {
            credential,
            reason: reason.clone().unwrap_or_else(|| "rate limited".to_string()),
        },
        403 if quota_reason.is_some() => GatewayError::QuotaExceeded {
            credential,
            reason: quota_reason.unwrap_or_default().to_string(),
        },
        408 | 500..=599 => GatewayError::Transient(describe()),
        400 | 404 => GatewayError::Malformed(describe()),
        _ => GatewayError::Fatal(describe()),
    }
}

/// Classify a transport-level failure
pub fn classify_transport(error: &reqwest::Error) -> GatewayError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        GatewayError::Transient(error.to_string())
    } else if error.is_decode() || error.is_body() {
        GatewayError::Malformed(error.to_string())
    } else {
        GatewayError::Fatal(error.to_string())
    }
}

/// Extract `(reason, message)` from a Google API error body
///
/// The first entry of `error.errors[].reason` wins; `error.status` is used
/// when no per-error reason is present.
fn error_reason(body: &str) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return (None, None);
    };
    let error = &value["error"];

    let reason = error["errors"]
        .as_array()
        .and_then(|errors| errors.iter().find_map(|e| e["reason"].as_str()))
        .or_else(|| error["status"].as_str())
        .map(String::from);
    let message = error["message"].as_str().map(String::from);

    (reason, message)
}
