//! HTTP status classification

use std::time::Duration;

use super::DeliveryOutcome;

/// How a response status is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Delivered,
    Retryable,
    Permanent,
    /// The key is already taken; delivered only if the content matches
    Conflict,
}

/// Classify a response status.
///
/// 1xx and 3xx are unexpected from a JSON API and never retried.
pub fn classify_status(code: u16) -> StatusClass {
    match code {
        200..=299 => StatusClass::Delivered,
        409 => StatusClass::Conflict,
        408 | 425 | 429 | 500..=599 => StatusClass::Retryable,
        _ => StatusClass::Permanent,
    }
}

/// Resolve a 409 against the fingerprint the target reports for the key.
///
/// Only an echoed fingerprint equal to ours proves the stored posting is
/// this one; anything else is a permanent conflict.
pub fn conflict_outcome(key: &str, expected: &str, echoed: Option<&str>) -> DeliveryOutcome {
    match echoed {
        Some(fingerprint) if fingerprint == expected => DeliveryOutcome::Delivered,
        Some(fingerprint) => DeliveryOutcome::permanent(format!(
            "idempotency key {} already holds different content ({})",
            key, fingerprint
        )),
        None => DeliveryOutcome::permanent(format!(
            "target responded 409 for key {} without confirming the fingerprint",
            key
        )),
    }
}

/// Build the outcome for a response
pub fn outcome_for_status(code: u16, retry_after: Option<Duration>) -> DeliveryOutcome {
    match classify_status(code) {
        StatusClass::Delivered => DeliveryOutcome::Delivered,
        StatusClass::Retryable => DeliveryOutcome::RetryableFailure {
            reason: format!("target responded {}", code),
            retry_after,
        },
        StatusClass::Permanent | StatusClass::Conflict => DeliveryOutcome::PermanentFailure {
            reason: format!("target responded {}", code),
        },
    }
}

/// Parse a `Retry-After` value given in seconds.
///
/// HTTP-date values are ignored; the configured backoff applies instead.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
