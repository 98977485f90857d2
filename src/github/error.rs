//! Upstream API error types.
//!
//! This module defines the error taxonomy for upstream fetches. The
//! distinction drives the worker's retry and backoff decisions:
//!
//! - **RateLimited** errors make the observing worker sleep until the
//!   budget resets; other workers keep draining the queue.
//! - **Cancelled** means the shutdown token fired mid-call.
//! - **Transient** errors are retriable (network failures, 5xx, body
//!   decode failures, database serialization).
//! - **Permanent** errors are not worth more upstream calls (most 4xx,
//!   malformed issue URLs, unknown job types), though the queue still
//!   retries them up to the cap so a misclassification cannot wedge a
//!   page forever.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use super::models::RateSnapshot;

/// Fallback pause when the upstream says "rate limited" without telling
/// us when the budget resets.
const RATE_LIMIT_FALLBACK_SECS: i64 = 60;

/// An upstream fetch error, categorized for retry and backoff decisions.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The rate budget for this endpoint class is exhausted.
    #[error("rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// The shutdown token fired while the call was in flight.
    #[error("cancelled")]
    Cancelled,

    /// Safe to retry: network errors, 5xx, undecodable bodies.
    #[error("transient: {0}")]
    Transient(String),

    /// Not worth retrying: most 4xx, malformed input.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        FetchError::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        FetchError::Permanent(message.into())
    }

    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::RateLimited { .. } => "rate_limited",
            FetchError::Cancelled => "cancelled",
            FetchError::Transient(_) => "transient",
            FetchError::Permanent(_) => "permanent",
        }
    }
}

/// Database failures inside a handler are transient from the queue's
/// point of view: the job is deleted and reinserted like any other
/// retriable failure.
impl From<crate::store::StoreError> for FetchError {
    fn from(err: crate::store::StoreError) -> Self {
        FetchError::Transient(err.to_string())
    }
}

/// Categorizes a non-success HTTP status from the upstream.
///
/// Rate limiting shows up either as a plain 429 or as a 403 whose rate
/// headers report zero remaining calls (the upstream's classic primary
/// rate limit). Secondary limits use a 403 with a "rate limit" message
/// body.
pub fn classify_status(
    status: u16,
    rate: Option<&RateSnapshot>,
    body: &str,
) -> FetchError {
    let out_of_budget = rate.is_some_and(|r| r.remaining == 0);

    match status {
        429 => rate_limited(rate),
        403 if out_of_budget || is_rate_limit_message(body) => rate_limited(rate),
        500..=599 => FetchError::transient(format!("upstream returned {status}")),
        _ => FetchError::permanent(format!("upstream returned {status}")),
    }
}

fn rate_limited(rate: Option<&RateSnapshot>) -> FetchError {
    let reset_at = rate
        .map(RateSnapshot::reset_at)
        .unwrap_or_else(|| Utc::now() + Duration::seconds(RATE_LIMIT_FALLBACK_SECS));
    FetchError::RateLimited { reset_at }
}

/// Checks if a response body indicates a rate limit.
fn is_rate_limit_message(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("rate limit") || body.contains("abuse detection")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(remaining: u32, reset: i64) -> RateSnapshot {
        RateSnapshot {
            limit: 5000,
            remaining,
            reset,
        }
    }

    #[test]
    fn status_429_is_rate_limited() {
        let rate = snapshot(0, 1_700_000_000);
        let err = classify_status(429, Some(&rate), "");
        match err {
            FetchError::RateLimited { reset_at } => {
                assert_eq!(reset_at.timestamp(), 1_700_000_000);
            }
            other => panic!("expected rate limited, got {other:?}"),
        }
    }

    #[test]
    fn status_403_with_exhausted_budget_is_rate_limited() {
        let rate = snapshot(0, 1_700_000_000);
        assert!(matches!(
            classify_status(403, Some(&rate), "API rate limit exceeded"),
            FetchError::RateLimited { .. }
        ));
    }

    #[test]
    fn status_403_with_remaining_budget_is_permanent() {
        let rate = snapshot(42, 1_700_000_000);
        assert!(matches!(
            classify_status(403, Some(&rate), "Resource not accessible"),
            FetchError::Permanent(_)
        ));
    }

    #[test]
    fn status_403_rate_limit_message_without_headers_is_rate_limited() {
        assert!(matches!(
            classify_status(403, None, "You have exceeded a secondary rate limit"),
            FetchError::RateLimited { .. }
        ));
    }

    #[test]
    fn rate_limited_without_reset_header_falls_back() {
        let before = Utc::now();
        match classify_status(429, None, "") {
            FetchError::RateLimited { reset_at } => {
                assert!(reset_at > before);
                assert!(reset_at <= before + Duration::seconds(RATE_LIMIT_FALLBACK_SECS + 5));
            }
            other => panic!("expected rate limited, got {other:?}"),
        }
    }

    #[test]
    fn server_errors_are_transient() {
        for status in [500, 502, 503, 504] {
            assert!(matches!(
                classify_status(status, None, ""),
                FetchError::Transient(_)
            ));
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [400, 401, 404, 410, 422] {
            assert!(matches!(
                classify_status(status, None, ""),
                FetchError::Permanent(_)
            ));
        }
    }

    #[test]
    fn rate_limit_message_detection() {
        assert!(is_rate_limit_message("API rate limit exceeded for ..."));
        assert!(is_rate_limit_message("abuse detection mechanism"));
        assert!(!is_rate_limit_message("Permission denied"));
    }
}
