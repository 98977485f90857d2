//! Request log entries and their human rendering.
//!
//! Every upstream call that produced a response is recorded in a bounded
//! list for live diagnostics. Entries are stored as JSON; the stream
//! endpoint renders them to a single human-readable line.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One upstream call, as kept in the request log.
///
/// `page` and `last_page` keep the raw values from the call: page 0 means
/// "first page" and `last_page` 0 means the upstream sent no cursor; both
/// are normalized only when rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEntry {
    /// Monotonic id, assigned when the entry is appended.
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub page: u32,
    pub last_page: u32,
    pub status: u16,
    pub duration_ms: u64,
}

impl RequestEntry {
    /// Builds an entry for a call that produced a response. The id stays
    /// zero until the cache appends the entry and assigns the next one.
    pub fn new(
        message: impl Into<String>,
        page: u32,
        last_page: Option<u32>,
        status: u16,
        duration: Duration,
    ) -> Self {
        RequestEntry {
            id: 0,
            timestamp: Utc::now(),
            message: message.into(),
            page,
            last_page: last_page.unwrap_or(0),
            status,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

impl fmt::Display for RequestEntry {
    /// `ts=<rfc3339> msg="<message>" status=<n> duration=<ms>ms`, with a
    /// `(page/last_page)` suffix inside the message for successful calls.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut message = self.message.clone();
        if self.status == 200 {
            let page = self.page.max(1);
            let last_page = if self.last_page == 0 {
                page
            } else {
                self.last_page
            };
            message = format!("{message} ({page}/{last_page})");
        }
        write!(
            f,
            "ts={} msg={:?} status={} duration={}ms",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            message,
            self.status,
            self.duration_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: u16, page: u32, last_page: u32) -> RequestEntry {
        RequestEntry {
            id: 3,
            timestamp: "2024-01-15T12:00:00Z".parse().unwrap(),
            message: "list octocat/hello issues".into(),
            page,
            last_page,
            status,
            duration_ms: 123,
        }
    }

    #[test]
    fn renders_success_with_page_counts() {
        assert_eq!(
            entry(200, 2, 5).to_string(),
            "ts=2024-01-15T12:00:00Z msg=\"list octocat/hello issues (2/5)\" status=200 duration=123ms"
        );
    }

    #[test]
    fn page_zero_renders_as_one() {
        let rendered = entry(200, 0, 0).to_string();
        assert!(rendered.contains("(1/1)"), "got: {rendered}");
    }

    #[test]
    fn missing_last_page_falls_back_to_page() {
        let rendered = entry(200, 3, 0).to_string();
        assert!(rendered.contains("(3/3)"), "got: {rendered}");
    }

    #[test]
    fn failures_render_without_page_counts() {
        let rendered = entry(403, 2, 5).to_string();
        assert!(!rendered.contains("(2/5)"), "got: {rendered}");
        assert!(rendered.contains("status=403"));
    }

    #[test]
    fn entries_survive_a_json_round_trip() {
        let entry = entry(200, 1, 4);
        let json = serde_json::to_string(&entry).unwrap();
        let back: RequestEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
