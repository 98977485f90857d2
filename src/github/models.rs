//! Wire models for the upstream issue-tracking API.
//!
//! Issues and comments are stored verbatim (as JSON documents) and served
//! back to the UI, so the structs here are both the decode target for
//! upstream responses and the row format for the store. Only the fields
//! the crawler and the views consume are declared; the crawler owns every
//! document it stores, so nothing else survives the round trip.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use super::error::FetchError;

/// Items fetched per page on every endpoint.
pub const PER_PAGE: u32 = 100;

/// An upstream user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub login: String,
}

/// Reaction totals attached to issues and comments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reactions {
    #[serde(default)]
    pub total_count: u32,
}

/// An issue as returned by the list and search endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub number: u64,
    /// API URL of the issue; the key used to tie comments back to it.
    pub url: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub user: Option<Account>,
    /// Declared number of comments, compared against our local count by
    /// the freshness check.
    #[serde(default)]
    pub comments: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A single issue comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    /// API URL of the parent issue.
    pub issue_url: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: Option<Account>,
    #[serde(default)]
    pub reactions: Reactions,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Envelope of the search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    pub items: Vec<Issue>,
}

/// A rate budget snapshot, taken from the `x-ratelimit-*` headers the
/// upstream attaches to every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub limit: u32,
    pub remaining: u32,
    /// Budget reset time as epoch seconds, as sent by the upstream.
    pub reset: i64,
}

impl RateSnapshot {
    /// Reads the snapshot off a response's headers. The upstream sends
    /// all three headers together; a response missing any of them (e.g.
    /// from an intermediary) yields no snapshot.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        Some(RateSnapshot {
            limit: header_number(headers, "x-ratelimit-limit")?,
            remaining: header_number(headers, "x-ratelimit-remaining")?,
            reset: header_number(headers, "x-ratelimit-reset")?,
        })
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.reset, 0).unwrap_or_else(Utc::now)
    }
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// One page of results plus the pagination cursors from the `Link` header.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
    pub last_page: Option<u32>,
}

/// What we know about an upstream call regardless of how it went:
/// the status code and rate snapshot whenever the upstream responded,
/// and the measured wall-clock duration always.
#[derive(Debug, Clone)]
pub struct CallReport {
    pub status: Option<u16>,
    pub rate: Option<RateSnapshot>,
    pub duration: std::time::Duration,
}

/// Result of one upstream operation. The report is populated even when
/// the outcome is an error so the handler can publish rate and request
/// telemetry for failed calls too.
#[derive(Debug)]
pub struct Fetched<T> {
    pub outcome: Result<Page<T>, FetchError>,
    pub report: CallReport,
}

/// Extracts `next` and `last` page numbers from a `Link` header value.
///
/// The header looks like:
/// `<https://api.github.com/...?page=2>; rel="next", <https://api.github.com/...?page=34>; rel="last"`
pub fn parse_link_header(value: &str) -> (Option<u32>, Option<u32>) {
    let mut next = None;
    let mut last = None;

    for part in value.split(',') {
        let mut segments = part.split(';');
        let Some(url) = segments.next() else { continue };
        let url = url.trim().trim_start_matches('<').trim_end_matches('>');

        let rel = segments
            .map(str::trim)
            .find_map(|s| s.strip_prefix("rel=").map(|r| r.trim_matches('"')));

        let page = page_query_param(url);
        match rel {
            Some("next") => next = page,
            Some("last") => last = page,
            _ => {}
        }
    }

    (next, last)
}

fn page_query_param(url: &str) -> Option<u32> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("page="))
        .and_then(|n| n.parse().ok())
}

/// Reads pagination cursors off a response's headers.
pub fn page_links(headers: &HeaderMap) -> (Option<u32>, Option<u32>) {
    headers
        .get("link")
        .and_then(|v| v.to_str().ok())
        .map(parse_link_header)
        .unwrap_or((None, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                name.parse::<HeaderName>().unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn rate_snapshot_from_complete_headers() {
        let headers = headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "4987"),
            ("x-ratelimit-reset", "1700000000"),
        ]);
        let rate = RateSnapshot::from_headers(&headers).unwrap();
        assert_eq!(rate.limit, 5000);
        assert_eq!(rate.remaining, 4987);
        assert_eq!(rate.reset_at().timestamp(), 1_700_000_000);
    }

    #[test]
    fn rate_snapshot_missing_header_yields_none() {
        let headers = headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-reset", "1700000000"),
        ]);
        assert!(RateSnapshot::from_headers(&headers).is_none());
    }

    #[test]
    fn link_header_with_next_and_last() {
        let value = r#"<https://api.github.com/repositories/1/issues?state=all&page=2>; rel="next", <https://api.github.com/repositories/1/issues?state=all&page=34>; rel="last""#;
        assert_eq!(parse_link_header(value), (Some(2), Some(34)));
    }

    #[test]
    fn link_header_on_last_page_has_prev_and_first() {
        let value = r#"<https://api.github.com/repositories/1/issues?page=33>; rel="prev", <https://api.github.com/repositories/1/issues?page=1>; rel="first""#;
        assert_eq!(parse_link_header(value), (None, None));
    }

    #[test]
    fn link_header_page_param_position_does_not_matter() {
        let value = r#"<https://api.github.com/search/issues?page=3&q=commenter>; rel="next""#;
        assert_eq!(parse_link_header(value), (Some(3), None));
    }

    #[test]
    fn absent_link_header_means_single_page() {
        assert_eq!(page_links(&HeaderMap::new()), (None, None));
    }

    #[test]
    fn issue_decodes_with_minimal_fields() {
        let issue: Issue = serde_json::from_value(serde_json::json!({
            "id": 7,
            "number": 12,
            "url": "https://api.github.com/repos/o/r/issues/12",
            "updated_at": "2024-01-15T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(issue.comments, 0);
        assert!(issue.title.is_none());
    }

    #[test]
    fn comment_reaction_totals_default_to_zero() {
        let comment: Comment = serde_json::from_value(serde_json::json!({
            "id": 99,
            "issue_url": "https://api.github.com/repos/o/r/issues/12",
            "updated_at": "2024-01-15T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(comment.reactions.total_count, 0);
    }

    #[test]
    fn comment_round_trips_through_json() {
        let comment = Comment {
            id: 1,
            issue_url: "https://api.github.com/repos/o/r/issues/2".into(),
            url: None,
            html_url: Some("https://github.com/o/r/issues/2#issuecomment-1".into()),
            body: Some("nice".into()),
            user: Some(Account {
                login: "octocat".into(),
            }),
            reactions: Reactions { total_count: 5 },
            updated_at: "2024-01-15T12:00:00Z".parse().unwrap(),
            created_at: None,
        };
        let json = serde_json::to_string(&comment).unwrap();
        let back: Comment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, comment);
    }
}
