//! Upstream API client.
//!
//! `GithubClient` wraps a `reqwest::Client` and exposes exactly the three
//! operations the crawl pipeline needs. Every call measures its duration
//! and captures the status code, rate headers and pagination cursors into
//! a [`CallReport`], whether or not the call succeeded; the fetch
//! handlers publish that telemetry unconditionally.
//!
//! Calls race against the shutdown token, so a worker blocked on a slow
//! upstream response still exits promptly.

use std::time::Instant;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::types::{IssueRef, RepoId};

use super::error::{classify_status, FetchError};
use super::models::{
    page_links, CallReport, Comment, Fetched, Issue, Page, RateSnapshot, SearchResults, PER_PAGE,
};

const BASE_URL: &str = "https://api.github.com";

/// The upstream rejects requests without a user agent.
const USER_AGENT: &str = "comment-crawler";

/// Error building the HTTP client at startup.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token is not a valid header value")]
    InvalidToken,
}

/// A client for the upstream issue-tracking API.
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base: String,
}

impl GithubClient {
    /// Creates a client, authenticated when a token is configured.
    pub fn new(token: Option<&str>) -> Result<Self, ClientBuildError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ClientBuildError::InvalidToken)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(GithubClient {
            http,
            base: BASE_URL.to_string(),
        })
    }

    /// Lists issues of a repository, most recently updated first.
    pub async fn list_repo_issues(
        &self,
        repo: &RepoId,
        page: u32,
        cancel: &CancellationToken,
    ) -> Fetched<Issue> {
        let url = format!("{}/repos/{}/{}/issues", self.base, repo.owner, repo.name);
        let query = [
            ("state", "all".to_string()),
            ("sort", "updated".to_string()),
            ("per_page", PER_PAGE.to_string()),
            ("page", effective_page(page).to_string()),
        ];
        self.fetch_items(&url, &query, cancel, |items: Vec<Issue>| items)
            .await
    }

    /// Searches issues the given user has commented on.
    pub async fn search_commenter_issues(
        &self,
        login: &str,
        page: u32,
        cancel: &CancellationToken,
    ) -> Fetched<Issue> {
        let url = format!("{}/search/issues", self.base);
        let query = [
            ("q", format!("commenter:\"{login}\"")),
            ("sort", "updated".to_string()),
            ("order", "desc".to_string()),
            ("per_page", PER_PAGE.to_string()),
            ("page", effective_page(page).to_string()),
        ];
        self.fetch_items(&url, &query, cancel, |results: SearchResults| results.items)
            .await
    }

    /// Lists the comments of one issue.
    pub async fn list_issue_comments(
        &self,
        issue: &IssueRef,
        page: u32,
        cancel: &CancellationToken,
    ) -> Fetched<Comment> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.base, issue.repo.owner, issue.repo.name, issue.number
        );
        let query = [
            ("per_page", PER_PAGE.to_string()),
            ("page", effective_page(page).to_string()),
        ];
        self.fetch_items(&url, &query, cancel, |items: Vec<_>| items)
            .await
    }

    /// Runs one GET and decodes the page of items out of the body.
    async fn fetch_items<T, D, F>(
        &self,
        url: &str,
        query: &[(&str, String)],
        cancel: &CancellationToken,
        extract: F,
    ) -> Fetched<T>
    where
        D: DeserializeOwned,
        F: FnOnce(D) -> Vec<T>,
    {
        let (raw, report) = self.execute(url, query, cancel).await;

        let outcome = raw.and_then(|raw| {
            let decoded: D = serde_json::from_slice(&raw.body)
                .map_err(|e| FetchError::transient(format!("undecodable response body: {e}")))?;
            Ok(Page {
                items: extract(decoded),
                next_page: raw.next_page,
                last_page: raw.last_page,
            })
        });

        Fetched { outcome, report }
    }

    async fn execute(
        &self,
        url: &str,
        query: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> (Result<RawPage, FetchError>, CallReport) {
        let start = Instant::now();
        let no_response = |error: FetchError, start: Instant| {
            (
                Err(error),
                CallReport {
                    status: None,
                    rate: None,
                    duration: start.elapsed(),
                },
            )
        };

        let response = tokio::select! {
            _ = cancel.cancelled() => return no_response(FetchError::Cancelled, start),
            response = self.http.get(url).query(query).send() => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => return no_response(FetchError::transient(format!("request failed: {e}")), start),
        };

        let status = response.status().as_u16();
        let rate = RateSnapshot::from_headers(response.headers());
        let (next_page, last_page) = page_links(response.headers());
        let report = |start: Instant| CallReport {
            status: Some(status),
            rate,
            duration: start.elapsed(),
        };

        if !response.status().is_success() {
            let body = tokio::select! {
                _ = cancel.cancelled() => String::new(),
                body = response.text() => body.unwrap_or_default(),
            };
            return (
                Err(classify_status(status, rate.as_ref(), &body)),
                report(start),
            );
        }

        let body = tokio::select! {
            _ = cancel.cancelled() => return (Err(FetchError::Cancelled), report(start)),
            body = response.bytes() => body,
        };

        match body {
            Ok(body) => (
                Ok(RawPage {
                    body: body.to_vec(),
                    next_page,
                    last_page,
                }),
                report(start),
            ),
            Err(e) => (
                Err(FetchError::transient(format!("failed to read body: {e}"))),
                report(start),
            ),
        }
    }
}

struct RawPage {
    body: Vec<u8>,
    next_page: Option<u32>,
    last_page: Option<u32>,
}

/// Page zero means "the first page" throughout the system; normalize it
/// before it reaches the wire.
pub fn effective_page(page: u32) -> u32 {
    page.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_without_token() {
        assert!(GithubClient::new(None).is_ok());
    }

    #[test]
    fn builds_with_token() {
        assert!(GithubClient::new(Some("ghp_sometoken")).is_ok());
    }

    #[test]
    fn empty_token_is_treated_as_unauthenticated() {
        assert!(GithubClient::new(Some("")).is_ok());
    }

    #[test]
    fn token_with_control_characters_is_rejected() {
        assert!(matches!(
            GithubClient::new(Some("bad\ntoken")),
            Err(ClientBuildError::InvalidToken)
        ));
    }

    #[test]
    fn page_zero_is_first_page() {
        assert_eq!(effective_page(0), 1);
        assert_eq!(effective_page(1), 1);
        assert_eq!(effective_page(7), 7);
    }
}
