//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different identifiers (e.g.
//! using a repository name where an owner is expected) and make the code
//! more self-documenting.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only accepted shape for an upstream issue URL.
///
/// Anything else is a permanent failure for an issue job, so the pattern
/// is deliberately strict: API host, `[\w-]` owner, `[\w.-]` repository,
/// numeric issue number, nothing trailing.
static ISSUE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://api\.github\.com/repos/([\w-]+)/([\w.-]+)/issues/(\d+)$")
        .expect("issue URL pattern is valid")
});

/// Error returned when an issue URL does not have the expected shape.
#[derive(Debug, Clone, Error)]
#[error("couldn't match issue URL: {url}")]
pub struct InvalidIssueUrl {
    url: String,
}

/// A repository identifier (owner plus name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        RepoId {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A fully resolved reference to a single issue, parsed from its API URL.
///
/// Construction is only possible via [`IssueRef::parse`], which validates
/// the URL against the strict pattern above.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueRef {
    pub repo: RepoId,
    pub number: u64,
}

impl IssueRef {
    /// Parses an upstream API issue URL such as
    /// `https://api.github.com/repos/rust-lang/rust/issues/1`.
    pub fn parse(url: &str) -> Result<Self, InvalidIssueUrl> {
        let captures = ISSUE_URL.captures(url).ok_or_else(|| InvalidIssueUrl {
            url: url.to_string(),
        })?;

        let number = captures[3].parse().map_err(|_| InvalidIssueUrl {
            url: url.to_string(),
        })?;

        Ok(IssueRef {
            repo: RepoId::new(&captures[1], &captures[2]),
            number,
        })
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_plain_issue_url() {
        let issue = IssueRef::parse("https://api.github.com/repos/rust-lang/rust/issues/1").unwrap();
        assert_eq!(issue.repo, RepoId::new("rust-lang", "rust"));
        assert_eq!(issue.number, 1);
    }

    #[test]
    fn parses_dotted_repo_name() {
        let issue =
            IssueRef::parse("https://api.github.com/repos/octo-org/my.repo/issues/42").unwrap();
        assert_eq!(issue.repo.name, "my.repo");
        assert_eq!(issue.number, 42);
    }

    #[test]
    fn rejects_html_url() {
        assert!(IssueRef::parse("https://github.com/rust-lang/rust/issues/1").is_err());
    }

    #[test]
    fn rejects_pull_request_url() {
        assert!(IssueRef::parse("https://api.github.com/repos/rust-lang/rust/pulls/1").is_err());
    }

    #[test]
    fn rejects_trailing_segments() {
        assert!(
            IssueRef::parse("https://api.github.com/repos/rust-lang/rust/issues/1/comments")
                .is_err()
        );
    }

    #[test]
    fn rejects_non_numeric_issue_number() {
        assert!(IssueRef::parse("https://api.github.com/repos/rust-lang/rust/issues/abc").is_err());
    }

    #[test]
    fn repo_id_displays_as_owner_slash_name() {
        assert_eq!(RepoId::new("octocat", "hello").to_string(), "octocat/hello");
    }

    proptest! {
        #[test]
        fn round_trips_generated_urls(
            owner in "[a-zA-Z0-9-]{1,20}",
            name in "[a-zA-Z0-9_.-]{1,30}",
            number in 1u64..1_000_000,
        ) {
            let url = format!("https://api.github.com/repos/{owner}/{name}/issues/{number}");
            let issue = IssueRef::parse(&url).unwrap();
            prop_assert_eq!(issue.repo.owner, owner);
            prop_assert_eq!(issue.repo.name, name);
            prop_assert_eq!(issue.number, number);
        }
    }
}
