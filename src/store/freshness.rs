//! The freshness predicate.
//!
//! An issue is up to date iff we already hold a copy with the same
//! `updated_at` and we hold as many of its comments as the upstream
//! declares. Handlers use this to skip spawning comment-page jobs for
//! issues that have not changed.
//!
//! The comparison is a pure function over what the store returned, so
//! the decision table is testable without a database.

use crate::github::Issue;

use super::{Store, StoreError};

/// Decides freshness from the stored copy and the local comment count.
///
/// A missing stored issue means "new issue": not up to date, never an
/// error.
pub fn issue_unchanged(stored: Option<&Issue>, incoming: &Issue, local_comments: i64) -> bool {
    match stored {
        None => false,
        Some(stored) => {
            stored.updated_at == incoming.updated_at
                && local_comments == i64::from(incoming.comments)
        }
    }
}

impl Store {
    /// True iff the stored copy of `issue` matches its upstream
    /// `updated_at` and all declared comments are present locally.
    pub async fn is_up_to_date(&self, issue: &Issue) -> Result<bool, StoreError> {
        let Some(stored) = self.get_issue(issue.id).await? else {
            return Ok(false);
        };

        let local_comments = self.count_comments_for_issue(&issue.url).await?;
        Ok(issue_unchanged(Some(&stored), issue, local_comments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn issue(updated_at: &str, comments: u32) -> Issue {
        Issue {
            id: 1,
            number: 5,
            url: "https://api.github.com/repos/o/r/issues/5".into(),
            html_url: None,
            title: None,
            state: None,
            user: None,
            comments,
            updated_at: updated_at.parse::<DateTime<Utc>>().unwrap(),
            created_at: None,
        }
    }

    #[test]
    fn missing_stored_issue_is_not_up_to_date() {
        let incoming = issue("2024-01-15T12:00:00Z", 1);
        assert!(!issue_unchanged(None, &incoming, 1));
    }

    #[test]
    fn matching_timestamp_and_count_is_up_to_date() {
        let stored = issue("2024-01-15T12:00:00Z", 2);
        let incoming = issue("2024-01-15T12:00:00Z", 2);
        assert!(issue_unchanged(Some(&stored), &incoming, 2));
    }

    #[test]
    fn newer_upstream_timestamp_is_stale() {
        let stored = issue("2024-01-15T12:00:00Z", 2);
        let incoming = issue("2024-02-01T09:30:00Z", 2);
        assert!(!issue_unchanged(Some(&stored), &incoming, 2));
    }

    #[test]
    fn missing_local_comments_is_stale() {
        let stored = issue("2024-01-15T12:00:00Z", 3);
        let incoming = issue("2024-01-15T12:00:00Z", 3);
        assert!(!issue_unchanged(Some(&stored), &incoming, 1));
    }

    #[test]
    fn surplus_local_comments_is_stale() {
        // More local comments than declared means the issue changed
        // upstream (comments deleted); refetch rather than guess.
        let stored = issue("2024-01-15T12:00:00Z", 1);
        let incoming = issue("2024-01-15T12:00:00Z", 1);
        assert!(!issue_unchanged(Some(&stored), &incoming, 2));
    }

    #[test]
    fn zero_comment_issue_with_clean_store_is_up_to_date() {
        let stored = issue("2024-01-15T12:00:00Z", 0);
        let incoming = issue("2024-01-15T12:00:00Z", 0);
        assert!(issue_unchanged(Some(&stored), &incoming, 0));
    }
}
