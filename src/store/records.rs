//! Issue and comment document storage.
//!
//! Documents are stored as the upstream JSON, uniquely keyed on the
//! upstream id. Upserts are last-writer-wins guarded by `updated_at`, so
//! replaying an old page can never clobber newer data.

use tracing::warn;

use crate::github::{Comment, Issue};
use crate::types::RepoId;

use super::{Store, StoreError};

/// How many comments the views return.
const VIEW_LIMIT: i64 = 100;

impl Store {
    /// Upserts an issue; an existing row only changes if the incoming
    /// document is strictly newer.
    pub async fn insert_issue(&self, issue: &Issue) -> Result<(), StoreError> {
        let json = serde_json::to_string(issue)?;
        sqlx::query(
            "INSERT INTO issues (j) VALUES ($1::jsonb) \
             ON CONFLICT (((j->>'id')::bigint)) DO UPDATE SET j = excluded.j \
             WHERE (issues.j->>'updated_at')::timestamptz < (excluded.j->>'updated_at')::timestamptz",
        )
        .bind(&json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upserts a comment, tagged with its containing `owner/name` so the
    /// by-repo view does not have to parse URLs.
    pub async fn insert_comment(&self, comment: &Comment, repo: &str) -> Result<(), StoreError> {
        let json = serde_json::to_string(comment)?;
        sqlx::query(
            "INSERT INTO comments (j, repo) VALUES ($1::jsonb, $2) \
             ON CONFLICT (((j->>'id')::bigint)) DO UPDATE SET j = excluded.j, repo = excluded.repo \
             WHERE (comments.j->>'updated_at')::timestamptz < (excluded.j->>'updated_at')::timestamptz",
        )
        .bind(&json)
        .bind(repo)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetches a stored issue by upstream id.
    pub async fn get_issue(&self, id: u64) -> Result<Option<Issue>, StoreError> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT j::text FROM issues WHERE (j->>'id')::bigint = $1")
                .bind(id as i64)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match raw {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    /// Counts the locally stored comments of one issue.
    pub async fn count_comments_for_issue(&self, issue_url: &str) -> Result<i64, StoreError> {
        Ok(
            sqlx::query_scalar("SELECT count(*) FROM comments WHERE j->>'issue_url' = $1")
                .bind(issue_url)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// The global view: reacted-to comments, most reactions first.
    pub async fn top_comments(&self) -> Result<Vec<Comment>, StoreError> {
        self.comment_view(
            "SELECT j::text FROM comments \
             WHERE (j#>>'{reactions,total_count}')::int > 0 \
             ORDER BY (j#>>'{reactions,total_count}')::int DESC LIMIT $1",
            None,
        )
        .await
    }

    /// Reacted-to comments written by one user.
    pub async fn top_comments_for_user(&self, login: &str) -> Result<Vec<Comment>, StoreError> {
        self.comment_view(
            "SELECT j::text FROM comments \
             WHERE (j#>>'{reactions,total_count}')::int > 0 AND j#>>'{user,login}' = $2 \
             ORDER BY (j#>>'{reactions,total_count}')::int DESC LIMIT $1",
            Some(login.to_string()),
        )
        .await
    }

    /// Reacted-to comments inside one repository.
    pub async fn top_comments_for_repo(&self, repo: &RepoId) -> Result<Vec<Comment>, StoreError> {
        self.comment_view(
            "SELECT j::text FROM comments \
             WHERE (j#>>'{reactions,total_count}')::int > 0 AND repo = $2 \
             ORDER BY (j#>>'{reactions,total_count}')::int DESC LIMIT $1",
            Some(repo.to_string()),
        )
        .await
    }

    async fn comment_view(
        &self,
        sql: &str,
        filter: Option<String>,
    ) -> Result<Vec<Comment>, StoreError> {
        let mut query = sqlx::query_scalar::<_, String>(sql).bind(VIEW_LIMIT);
        if let Some(filter) = filter {
            query = query.bind(filter);
        }
        let rows = query.fetch_all(&self.pool).await?;

        // A row that predates a model change is dropped from the view,
        // not an error.
        Ok(rows
            .iter()
            .filter_map(|json| match serde_json::from_str(json) {
                Ok(comment) => Some(comment),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable comment row");
                    None
                }
            })
            .collect())
    }
}
