//! Comment views and crawl admission.
//!
//! Viewing a user or a repository serves whatever is already known and
//! admits a crawl for it in the same request, so repeated visits watch
//! the ranking fill in. Admission is idempotent: the queue deduplicates
//! on `(type, payload)`.

use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::crawl;
use crate::github::Comment;
use crate::store::StoreError;
use crate::types::RepoId;

use super::AppState;

/// Errors serving a comment view.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        error!(error = %self, "view request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// The payload of every comment view.
#[derive(Debug, Serialize)]
pub struct CommentsView {
    pub duration_ms: u64,
    pub comments: Vec<Comment>,
}

impl CommentsView {
    fn new(comments: Vec<Comment>, start: Instant) -> Self {
        CommentsView {
            duration_ms: start.elapsed().as_millis() as u64,
            comments,
        }
    }
}

/// `GET /`: top-reacted comments across everything crawled so far.
pub async fn global_view(State(app): State<AppState>) -> Result<Json<CommentsView>, ViewError> {
    let start = Instant::now();
    let comments = app.store().top_comments().await?;
    Ok(Json(CommentsView::new(comments, start)))
}

/// `GET /{login}`: a user's top comments, admitting a user crawl.
pub async fn user_view(
    State(app): State<AppState>,
    Path(login): Path<String>,
) -> Result<Json<CommentsView>, ViewError> {
    let start = Instant::now();
    let comments = app.store().top_comments_for_user(&login).await?;
    crawl::admit_user(app.store(), app.cache(), &login).await?;
    Ok(Json(CommentsView::new(comments, start)))
}

/// `GET /{owner}/{name}`: a repository's top comments, admitting a
/// repo crawl.
pub async fn repo_view(
    State(app): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
) -> Result<Json<CommentsView>, ViewError> {
    let start = Instant::now();
    let repo = RepoId::new(owner, name);
    let comments = app.store().top_comments_for_repo(&repo).await?;
    crawl::admit_repo(app.store(), app.cache(), &repo.owner, &repo.name).await?;
    Ok(Json(CommentsView::new(comments, start)))
}
