//! Status snapshot endpoint.
//!
//! One JSON document with the authoritative queue depths from the job
//! store, both rate budget snapshots, and the newest request log
//! entries. Cache read failures degrade the snapshot (missing fields)
//! instead of failing the request, matching the best-effort contract of
//! the observability layer.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::cache::{RateClass, RequestEntry};
use crate::crawl::JobKind;
use crate::github::RateSnapshot;
use crate::store::{jobs, StoreError};

use super::AppState;

/// How many request log entries the snapshot includes.
const SNAPSHOT_REQUESTS: usize = 100;

/// Errors building the status snapshot.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for StatusError {
    fn into_response(self) -> Response {
        error!(error = %self, "status request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Queue depth per job type, from the store.
#[derive(Debug, Default, Serialize)]
pub struct QueueCounts {
    pub repo: i64,
    pub user: i64,
    pub issue: i64,
}

/// The full status snapshot.
#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub queue: QueueCounts,
    pub core_rate: Option<RateSnapshot>,
    pub search_rate: Option<RateSnapshot>,
    pub requests: Vec<RequestEntry>,
}

/// `GET /_status`.
pub async fn status_handler(
    State(app): State<AppState>,
) -> Result<Json<StatusSnapshot>, StatusError> {
    let mut queue = QueueCounts::default();
    for (kind, count) in jobs::count_by_type(app.store().pool()).await? {
        match JobKind::parse(&kind) {
            Some(JobKind::Repo) => queue.repo = count,
            Some(JobKind::User) => queue.user = count,
            Some(JobKind::Issue) => queue.issue = count,
            None => warn!(kind = %kind, "unknown job type in queue"),
        }
    }

    let core_rate = read_rate(&app, RateClass::Core).await;
    let search_rate = read_rate(&app, RateClass::Search).await;

    let requests = match app.cache().recent_requests(SNAPSHOT_REQUESTS).await {
        Ok(requests) => requests,
        Err(e) => {
            warn!(error = %e, "failed to read request log");
            Vec::new()
        }
    };

    Ok(Json(StatusSnapshot {
        queue,
        core_rate,
        search_rate,
        requests,
    }))
}

async fn read_rate(app: &AppState, class: RateClass) -> Option<RateSnapshot> {
    match app.cache().rate(class).await {
        Ok(rate) => rate,
        Err(e) => {
            warn!(class = %class, error = %e, "failed to read rate snapshot");
            None
        }
    }
}
