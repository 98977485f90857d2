//! The crawl pipeline: job payloads, fetch handlers and the worker pool.

pub mod handlers;
pub mod payload;
pub mod worker;

use tracing::warn;

use crate::cache::ObservabilityCache;
use crate::store::{jobs, Store, StoreError};

pub use handlers::Crawler;
pub use payload::{IssuePage, JobKind, JobPayload, RepoPage, UserPage};
pub use worker::{spawn_pool, Worker, DEFAULT_WORKER_COUNT};

/// Enqueues a job with dedup, bumping the published queue counter only
/// when a row was actually created. Used by the handlers' fan-out and by
/// the HTTP admit endpoints alike.
pub async fn enqueue_job(
    store: &Store,
    cache: &ObservabilityCache,
    payload: &JobPayload,
) -> Result<bool, StoreError> {
    let kind = payload.kind();
    let inserted = jobs::enqueue(store.pool(), kind.as_str(), &payload.encode(), 0).await?;

    if inserted {
        if let Err(e) = cache.incr_count(kind.as_str(), 1).await {
            warn!(error = %e, "failed to publish queue count");
        }
    }

    Ok(inserted)
}

/// Admits a user crawl (root job, first page).
pub async fn admit_user(
    store: &Store,
    cache: &ObservabilityCache,
    login: &str,
) -> Result<bool, StoreError> {
    enqueue_job(
        store,
        cache,
        &JobPayload::User(UserPage {
            login: login.to_string(),
            page: 0,
        }),
    )
    .await
}

/// Admits a repository crawl (root job, first page).
pub async fn admit_repo(
    store: &Store,
    cache: &ObservabilityCache,
    owner: &str,
    name: &str,
) -> Result<bool, StoreError> {
    enqueue_job(
        store,
        cache,
        &JobPayload::Repo(RepoPage {
            owner: owner.to_string(),
            name: name.to_string(),
            page: 0,
        }),
    )
    .await
}
