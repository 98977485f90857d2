//! HTTP server.
//!
//! This module implements the HTTP surface of the crawler:
//! - `GET /` - the globally top-reacted comments
//! - `GET /{login}` - a user's top comments; admits a user crawl
//! - `GET /{owner}/{name}` - a repository's top comments; admits a repo crawl
//! - `GET /_status` - queue counts, rate budgets and the recent request log
//! - `GET /_ws` - live stream of the observability channels
//! - `GET /healthz` - liveness probe

use std::sync::Arc;

use axum::http::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::cache::ObservabilityCache;
use crate::store::Store;

pub mod health;
pub mod status;
pub mod stream;
pub mod views;

pub use health::health_handler;
pub use status::status_handler;
pub use stream::ws_handler;

/// Shared application state, passed to all handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Store,
    cache: Arc<ObservabilityCache>,

    /// Fires on shutdown so long-lived stream connections drain.
    cancel: CancellationToken,
}

impl AppState {
    pub fn new(store: Store, cache: Arc<ObservabilityCache>, cancel: CancellationToken) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                store,
                cache,
                cancel,
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn cache(&self) -> &ObservabilityCache {
        &self.inner.cache
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.inner.cancel
    }
}

/// Builds the axum Router with all endpoints.
///
/// The static routes must win over the `/{login}` capture, which axum
/// guarantees (static segments take precedence over captures).
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/", get(views::global_view))
        .route("/healthz", get(health_handler))
        .route("/_status", get(status_handler))
        .route("/_ws", get(ws_handler))
        .route("/favicon.ico", get(|| async { StatusCode::NOT_FOUND }))
        .route("/{login}", get(views::user_view))
        .route("/{owner}/{name}", get(views::repo_view))
        .with_state(app_state)
}
