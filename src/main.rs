//! Comment crawler main entry point.
//!
//! This binary runs the HTTP server and the worker pool against a shared
//! cancellation token: SIGINT/SIGTERM cancels the token, the server
//! drains, workers roll back their leases and exit.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comment_crawler::cache::ObservabilityCache;
use comment_crawler::config::Config;
use comment_crawler::crawl::{spawn_pool, Crawler};
use comment_crawler::github::GithubClient;
use comment_crawler::server::{build_router, AppState};
use comment_crawler::store::Store;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "comment_crawler=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let store = Store::connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    store.migrate().await.expect("failed to run migrations");

    let cache = Arc::new(
        ObservabilityCache::connect(&config.redis_url)
            .await
            .expect("failed to connect to cache"),
    );

    let github =
        GithubClient::new(config.github_token.as_deref()).expect("failed to build upstream client");

    if config.github_token.is_none() {
        tracing::warn!("GITHUB_TOKEN not set, running unauthenticated with tiny rate budgets");
    }

    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received");
            cancel.cancel();
        }
    });

    let crawler = Arc::new(Crawler::new(
        store.clone(),
        Arc::clone(&cache),
        github,
        cancel.clone(),
    ));
    let workers = spawn_pool(config.worker_count, &store, &cache, &crawler, &cancel);
    tracing::info!(workers = config.worker_count, "worker pool started");

    let app_state = AppState::new(store, cache, cancel.clone());
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let cancel = cancel.clone();
            async move { cancel.cancelled().await }
        })
        .await
        .expect("server failed");

    tracing::info!("server drained, waiting for workers");
    for handle in workers {
        let _ = handle.await;
    }
}

/// Completes when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
