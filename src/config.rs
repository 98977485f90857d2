//! Environment configuration.

use crate::crawl::DEFAULT_WORKER_COUNT;

/// Configuration for the crawler, loaded from environment variables with
/// defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres DSN for the job queue and the document store.
    pub database_url: String,

    /// Redis DSN for the observability cache.
    pub redis_url: String,

    /// Upstream bearer token; unauthenticated when absent.
    pub github_token: Option<String>,

    /// HTTP listen port.
    pub port: u16,

    /// Worker pool size.
    pub worker_count: usize,
}

impl Config {
    /// Loads configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/comment_crawler".to_string());

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let github_token = std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|token| !token.is_empty());

        let port = std::env::var("PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(8080);

        let worker_count = std::env::var("WORKER_COUNT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .filter(|&count| count > 0)
            .unwrap_or(DEFAULT_WORKER_COUNT);

        Config {
            database_url,
            redis_url,
            github_token,
            port,
            worker_count,
        }
    }
}
