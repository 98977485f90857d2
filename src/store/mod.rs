//! Persistent store: the job queue plus the issue/comment documents.
//!
//! A single Postgres instance is the coordination point for the whole
//! pipeline. The job queue lives in `jobs`, the crawled documents in
//! `records`, the freshness predicate in `freshness` and the
//! notification wakeup in `listener`.

pub mod freshness;
pub mod jobs;
pub mod listener;
pub mod records;

use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::Transaction;
use thiserror::Error;

pub use jobs::{Lease, MAX_RETRY};
pub use listener::JobsListener;

/// Errors from the store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("stored document is not decodable: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Handle on the database, cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Store { pool })
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Opens the transaction whose lifetime is a job lease.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        Ok(self.pool.begin().await?)
    }
}
