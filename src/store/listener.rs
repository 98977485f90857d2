//! Insert-notification wakeups for idle workers.
//!
//! The `jobs` table's insert trigger fires `pg_notify('jobs', '')`; each
//! worker holds one listener and blocks on it (or on cancellation) when
//! the queue is drained, instead of polling.

use sqlx::postgres::{PgListener, PgPool};

use super::StoreError;

/// The notification channel fired by the jobs insert trigger.
pub const JOBS_CHANNEL: &str = "jobs";

/// A dedicated listening connection on the `jobs` channel.
pub struct JobsListener {
    listener: PgListener,
}

impl JobsListener {
    pub async fn connect(pool: &PgPool) -> Result<Self, StoreError> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(JOBS_CHANNEL).await?;
        Ok(JobsListener { listener })
    }

    /// Blocks until a job is inserted. The payload carries no
    /// information; the wakeup itself is the signal.
    pub async fn recv(&mut self) -> Result<(), StoreError> {
        self.listener.recv().await?;
        Ok(())
    }
}
