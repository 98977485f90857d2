//! The worker pool.
//!
//! Each worker loops: lease one job in a fresh transaction, dispatch it
//! to a handler, delete the row, reinsert with a bumped retry counter if
//! the handler failed and retries remain, commit, then classify the
//! failure. A rate-limited worker sleeps until the budget resets without
//! quiescing the rest of the pool; an idle worker blocks on the insert
//! notification instead of polling (with a coarse fallback tick in case
//! a notification is lost between the empty lease and the wait).
//!
//! Cancellation rolls the open transaction back, which abandons the
//! lease: the row becomes leasable again and no job is lost.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::ObservabilityCache;
use crate::github::FetchError;
use crate::store::{jobs, JobsListener, Lease, Store, StoreError, MAX_RETRY};

use super::handlers::Crawler;
use super::payload::JobPayload;

/// Default worker pool size.
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Fallback wakeup for idle workers, covering the window between a
/// failed lease and the start of the notification wait.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Pause after a store-level failure so a broken database does not spin
/// the loop hot.
const STEP_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Outcome of one pass over the queue.
enum Step {
    /// A job was processed and committed successfully.
    Done,
    /// A job was processed and committed, but its handler failed.
    Failed(FetchError),
    /// No leasable row.
    Idle,
    /// Cancellation observed; the lease was rolled back.
    Cancelled,
}

/// A single queue worker.
pub struct Worker {
    id: usize,
    store: Store,
    cache: Arc<ObservabilityCache>,
    crawler: Arc<Crawler>,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(
        id: usize,
        store: Store,
        cache: Arc<ObservabilityCache>,
        crawler: Arc<Crawler>,
        cancel: CancellationToken,
    ) -> Self {
        Worker {
            id,
            store,
            cache,
            crawler,
            cancel,
        }
    }

    pub async fn run(self) {
        info!(worker = self.id, "worker starting");

        let mut listener = match JobsListener::connect(self.store.pool()).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(worker = self.id, error = %e, "failed to open notification listener");
                return;
            }
        };

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.step().await {
                Ok(Step::Done) => {}
                Ok(Step::Idle) => {
                    if !self.wait_for_work(&mut listener).await {
                        break;
                    }
                }
                Ok(Step::Cancelled) => break,
                Ok(Step::Failed(FetchError::RateLimited { reset_at })) => {
                    self.pause_until(reset_at).await;
                }
                Ok(Step::Failed(FetchError::Cancelled)) => break,
                Ok(Step::Failed(err)) => {
                    warn!(worker = self.id, error = %err, kind = err.kind(), "job failed");
                }
                Err(e) => {
                    warn!(worker = self.id, error = %e, "queue pass failed");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(STEP_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!(worker = self.id, "worker stopped");
    }

    /// One pass: lease, dispatch, delete, maybe reinsert, commit.
    async fn step(&self) -> Result<Step, StoreError> {
        let mut tx = self.store.begin().await?;

        let Some(lease) = jobs::lease_one(&mut tx).await? else {
            tx.rollback().await?;
            return Ok(Step::Idle);
        };

        debug!(
            worker = self.id,
            job_id = lease.id,
            kind = %lease.kind,
            retry = lease.retry,
            "leased job"
        );

        let jerr = self.process(&lease).await;

        if matches!(jerr, Some(FetchError::Cancelled)) {
            // Abandon the lease; the row becomes leasable again.
            tx.rollback().await?;
            return Ok(Step::Cancelled);
        }

        jobs::delete(&mut tx, lease.id).await?;
        self.adjust_count(&lease.kind, -1).await;

        if let Some(err) = &jerr {
            if requeue_allowed(lease.retry) {
                jobs::enqueue(&mut *tx, &lease.kind, &lease.payload, lease.retry + 1).await?;
                self.adjust_count(&lease.kind, 1).await;
            } else {
                warn!(
                    worker = self.id,
                    job_id = lease.id,
                    kind = %lease.kind,
                    retry = lease.retry,
                    error = %err,
                    "job exhausted retries, dropping"
                );
            }
        }

        tx.commit().await?;

        Ok(match jerr {
            None => Step::Done,
            Some(err) => Step::Failed(err),
        })
    }

    /// Decodes and dispatches a leased job; returns the job error, if
    /// any. An unknown type or undecodable payload is permanent.
    async fn process(&self, lease: &Lease) -> Option<FetchError> {
        let payload = match JobPayload::decode(&lease.kind, &lease.payload) {
            Ok(payload) => payload,
            Err(e) => return Some(FetchError::permanent(e.to_string())),
        };

        self.crawler.handle(&payload).await.err()
    }

    async fn adjust_count(&self, kind: &str, delta: i64) {
        if let Err(e) = self.cache.incr_count(kind, delta).await {
            warn!(error = %e, "failed to publish queue count");
        }
    }

    /// Blocks until a job is inserted, the fallback tick fires, or the
    /// pool shuts down. Returns false on shutdown.
    async fn wait_for_work(&self, listener: &mut JobsListener) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            result = listener.recv() => {
                if let Err(e) = result {
                    warn!(worker = self.id, error = %e, "notification listener failed");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return false,
                        _ = tokio::time::sleep(STEP_ERROR_BACKOFF) => {}
                    }
                }
                true
            }
            _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => true,
        }
    }

    /// Rate-limit backoff. Blocks only this worker; jobs on the other
    /// rate class keep flowing through the rest of the pool.
    async fn pause_until(&self, reset_at: DateTime<Utc>) {
        let wait = (reset_at - Utc::now()).to_std().unwrap_or_default();
        info!(worker = self.id, reset_at = %reset_at, wait_secs = wait.as_secs(), "rate limited, backing off");
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

/// A failed job is reinserted iff its retry counter has room left.
fn requeue_allowed(retry: i32) -> bool {
    retry < MAX_RETRY
}

/// Spawns the worker pool.
pub fn spawn_pool(
    count: usize,
    store: &Store,
    cache: &Arc<ObservabilityCache>,
    crawler: &Arc<Crawler>,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|id| {
            let worker = Worker::new(
                id,
                store.clone(),
                Arc::clone(cache),
                Arc::clone(crawler),
                cancel.clone(),
            );
            tokio::spawn(worker.run())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requeue_allowed_below_the_cap() {
        assert!(requeue_allowed(0));
        assert!(requeue_allowed(1));
        assert!(requeue_allowed(2));
    }

    #[test]
    fn requeue_denied_at_the_cap() {
        // retry=3 going in means this was the fourth attempt; drop it.
        assert!(!requeue_allowed(MAX_RETRY));
        assert!(!requeue_allowed(MAX_RETRY + 1));
    }
}
