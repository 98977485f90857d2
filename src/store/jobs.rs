//! The durable job queue.
//!
//! A row in `jobs` exists iff work remains. Leasing is `FOR UPDATE SKIP
//! LOCKED` inside a worker-held transaction, so at most one worker
//! processes a given job at a time and a crashed or cancelled worker
//! abandons its lease by rollback. Inserts are deduplicated on
//! `(type, payload)` and fire the `jobs` notification via a trigger,
//! waking idle workers.

use sqlx::postgres::Postgres;
use sqlx::{PgExecutor, Transaction};

use super::StoreError;

/// A job observed failing with `retry >= MAX_RETRY` is dropped instead
/// of being reinserted.
pub const MAX_RETRY: i32 = 3;

/// A leased queue row. Valid only for the lifetime of the transaction it
/// was leased in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub id: i64,
    pub kind: String,
    pub payload: Vec<u8>,
    pub retry: i32,
}

/// Inserts a job, deduplicated on `(type, payload)`.
///
/// Returns whether a row was actually created, since a dedup no-op must not
/// bump the queue counters. Runs against the pool (handler fan-out) or
/// inside the worker transaction (retry reinsert).
pub async fn enqueue<'e>(
    executor: impl PgExecutor<'e>,
    kind: &str,
    payload: &[u8],
    retry: i32,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "INSERT INTO jobs (type, payload, retry) VALUES ($1, $2, $3) \
         ON CONFLICT (type, payload) DO NOTHING",
    )
    .bind(kind)
    .bind(payload)
    .bind(retry)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Leases the oldest unleased job, or returns `None` when every row is
/// locked or the queue is empty.
pub async fn lease_one(
    tx: &mut Transaction<'_, Postgres>,
) -> Result<Option<Lease>, StoreError> {
    let row: Option<(i64, String, Vec<u8>, i32)> = sqlx::query_as(
        "SELECT id, type, payload, retry FROM jobs \
         ORDER BY created_at LIMIT 1 FOR UPDATE SKIP LOCKED",
    )
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|(id, kind, payload, retry)| Lease {
        id,
        kind,
        payload,
        retry,
    }))
}

/// Deletes a leased job within its lease transaction.
pub async fn delete(tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM jobs WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Authoritative queue depth per job type.
pub async fn count_by_type<'e>(
    executor: impl PgExecutor<'e>,
) -> Result<Vec<(String, i64)>, StoreError> {
    Ok(
        sqlx::query_as("SELECT type, count(*) FROM jobs GROUP BY type")
            .fetch_all(executor)
            .await?,
    )
}
