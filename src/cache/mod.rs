//! Observability cache.
//!
//! A thin layer over redis holding everything the UI observes live: the
//! two rate budget snapshots (with TTL until their reset), the bounded
//! request log, and per-type queue counters. Every write also publishes
//! on a channel named after the key so the stream endpoint can fan the
//! update out to subscribers.
//!
//! Delivery is best effort by design: a lost publish degrades the UI but
//! must never fail a job, so the crawl path logs and swallows every
//! `CacheError`.

pub mod request_log;

use std::fmt;

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::warn;

use crate::github::RateSnapshot;

pub use request_log::RequestEntry;

/// List (and channel) holding the request log.
pub const REQUEST_LOG_KEY: &str = "github-requests";

/// Monotonic id counter for request log entries.
const REQUEST_LOG_ID_KEY: &str = "github-requests-id";

/// Maximum number of retained request log entries.
pub const REQUEST_LOG_CAP: isize = 1000;

/// The two independent upstream rate budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateClass {
    Core,
    Search,
}

impl RateClass {
    /// Cache key; doubles as the pub/sub channel name.
    pub fn key(&self) -> &'static str {
        match self {
            RateClass::Core => "github-core-rate",
            RateClass::Search => "github-search-rate",
        }
    }
}

impl fmt::Display for RateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateClass::Core => write!(f, "core"),
            RateClass::Search => write!(f, "search"),
        }
    }
}

fn count_key(kind: &str) -> String {
    format!("count-{kind}")
}

/// Errors from the cache layer.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Key/value + list store for rate snapshots, the recent-request log and
/// per-type queue counts, with publish-on-write.
#[derive(Clone)]
pub struct ObservabilityCache {
    /// Kept around to open dedicated pub/sub connections.
    client: redis::Client,
    conn: ConnectionManager,
}

impl ObservabilityCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(ObservabilityCache { client, conn })
    }

    /// Stores a rate snapshot with a TTL running out at its reset time,
    /// and publishes it on the class channel.
    pub async fn update_rate(
        &self,
        class: RateClass,
        rate: &RateSnapshot,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(rate)?;
        let ttl = (rate.reset_at() - Utc::now()).num_seconds().max(1) as u64;

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(class.key(), &json, ttl).await?;
        conn.publish::<_, _, ()>(class.key(), &json).await?;
        Ok(())
    }

    /// Assigns the next monotonic id to the entry, prepends it to the
    /// bounded request log and publishes it.
    pub async fn append_request(&self, mut entry: RequestEntry) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();

        entry.id = conn.incr(REQUEST_LOG_ID_KEY, 1).await?;
        let json = serde_json::to_string(&entry)?;

        conn.lpush::<_, _, ()>(REQUEST_LOG_KEY, &json).await?;
        conn.ltrim::<_, ()>(REQUEST_LOG_KEY, 0, REQUEST_LOG_CAP - 1)
            .await?;
        conn.publish::<_, _, ()>(REQUEST_LOG_KEY, &json).await?;
        Ok(())
    }

    /// Adjusts a per-type queue counter and publishes the new value.
    ///
    /// The counters are eventually consistent with the job store; the
    /// authoritative numbers come from `count_by_type` there.
    pub async fn incr_count(&self, kind: &str, delta: i64) -> Result<(), CacheError> {
        let key = count_key(kind);
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(&key, delta).await?;
        conn.publish::<_, _, ()>(&key, value).await?;
        Ok(())
    }

    pub async fn rate(&self, class: RateClass) -> Result<Option<RateSnapshot>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(class.key()).await?;
        Ok(match raw {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    pub async fn count(&self, kind: &str) -> Result<i64, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<i64> = conn.get(count_key(kind)).await?;
        Ok(raw.unwrap_or(0))
    }

    /// Returns the newest `limit` request log entries, newest first.
    pub async fn recent_requests(&self, limit: usize) -> Result<Vec<RequestEntry>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(REQUEST_LOG_KEY, 0, limit as isize - 1)
            .await?;

        // An undecodable entry (e.g. from an older build) is dropped, not
        // an error.
        Ok(raw
            .iter()
            .filter_map(|json| match serde_json::from_str(json) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable request log entry");
                    None
                }
            })
            .collect())
    }

    /// Opens a dedicated pub/sub connection subscribed to the request
    /// log, both rate channels and all count channels.
    pub async fn subscribe(&self) -> Result<CacheSubscription, CacheError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for pattern in [REQUEST_LOG_KEY, "github-*-rate", "count-*"] {
            pubsub.psubscribe(pattern).await?;
        }
        Ok(CacheSubscription { pubsub })
    }
}

/// One message from the cache's pub/sub fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub channel: String,
    pub pattern: String,
    pub payload: String,
}

/// A live subscription to the observability channels.
pub struct CacheSubscription {
    pubsub: redis::aio::PubSub,
}

impl CacheSubscription {
    /// Waits for the next message. Messages that cannot be decoded as
    /// UTF-8 are skipped; `None` means the connection is gone.
    pub async fn next(&mut self) -> Option<StreamMessage> {
        use futures_util::StreamExt;

        loop {
            let msg = self.pubsub.on_message().next().await?;

            let (Ok(pattern), Ok(payload)) =
                (msg.get_pattern::<String>(), msg.get_payload::<String>())
            else {
                warn!("skipping non-UTF-8 pub/sub message");
                continue;
            };

            return Some(StreamMessage {
                channel: msg.get_channel_name().to_string(),
                pattern,
                payload,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_class_keys_match_channel_names() {
        assert_eq!(RateClass::Core.key(), "github-core-rate");
        assert_eq!(RateClass::Search.key(), "github-search-rate");
    }

    #[test]
    fn count_keys_are_per_kind() {
        assert_eq!(count_key("repo"), "count-repo");
        assert_eq!(count_key("issue"), "count-issue");
    }
}
