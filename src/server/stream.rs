//! Live observability stream.
//!
//! A WebSocket that forwards the cache's pub/sub channels: request log
//! entries (rendered to their human form), rate snapshots (as JSON) and
//! queue counts (as the scalar). Each frame is
//! `{"channel": ..., "pattern": ..., "payload": ...}`.
//!
//! The subscription is per-connection, so a slow client only lags its
//! own socket and can never block a publisher.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::cache::{RequestEntry, StreamMessage, REQUEST_LOG_KEY};

use super::AppState;

/// `GET /_ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_updates(socket, app))
}

async fn stream_updates(mut socket: WebSocket, app: AppState) {
    let mut subscription = match app.cache().subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!(error = %e, "failed to subscribe to observability channels");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = app.cancel().cancelled() => break,

            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Pings are answered by axum; other frames are noise.
                    Some(Ok(_)) => {}
                }
            }

            published = subscription.next() => {
                let Some(message) = published else {
                    debug!("observability subscription closed");
                    break;
                };

                let frame = render_message(&message).to_string();
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Shapes one pub/sub message into the wire frame.
fn render_message(message: &StreamMessage) -> Value {
    let payload = match message.pattern.as_str() {
        REQUEST_LOG_KEY => match serde_json::from_str::<RequestEntry>(&message.payload) {
            Ok(entry) => Value::String(entry.to_string()),
            Err(_) => Value::String(message.payload.clone()),
        },
        "github-*-rate" => serde_json::from_str(&message.payload)
            .unwrap_or_else(|_| Value::String(message.payload.clone())),
        // count-* and anything else: the scalar, verbatim.
        _ => Value::String(message.payload.clone()),
    };

    json!({
        "channel": message.channel,
        "pattern": message.pattern,
        "payload": payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(pattern: &str, channel: &str, payload: &str) -> StreamMessage {
        StreamMessage {
            channel: channel.to_string(),
            pattern: pattern.to_string(),
            payload: payload.to_string(),
        }
    }

    #[test]
    fn request_entries_render_to_their_human_form() {
        let entry = RequestEntry {
            id: 1,
            timestamp: "2024-01-15T12:00:00Z".parse().unwrap(),
            message: "list octocat/hello issues".into(),
            page: 1,
            last_page: 3,
            status: 200,
            duration_ms: 42,
        };
        let raw = serde_json::to_string(&entry).unwrap();

        let frame = render_message(&message("github-requests", "github-requests", &raw));
        let payload = frame["payload"].as_str().unwrap();
        assert!(payload.starts_with("ts=2024-01-15T12:00:00Z"));
        assert!(payload.contains("(1/3)"));
    }

    #[test]
    fn rates_are_forwarded_as_json() {
        let frame = render_message(&message(
            "github-*-rate",
            "github-core-rate",
            r#"{"limit":5000,"remaining":4999,"reset":1700000000}"#,
        ));
        assert_eq!(frame["payload"]["remaining"], 4999);
        assert_eq!(frame["channel"], "github-core-rate");
        assert_eq!(frame["pattern"], "github-*-rate");
    }

    #[test]
    fn counts_are_forwarded_as_the_scalar() {
        let frame = render_message(&message("count-*", "count-issue", "17"));
        assert_eq!(frame["payload"], "17");
    }

    #[test]
    fn undecodable_request_entry_falls_back_to_raw_payload() {
        let frame = render_message(&message("github-requests", "github-requests", "not json"));
        assert_eq!(frame["payload"], "not json");
    }
}
