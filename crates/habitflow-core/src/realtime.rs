use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::BackendConfig;
use crate::error::{CoreError, Result};
use crate::events::{ChangeEvent, RowChange};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const TABLES: [&str; 2] = ["habits", "habit_completed"];

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// One frame of the channel protocol the feed speaks.
#[derive(Debug, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    payload: serde_json::Value,
    #[serde(rename = "ref")]
    reference: Option<String>,
}

/// Handle for an open feed subscription. The socket task runs until the
/// handle is shut down or dropped; callers must release it on teardown.
pub struct FeedHandle {
    task: tokio::task::JoinHandle<()>,
}

impl FeedHandle {
    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Change-feed client.
///
/// Joins one channel per table, filtered to the owner, and forwards decoded
/// row changes on an unbounded channel. The feed guarantees ordering per
/// record only and may deliver duplicates; the ledger's apply is idempotent
/// to absorb both.
pub struct RealtimeFeed {
    config: BackendConfig,
}

impl RealtimeFeed {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    /// Connect, join the per-table channels for `owner`, and spawn the pump
    /// task. Events arrive on the returned receiver until the socket closes
    /// or the handle is released.
    pub async fn subscribe(
        &self,
        access_token: &str,
        owner: &str,
    ) -> Result<(FeedHandle, UnboundedReceiver<ChangeEvent>)> {
        let url = self.config.realtime_url();
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| CoreError::Realtime(e.to_string()))?;
        let (mut sink, stream) = socket.split();

        for (index, table) in TABLES.iter().enumerate() {
            let join = PhoenixMessage {
                topic: topic_for(table, owner),
                event: "phx_join".to_string(),
                payload: serde_json::json!({ "user_token": access_token }),
                reference: Some((index + 1).to_string()),
            };
            send_frame(&mut sink, &join).await?;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(pump(sink, stream, tx));
        Ok((FeedHandle { task }, rx))
    }
}

fn topic_for(table: &str, owner: &str) -> String {
    format!("realtime:public:{table}:user_id=eq.{owner}")
}

async fn send_frame(sink: &mut WsSink, frame: &PhoenixMessage) -> Result<()> {
    let text = serde_json::to_string(frame).map_err(|e| CoreError::Realtime(e.to_string()))?;
    sink.send(Message::Text(text))
        .await
        .map_err(|e| CoreError::Realtime(e.to_string()))
}

/// Socket pump: forwards decoded changes, answers pings, and keeps the
/// channel alive with heartbeats. Exits when either side goes away.
async fn pump(mut sink: WsSink, mut stream: WsStream, tx: UnboundedSender<ChangeEvent>) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    let mut heartbeat_ref: u64 = 0;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                heartbeat_ref += 1;
                let frame = PhoenixMessage {
                    topic: "phoenix".to_string(),
                    event: "heartbeat".to_string(),
                    payload: serde_json::json!({}),
                    reference: Some(format!("hb-{heartbeat_ref}")),
                };
                if send_frame(&mut sink, &frame).await.is_err() {
                    tracing::warn!("heartbeat failed; closing change feed");
                    break;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = decode_frame(&text) {
                            if tx.send(event).is_err() {
                                // Receiver gone: subscriber tore down first.
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("change feed socket closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "change feed socket error");
                        break;
                    }
                }
            }
        }
    }
}

fn decode_frame(text: &str) -> Option<ChangeEvent> {
    let frame: PhoenixMessage = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "undecodable feed frame");
            return None;
        }
    };
    decode_change(&frame.topic, &frame.event, &frame.payload)
}

/// Decode one row change from a channel frame. Returns `None` for protocol
/// chatter (join replies, heartbeat acks) and for payloads that do not parse
/// as rows of the two mirrored tables.
fn decode_change(topic: &str, event: &str, payload: &serde_json::Value) -> Option<ChangeEvent> {
    let table = topic.split(':').nth(2)?;

    match (table, event) {
        ("habits", "INSERT") => row(payload, "record").map(|h| ChangeEvent::Habit(RowChange::Insert(h))),
        ("habits", "UPDATE") => row(payload, "record").map(|h| ChangeEvent::Habit(RowChange::Update(h))),
        ("habits", "DELETE") => {
            old_row_id(payload).map(|id| ChangeEvent::Habit(RowChange::Delete { id }))
        }
        ("habit_completed", "INSERT") => {
            row(payload, "record").map(|c| ChangeEvent::Completion(RowChange::Insert(c)))
        }
        ("habit_completed", "UPDATE") => {
            row(payload, "record").map(|c| ChangeEvent::Completion(RowChange::Update(c)))
        }
        ("habit_completed", "DELETE") => {
            old_row_id(payload).map(|id| ChangeEvent::Completion(RowChange::Delete { id }))
        }
        _ => None,
    }
}

fn row<T: serde::de::DeserializeOwned>(payload: &serde_json::Value, key: &str) -> Option<T> {
    match serde_json::from_value(payload.get(key)?.clone()) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(error = %e, "feed record does not match table shape");
            None
        }
    }
}

fn old_row_id(payload: &serde_json::Value) -> Option<i64> {
    payload.get("old_record")?.get("id")?.as_i64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_habit_insert() {
        let payload = serde_json::json!({
            "record": {
                "id": 3,
                "user_id": "user-1",
                "title": "Read",
                "description": "20 pages",
                "streak_count": 0,
                "last_completed": "2024-03-01T08:30:00Z",
                "frequency": "daily"
            }
        });
        let event = decode_change("realtime:public:habits:user_id=eq.user-1", "INSERT", &payload);
        match event {
            Some(ChangeEvent::Habit(RowChange::Insert(habit))) => assert_eq!(habit.id, 3),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn decodes_completion_delete_from_old_record() {
        let payload = serde_json::json!({ "old_record": { "id": 9 } });
        let event = decode_change(
            "realtime:public:habit_completed:user_id=eq.user-1",
            "DELETE",
            &payload,
        );
        assert!(matches!(
            event,
            Some(ChangeEvent::Completion(RowChange::Delete { id: 9 }))
        ));
    }

    #[test]
    fn ignores_protocol_chatter() {
        let payload = serde_json::json!({ "status": "ok" });
        assert!(decode_change("phoenix", "phx_reply", &payload).is_none());
        assert!(decode_change(
            "realtime:public:habits:user_id=eq.user-1",
            "phx_reply",
            &payload
        )
        .is_none());
    }

    #[test]
    fn malformed_record_is_dropped_not_fatal() {
        let payload = serde_json::json!({ "record": { "id": "not-a-number" } });
        assert!(decode_change(
            "realtime:public:habits:user_id=eq.user-1",
            "INSERT",
            &payload
        )
        .is_none());
    }
}
