//! Insert-event subscription over the hosted Realtime websocket.
//!
//! Speaks the Phoenix channel protocol (v1 JSON frames): join one topic with a
//! `postgres_changes` filter for `INSERT` on the message table, keep the socket alive with
//! heartbeats, and forward decoded rows to the subscriber. There is no replay; rows
//! inserted while the socket is down are only visible through a fresh read.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::{Value, json};
use snafu::ResultExt;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as SocketMessage;

use super::error::{InvalidRemoteUrlSnafu, StorageResult, WebSocketConnectSnafu, WebSocketSendSnafu};
use super::feed::{FeedSubscription, feed_channel};
use super::rest::RemoteTableConfig;
use super::types::{InsertEvent, MessageRow};
use super::{BoxFuture, MessageFeed};

/// Heartbeat cadence; the server drops sockets silent for more than 60 seconds.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
pub const REALTIME_PROTOCOL_VERSION: &str = "1.0.0";

const JOIN_REF: &str = "1";

#[derive(Debug, Clone)]
pub struct RealtimeFeed {
    config: RemoteTableConfig,
}

impl RealtimeFeed {
    pub fn new(config: RemoteTableConfig) -> Self {
        Self { config }
    }

    pub fn topic(&self) -> String {
        format!("realtime:{}:{}", self.config.schema, self.config.table)
    }

    pub fn socket_url(&self) -> StorageResult<Url> {
        let base = &self.config.url;
        let socket_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.clone()
        };

        let mut url = Url::parse(&format!("{socket_base}/realtime/v1/websocket")).map_err(
            |source| {
                InvalidRemoteUrlSnafu {
                    stage: "realtime-socket-url",
                    url: base.clone(),
                    details: source.to_string(),
                }
                .build()
            },
        )?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.config.api_key)
            .append_pair("vsn", REALTIME_PROTOCOL_VERSION);
        Ok(url)
    }

    fn join_frame(&self) -> Value {
        json!({
            "topic": self.topic(),
            "event": "phx_join",
            "payload": {
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [{
                        "event": "INSERT",
                        "schema": self.config.schema,
                        "table": self.config.table,
                    }],
                },
                "access_token": self.config.api_key,
            },
            "ref": JOIN_REF,
            "join_ref": JOIN_REF,
        })
    }

    async fn open_subscription(&self) -> StorageResult<FeedSubscription> {
        let url = self.socket_url()?;
        let (socket, _) = connect_async(url.as_str())
            .await
            .context(WebSocketConnectSnafu {
                stage: "realtime-connect",
                url: redact_api_key(&url),
            })?;
        let (mut sink, mut stream) = socket.split();

        sink.send(SocketMessage::Text(self.join_frame().to_string().into()))
            .await
            .context(WebSocketSendSnafu {
                stage: "realtime-join",
            })?;

        let topic = self.topic();
        let (event_tx, subscription, mut cancel_rx) = feed_channel();
        tracing::info!(topic = %topic, "realtime subscription opened");

        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the join frame already proved liveness.
            heartbeat.tick().await;
            let mut next_ref: u64 = 2;

            loop {
                tokio::select! {
                    _ = &mut cancel_rx => {
                        let leave = control_frame(&topic, "phx_leave", next_ref);
                        let _ = sink.send(SocketMessage::Text(leave.to_string().into())).await;
                        let _ = sink.close().await;
                        tracing::info!(topic = %topic, "realtime subscription released");
                        break;
                    }
                    _ = heartbeat.tick() => {
                        let frame = control_frame("phoenix", "heartbeat", next_ref);
                        next_ref += 1;
                        if let Err(error) = sink.send(SocketMessage::Text(frame.to_string().into())).await {
                            tracing::warn!(topic = %topic, "realtime heartbeat failed: {error}");
                            break;
                        }
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(SocketMessage::Text(text))) => match decode_frame(text.as_str(), &topic) {
                            FrameAction::Insert(event) => {
                                if event_tx.send(event).is_err() {
                                    break;
                                }
                            }
                            FrameAction::JoinRejected(reason) => {
                                tracing::warn!(topic = %topic, "realtime join rejected: {reason}");
                                break;
                            }
                            FrameAction::Ignore => {}
                        },
                        Some(Ok(SocketMessage::Close(_))) | None => {
                            tracing::warn!(topic = %topic, "realtime socket closed by server");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            tracing::warn!(topic = %topic, "realtime socket failed: {error}");
                            break;
                        }
                    },
                }
            }
        });

        Ok(subscription)
    }
}

impl MessageFeed for RealtimeFeed {
    fn subscribe(&self) -> BoxFuture<'_, StorageResult<FeedSubscription>> {
        Box::pin(self.open_subscription())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FrameAction {
    Insert(InsertEvent),
    JoinRejected(String),
    Ignore,
}

fn control_frame(topic: &str, event: &str, reference: u64) -> Value {
    json!({
        "topic": topic,
        "event": event,
        "payload": {},
        "ref": reference.to_string(),
        "join_ref": JOIN_REF,
    })
}

fn decode_frame(text: &str, topic: &str) -> FrameAction {
    let frame: Value = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(error) => {
            tracing::debug!("skipping undecodable realtime frame: {error}");
            return FrameAction::Ignore;
        }
    };

    if frame.get("topic").and_then(Value::as_str) != Some(topic) {
        return FrameAction::Ignore;
    }

    let payload = frame.get("payload").unwrap_or(&Value::Null);
    match frame.get("event").and_then(Value::as_str) {
        Some("phx_reply") if frame.get("ref").and_then(Value::as_str) == Some(JOIN_REF) => {
            match payload.get("status").and_then(Value::as_str) {
                Some("ok") => FrameAction::Ignore,
                _ => FrameAction::JoinRejected(
                    payload
                        .get("response")
                        .map(Value::to_string)
                        .unwrap_or_else(|| "no response".to_string()),
                ),
            }
        }
        Some("postgres_changes") => decode_insert(payload.get("data").unwrap_or(&Value::Null)),
        // Pre-v2 servers push the change itself as the event.
        Some("INSERT") => decode_insert(payload),
        _ => FrameAction::Ignore,
    }
}

fn decode_insert(change: &Value) -> FrameAction {
    if let Some(kind) = change.get("type").and_then(Value::as_str)
        && kind != "INSERT"
    {
        return FrameAction::Ignore;
    }

    let Some(record) = change.get("record") else {
        return FrameAction::Ignore;
    };

    match serde_json::from_value::<MessageRow>(record.clone()) {
        Ok(row) => FrameAction::Insert(InsertEvent { row }),
        Err(error) => {
            tracing::debug!("skipping malformed realtime record: {error}");
            FrameAction::Ignore
        }
    }
}

fn redact_api_key(url: &Url) -> String {
    let mut redacted = url.clone();
    redacted.set_query(Some(&format!("vsn={REALTIME_PROTOCOL_VERSION}")));
    redacted.to_string()
}
