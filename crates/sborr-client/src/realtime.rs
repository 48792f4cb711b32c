//! Realtime change feed over the Phoenix channel websocket.
//!
//! One background task owns the socket. It joins a `realtime:{schema}:{table}`
//! channel per watched table, keeps the connection alive with heartbeats, and
//! republishes every `postgres_changes` frame on the shared [`EventBus`].
//! When the session changes, joined channels are sent the new access token.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value as JsonValue};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use sborr_core::defaults::DB_SCHEMA;
use sborr_core::{AuthEvent, ChangeEvent, ChangeFeed, ChangeKind, Error, EventBus, Result};

use crate::config::ClientConfig;
use crate::http::HttpCore;

enum Command {
    Join(String),
    Shutdown,
}

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A row change on a joined table.
    Change(ChangeEvent),
    /// Reply to a join or heartbeat.
    Reply {
        topic: String,
        status: String,
        reference: Option<String>,
    },
    /// The server failed or closed a channel.
    ChannelError { topic: String, event: String },
    /// Presence, system and other frames the client ignores.
    Other { topic: String, event: String },
}

/// Channel topic for a table.
pub fn topic_for(table: &str) -> String {
    format!("realtime:{}:{}", DB_SCHEMA, table)
}

/// The `phx_join` frame subscribing to every change on a table.
pub fn join_frame(table: &str, access_token: &str, reference: u64) -> JsonValue {
    json!({
        "topic": topic_for(table),
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "*", "schema": DB_SCHEMA, "table": table }
                ]
            },
            "access_token": access_token
        },
        "ref": reference.to_string()
    })
}

/// Hand a joined channel a newer access token.
pub fn access_token_frame(table: &str, access_token: &str, reference: u64) -> JsonValue {
    json!({
        "topic": topic_for(table),
        "event": "access_token",
        "payload": { "access_token": access_token },
        "ref": reference.to_string()
    })
}

pub fn heartbeat_frame(reference: u64) -> JsonValue {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": reference.to_string()
    })
}

/// Decode one text frame from the server.
pub fn parse_frame(text: &str) -> Result<Frame> {
    let value: JsonValue = serde_json::from_str(text)?;
    let topic = value
        .get("topic")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let event = value
        .get("event")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Realtime("frame without event".to_string()))?
        .to_string();
    let payload = value.get("payload").cloned().unwrap_or(JsonValue::Null);

    match event.as_str() {
        "postgres_changes" => {
            let data = payload
                .get("data")
                .ok_or_else(|| Error::Realtime("postgres_changes without data".to_string()))?;
            Ok(Frame::Change(change_from_data(data)?))
        }
        "phx_reply" => Ok(Frame::Reply {
            topic,
            status: payload
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            reference: value.get("ref").and_then(ref_string),
        }),
        "phx_error" | "phx_close" => Ok(Frame::ChannelError { topic, event }),
        _ => Ok(Frame::Other { topic, event }),
    }
}

fn ref_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn change_from_data(data: &JsonValue) -> Result<ChangeEvent> {
    let table = data
        .get("table")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Realtime("change without table".to_string()))?;
    let kind: ChangeKind = data
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Realtime("change without type".to_string()))?
        .parse()
        .map_err(Error::Realtime)?;
    let commit_timestamp = data
        .get("commit_timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));
    let row = |key: &str| data.get(key).filter(|v| !v.is_null()).cloned();

    let (new, old) = match kind {
        ChangeKind::Insert => (row("record"), None),
        ChangeKind::Update => (row("record"), row("old_record")),
        ChangeKind::Delete => (None, row("old_record")),
    };
    Ok(ChangeEvent {
        table: table.to_string(),
        kind,
        new,
        old,
        commit_timestamp,
    })
}

/// Push channel client.
///
/// Must be started inside a tokio runtime. Dropping the feed closes the socket.
pub struct RealtimeFeed {
    bus: Arc<EventBus>,
    commands: mpsc::UnboundedSender<Command>,
    joined: Mutex<HashSet<String>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeFeed {
    pub fn start(config: ClientConfig, http: HttpCore) -> Self {
        let bus = Arc::new(EventBus::new(config.event_capacity));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let auth_events = http.tokens().subscribe();
        let handle = tokio::spawn(run_socket(
            config,
            http,
            bus.clone(),
            command_rx,
            auth_events,
        ));
        Self {
            bus,
            commands,
            joined: Mutex::new(HashSet::new()),
            handle: Mutex::new(Some(handle)),
        }
    }

    /// The bus frames are republished on.
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Close the socket and wait for the task to finish.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl ChangeFeed for RealtimeFeed {
    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        let rx = self.bus.subscribe(table);
        let first = self
            .joined
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(table.to_string());
        if first && self.commands.send(Command::Join(table.to_string())).is_err() {
            warn!(table, "realtime task is gone, changes will not arrive");
        }
        rx
    }
}

impl Drop for RealtimeFeed {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

async fn run_socket(
    config: ClientConfig,
    http: HttpCore,
    bus: Arc<EventBus>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut auth_events: broadcast::Receiver<AuthEvent>,
) {
    let url = config.realtime_url();
    let (socket, _) = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok(connected) => connected,
        Err(e) => {
            error!(error = %e, "realtime: connection failed");
            return;
        }
    };
    info!("realtime: connected");
    let (mut sink, mut stream) = socket.split();

    let period = Duration::from_secs(config.realtime_heartbeat_secs.max(1));
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let mut reference: u64 = 0;
    let mut joined: Vec<String> = Vec::new();
    let mut auth_open = true;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Join(table)) => {
                    reference += 1;
                    let token = current_token(&http).await;
                    let frame = join_frame(&table, &token, reference);
                    debug!(table = %table, "realtime: joining channel");
                    if sink.send(Message::Text(frame.to_string())).await.is_err() {
                        break;
                    }
                    joined.push(table);
                }
                Some(Command::Shutdown) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            event = auth_events.recv(), if auth_open => {
                let token = match event {
                    Ok(AuthEvent::SignedIn(session)) | Ok(AuthEvent::TokenRefreshed(session)) => {
                        session.access_token
                    }
                    Ok(AuthEvent::SignedOut) => config.anon_key.clone(),
                    Ok(AuthEvent::UserUpdated(_)) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => current_token(&http).await,
                    Err(broadcast::error::RecvError::Closed) => {
                        auth_open = false;
                        continue;
                    }
                };
                let mut failed = false;
                for table in &joined {
                    reference += 1;
                    let frame = access_token_frame(table, &token, reference);
                    if sink.send(Message::Text(frame.to_string())).await.is_err() {
                        failed = true;
                        break;
                    }
                }
                if failed {
                    break;
                }
                debug!(channels = joined.len(), "realtime: access token updated");
            }
            _ = heartbeat.tick() => {
                // Refreshes a token close to expiry; the refresh comes back
                // as an auth event.
                if let Err(e) = http.session().await {
                    warn!(error = %e, "realtime: session check failed");
                }
                reference += 1;
                if sink.send(Message::Text(heartbeat_frame(reference).to_string())).await.is_err() {
                    break;
                }
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => handle_text(&bus, &text),
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("realtime: server closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "realtime: socket error");
                    break;
                }
            },
        }
    }
    info!("realtime: disconnected");
}

/// The signed-in user's token, refreshed when needed, or the anon key.
async fn current_token(http: &HttpCore) -> String {
    match http.session().await {
        Ok(Some(session)) => session.access_token,
        Ok(None) => http.config().anon_key.clone(),
        Err(e) => {
            warn!(error = %e, "realtime: session check failed");
            http.config().anon_key.clone()
        }
    }
}

fn handle_text(bus: &EventBus, text: &str) {
    match parse_frame(text) {
        Ok(Frame::Change(event)) => {
            bus.publish(event);
        }
        Ok(Frame::Reply { topic, status, .. }) if status != "ok" => {
            warn!(topic = %topic, status = %status, "realtime: request rejected");
        }
        Ok(Frame::ChannelError { topic, event }) => {
            warn!(topic = %topic, event = %event, "realtime: channel closed by server");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "realtime: skipping malformed frame"),
    }
}
