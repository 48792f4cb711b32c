//! Change events, auth state events, and the event bus that fans them out.
//!
//! A [`ChangeEvent`] is the client-side shape of one row-level notification
//! from the push channel: which table, what happened, and the row before and
//! after. Backends publish them on an [`EventBus`]; stores subscribe per
//! table and merge the rows into their local lists.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::AuthSession;

// ============================================================================
// Change events
// ============================================================================

/// Kind of row-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

impl std::str::FromStr for ChangeKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(format!("Invalid change kind: {}", s)),
        }
    }
}

/// One row-level notification for a watched table.
///
/// `new` is present for inserts and updates, `old` for updates and deletes.
/// Without full replica identity the `old` row only carries the primary key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    pub fn insert(table: impl Into<String>, new: JsonValue) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Insert,
            new: Some(new),
            old: None,
            commit_timestamp: Some(Utc::now()),
        }
    }

    pub fn update(table: impl Into<String>, new: JsonValue, old: JsonValue) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Update,
            new: Some(new),
            old: Some(old),
            commit_timestamp: Some(Utc::now()),
        }
    }

    pub fn delete(table: impl Into<String>, old: JsonValue) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Delete,
            new: None,
            old: Some(old),
            commit_timestamp: Some(Utc::now()),
        }
    }

    /// Decode the `new` row into a record type.
    pub fn new_record<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        decode_row(self.new.as_ref())
    }

    /// Primary key of the `new` row.
    pub fn new_id(&self) -> Option<Uuid> {
        row_id(self.new.as_ref())
    }

    /// Primary key of the `old` row.
    pub fn old_id(&self) -> Option<Uuid> {
        row_id(self.old.as_ref())
    }
}

fn decode_row<T: DeserializeOwned>(row: Option<&JsonValue>) -> Result<Option<T>> {
    match row {
        Some(value) if !is_empty_row(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| Error::Serialization(format!("change payload: {}", e))),
        _ => Ok(None),
    }
}

fn is_empty_row(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn row_id(row: Option<&JsonValue>) -> Option<Uuid> {
    row?.get("id")?.as_str()?.parse().ok()
}

// ============================================================================
// Auth events
// ============================================================================

/// Auth state transitions reported by the auth provider.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    SignedOut,
    TokenRefreshed(AuthSession),
    UserUpdated(AuthSession),
}

impl AuthEvent {
    /// The session in effect after this event.
    pub fn session(&self) -> Option<&AuthSession> {
        match self {
            AuthEvent::SignedIn(s) | AuthEvent::TokenRefreshed(s) | AuthEvent::UserUpdated(s) => {
                Some(s)
            }
            AuthEvent::SignedOut => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn(_) => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::TokenRefreshed(_) => "TOKEN_REFRESHED",
            AuthEvent::UserUpdated(_) => "USER_UPDATED",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast-based bus with one channel per table.
///
/// Uses `tokio::sync::broadcast` with a fixed buffer per channel. Receivers
/// that fall behind get a `Lagged` error and miss events; stores treat a lag
/// as a cue to refetch.
pub struct EventBus {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
}

impl EventBus {
    /// Create a new event bus with the given per-table buffer capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn sender(&self, table: &str) -> broadcast::Sender<ChangeEvent> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish an event to every subscriber of its table.
    ///
    /// Returns the number of receivers the event reached. Events for tables
    /// nobody watches are dropped.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let tx = self.sender(&event.table);
        tracing::debug!(
            table = %event.table,
            event_kind = %event.kind,
            subscriber_count = tx.receiver_count(),
            "EventBus publish"
        );
        tx.send(event).unwrap_or(0)
    }

    /// Subscribe to changes on one table.
    pub fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        self.sender(table).subscribe()
    }

    /// Number of active subscribers for a table.
    pub fn subscriber_count(&self, table: &str) -> usize {
        let channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels
            .get(table)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_event_bus_routes_by_table() {
        let bus = EventBus::new(8);
        let mut docs = bus.subscribe("documents");
        let mut users = bus.subscribe("users");

        let reached = bus.publish(ChangeEvent::insert("documents", json!({"id": "x"})));
        assert_eq!(reached, 1);

        let event = docs.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert!(users.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers_ok() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(ChangeEvent::delete("sessions", json!({}))), 0);
    }

    #[test]
    fn test_event_bus_subscriber_count() {
        let bus = EventBus::new(8);
        assert_eq!(bus.subscriber_count("users"), 0);

        let rx1 = bus.subscribe("users");
        let _rx2 = bus.subscribe("users");
        assert_eq!(bus.subscriber_count("users"), 2);
        assert_eq!(bus.subscriber_count("documents"), 0);

        drop(rx1);
        assert_eq!(bus.subscriber_count("users"), 1);
    }

    #[tokio::test]
    async fn test_event_bus_lagged_receiver() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe("documents");

        for _ in 0..5 {
            bus.publish(ChangeEvent::insert("documents", json!({})));
        }

        let result = rx.recv().await;
        assert!(matches!(result, Err(broadcast::error::RecvError::Lagged(_))));
    }

    #[test]
    fn test_change_event_ids() {
        let id = Uuid::new_v4();
        let event = ChangeEvent::update(
            "users",
            json!({"id": id.to_string(), "bio": "hello"}),
            json!({"id": id.to_string()}),
        );
        assert_eq!(event.new_id(), Some(id));
        assert_eq!(event.old_id(), Some(id));

        let no_id = ChangeEvent::delete("users", json!({}));
        assert_eq!(no_id.old_id(), None);
    }

    #[test]
    fn test_change_event_empty_new_row_decodes_to_none() {
        #[derive(Deserialize)]
        struct Row {
            #[allow(dead_code)]
            id: String,
        }
        let event = ChangeEvent::insert("users", json!({"id": "a"}));
        assert!(event.new_record::<Row>().unwrap().is_some());
        let emptied = ChangeEvent::insert("users", json!({}));
        assert!(emptied.new_record::<Row>().unwrap().is_none());

        let bad = ChangeEvent::insert("users", json!({"nope": 1}));
        assert!(matches!(
            bad.new_record::<Row>(),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_change_kind_parse() {
        assert_eq!("insert".parse::<ChangeKind>().unwrap(), ChangeKind::Insert);
        assert_eq!(ChangeKind::Delete.to_string(), "DELETE");
        assert!("TRUNCATE".parse::<ChangeKind>().is_err());
    }

    #[test]
    fn test_auth_event_session() {
        assert!(AuthEvent::SignedOut.session().is_none());
        assert_eq!(AuthEvent::SignedOut.name(), "SIGNED_OUT");
    }
}
