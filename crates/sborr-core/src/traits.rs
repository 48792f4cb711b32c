//! Backend contracts.
//!
//! The stores only talk to the backend through these traits: a row-oriented
//! data API, blob storage, an auth provider and a change feed. Concrete
//! implementations live in `sborr-client`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::{AuthEvent, ChangeEvent};
use crate::models::{AuthSession, AuthUser};

// =============================================================================
// QUERIES
// =============================================================================

/// Sort order for a select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A select against one table: columns, equality filters, order, limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Columns to return; `None` selects every column.
    pub columns: Option<Vec<String>>,
    /// Equality filters, all of which must match.
    pub filters: Vec<(String, String)>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    /// Select every column of every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push((column.to_string(), value.to_string()));
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    /// Newest rows first, the order every list in the client uses.
    pub fn newest_first(self) -> Self {
        self.order_by("created_at", false)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Comma-separated column list (`*` when unset).
    pub fn select_clause(&self) -> String {
        match &self.columns {
            Some(columns) if !columns.is_empty() => columns.join(","),
            _ => "*".to_string(),
        }
    }
}

/// Decode raw rows into records.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<JsonValue>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(Error::from))
        .collect()
}

// =============================================================================
// DATA
// =============================================================================

/// Row-oriented access to the relational store.
#[async_trait]
pub trait DataBackend: Send + Sync {
    /// Select rows from a table.
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<JsonValue>>;

    /// Insert a row and return it as stored.
    async fn insert(&self, table: &str, row: JsonValue) -> Result<JsonValue>;

    /// Update the row with the given id and return it as stored.
    ///
    /// Fails with `NotFound` when no row has that id.
    async fn update(&self, table: &str, id: Uuid, changes: JsonValue) -> Result<JsonValue>;

    /// Delete the row with the given id. Deleting a missing row is not an error.
    async fn delete(&self, table: &str, id: Uuid) -> Result<()>;

    /// Select exactly one row.
    async fn select_one(&self, table: &str, query: &Query) -> Result<JsonValue> {
        let query = query.clone().limit(1);
        self.select(table, &query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("no matching row in {}", table)))
    }
}

// =============================================================================
// STORAGE
// =============================================================================

/// Blob storage organized in buckets.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload bytes to `bucket/path`. Without `upsert` an existing object is an error.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        content_type: &str,
        upsert: bool,
    ) -> Result<()>;

    /// Remove objects. Missing objects are skipped.
    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()>;

    /// Public URL for an object. Does not check that the object exists.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

// =============================================================================
// AUTH
// =============================================================================

/// Email/password auth provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The session currently held by the provider, if any.
    async fn current_session(&self) -> Result<Option<AuthSession>>;

    /// Sign in and return the new session.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// End the current session.
    async fn sign_out(&self) -> Result<()>;

    /// The user behind the current session, validated by the provider.
    async fn current_user(&self) -> Result<AuthUser>;

    /// Change the signed-in user's password.
    async fn update_password(&self, new_password: &str) -> Result<AuthUser>;

    /// Auth state transitions from now on.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

// =============================================================================
// CHANGE FEED
// =============================================================================

/// Row-level push notifications.
pub trait ChangeFeed: Send + Sync {
    /// Start watching a table and receive its changes.
    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent>;
}

// =============================================================================
// BACKEND BUNDLE
// =============================================================================

/// The four backend services the stores share.
#[derive(Clone)]
pub struct Backend {
    pub data: Arc<dyn DataBackend>,
    pub storage: Arc<dyn ObjectStorage>,
    pub auth: Arc<dyn AuthProvider>,
    pub changes: Arc<dyn ChangeFeed>,
}

impl Backend {
    pub fn new(
        data: Arc<dyn DataBackend>,
        storage: Arc<dyn ObjectStorage>,
        auth: Arc<dyn AuthProvider>,
        changes: Arc<dyn ChangeFeed>,
    ) -> Self {
        Self {
            data,
            storage,
            auth,
            changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let query = Query::all()
            .columns(&["id", "title", "file_url"])
            .eq("id", "42")
            .newest_first()
            .limit(1);
        assert_eq!(query.select_clause(), "id,title,file_url");
        assert_eq!(query.filters, vec![("id".to_string(), "42".to_string())]);
        assert_eq!(
            query.order,
            Some(Order {
                column: "created_at".to_string(),
                ascending: false
            })
        );
        assert_eq!(query.limit, Some(1));
    }

    #[test]
    fn test_select_clause_defaults_to_star() {
        assert_eq!(Query::all().select_clause(), "*");
        assert_eq!(Query::all().columns(&[]).select_clause(), "*");
    }

    #[test]
    fn test_decode_rows_reports_bad_row() {
        let rows = vec![serde_json::json!(1), serde_json::json!("two")];
        let decoded: Result<Vec<i64>> = decode_rows(rows);
        assert!(matches!(decoded, Err(Error::Serialization(_))));
    }
}
