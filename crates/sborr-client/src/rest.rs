//! PostgREST-compatible data backend.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use uuid::Uuid;

use sborr_core::{DataBackend, Error, Query, Result};

use crate::http::{error_message, HttpCore};

/// Data API client: one table per path under `/rest/v1`.
pub struct RestDataBackend {
    http: HttpCore,
}

impl RestDataBackend {
    pub fn new(http: HttpCore) -> Self {
        Self { http }
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/{}",
            self.http.config().rest_url(),
            urlencoding::encode(table)
        )
    }

    async fn rows(&self, op: &str, table: &str, response: reqwest::Response) -> Result<Vec<JsonValue>> {
        if !response.status().is_success() {
            let message = error_message(response).await;
            warn!(op, table, error = %message, "data API rejected request");
            return Err(Error::Backend(message));
        }
        let body: JsonValue = response.json().await?;
        match body {
            JsonValue::Array(rows) => Ok(rows),
            JsonValue::Null => Ok(Vec::new()),
            row @ JsonValue::Object(_) => Ok(vec![row]),
            other => Err(Error::Serialization(format!(
                "expected rows from {}, got {}",
                table, other
            ))),
        }
    }
}

/// Query-string pairs for a select.
pub fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), query.select_clause())];
    for (column, value) in &query.filters {
        params.push((column.clone(), format!("eq.{}", value)));
    }
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

#[async_trait]
impl DataBackend for RestDataBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<JsonValue>> {
        let response = self
            .http
            .authorized(Method::GET, &self.table_url(table))
            .await?
            .query(&query_params(query))
            .send()
            .await?;
        let rows = self.rows("select", table, response).await?;
        debug!(table, result_count = rows.len(), "select");
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: JsonValue) -> Result<JsonValue> {
        let response = self
            .http
            .authorized(Method::POST, &self.table_url(table))
            .await?
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        self.rows("insert", table, response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Backend(format!("insert into {} returned no row", table)))
    }

    async fn update(&self, table: &str, id: Uuid, changes: JsonValue) -> Result<JsonValue> {
        let response = self
            .http
            .authorized(Method::PATCH, &self.table_url(table))
            .await?
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&changes)
            .send()
            .await?;
        self.rows("update", table, response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("{} row {}", table, id)))
    }

    async fn delete(&self, table: &str, id: Uuid) -> Result<()> {
        let response = self
            .http
            .authorized(Method::DELETE, &self.table_url(table))
            .await?
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await?;
        if !response.status().is_success() {
            let message = error_message(response).await;
            warn!(op = "delete", table, error = %message, "data API rejected request");
            return Err(Error::Backend(message));
        }
        debug!(table, record_id = %id, "delete");
        Ok(())
    }
}
