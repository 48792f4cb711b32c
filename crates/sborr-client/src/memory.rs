//! In-memory backend for tests and offline runs.
//!
//! Implements every backend contract against process-local maps and emits the
//! same change events the realtime service would: inserts and updates carry
//! the full row, deletes carry only the primary key.
//!
//! ## Usage
//!
//! ```rust
//! use sborr_client::MemoryBackend;
//!
//! let memory = MemoryBackend::new()
//!     .with_account("clerk@city.gov", "password123", uuid::Uuid::new_v4());
//! memory.seed("documents", vec![serde_json::json!({"id": uuid::Uuid::new_v4(), "title": "Ordinance 1"})]);
//! let backend = memory.backend();
//! ```

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value as JsonValue};
use tokio::sync::broadcast;
use uuid::Uuid;

use sborr_core::defaults::{AUTH_EVENT_CAPACITY, EVENT_BUS_CAPACITY};
use sborr_core::{
    AuthEvent, AuthProvider, AuthSession, AuthUser, Backend, ChangeEvent, ChangeFeed, DataBackend,
    Error, EventBus, ObjectStorage, Query, Result,
};

const DEFAULT_BASE_URL: &str = "http://localhost:54321";

/// A stored blob.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user: AuthUser,
}

struct Inner {
    base_url: String,
    tables: Mutex<HashMap<String, Vec<JsonValue>>>,
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    accounts: Mutex<HashMap<String, Account>>,
    session: Mutex<Option<AuthSession>>,
    bus: EventBus,
    auth_events: broadcast::Sender<AuthEvent>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashSet<String>>,
    push: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Process-local backend.
///
/// Clones share state, so a test can keep a handle to inspect rows and
/// objects after handing [`MemoryBackend::backend`] to the stores.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Use a different base for public object URLs.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let (auth_events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                tables: Mutex::new(HashMap::new()),
                objects: Mutex::new(HashMap::new()),
                accounts: Mutex::new(HashMap::new()),
                session: Mutex::new(None),
                bus: EventBus::new(EVENT_BUS_CAPACITY),
                auth_events,
                calls: Mutex::new(Vec::new()),
                failures: Mutex::new(HashSet::new()),
                push: AtomicBool::new(true),
            }),
        }
    }

    /// Register an account that can sign in.
    pub fn with_account(self, email: &str, password: &str, user_id: Uuid) -> Self {
        lock(&self.inner.accounts).insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: AuthUser {
                    id: user_id,
                    email: Some(email.to_string()),
                },
            },
        );
        self
    }

    /// Turn change events on mutations off, as if the push channel were down.
    pub fn without_push(self) -> Self {
        self.inner.push.store(false, AtomicOrdering::SeqCst);
        self
    }

    /// Start with a persisted session for a registered account, without an auth event.
    pub fn restore_session(&self, email: &str) -> Result<AuthSession> {
        let account = lock(&self.inner.accounts)
            .get(email)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("account {}", email)))?;
        let session = issue_session(account.user);
        *lock(&self.inner.session) = Some(session.clone());
        Ok(session)
    }

    /// Replace a table's rows without emitting events.
    pub fn seed(&self, table: &str, rows: Vec<JsonValue>) {
        lock(&self.inner.tables).insert(table.to_string(), rows);
    }

    /// Current rows of a table.
    pub fn rows(&self, table: &str) -> Vec<JsonValue> {
        lock(&self.inner.tables)
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        lock(&self.inner.objects)
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        lock(&self.inner.objects)
            .keys()
            .filter(|(b, _)| b == bucket)
            .count()
    }

    /// Make the next call matching `key` fail.
    ///
    /// Keys are `"{operation}:{table or bucket}"` (`"select:documents"`,
    /// `"upload:avatars"`) or a bare auth operation (`"sign_in"`, `"sign_out"`,
    /// `"update_password"`).
    pub fn fail_next(&self, key: &str) {
        lock(&self.inner.failures).insert(key.to_string());
    }

    /// Every call made so far, as `"{operation}:{target}"`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.inner.calls).clone()
    }

    pub fn call_count(&self, key: &str) -> usize {
        lock(&self.inner.calls).iter().filter(|c| *c == key).count()
    }

    /// Emit a change event as if another client had written the row.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.inner.bus.publish(event)
    }

    pub fn subscriber_count(&self, table: &str) -> usize {
        self.inner.bus.subscriber_count(table)
    }

    /// Bundle this backend for the stores.
    pub fn backend(&self) -> Backend {
        let shared = Arc::new(self.clone());
        Backend::new(shared.clone(), shared.clone(), shared.clone(), shared)
    }

    fn record(&self, key: String) -> Result<()> {
        let injected = lock(&self.inner.failures).remove(&key);
        lock(&self.inner.calls).push(key.clone());
        if !injected {
            return Ok(());
        }
        let message = format!("injected failure: {}", key);
        Err(match key.split(':').next().unwrap_or_default() {
            "upload" | "remove" => Error::Storage(message),
            "sign_in" | "sign_out" | "update_password" | "current_user" => Error::Auth(message),
            _ => Error::Backend(message),
        })
    }

    fn emit(&self, event: ChangeEvent) {
        if self.inner.push.load(AtomicOrdering::SeqCst) {
            self.inner.bus.publish(event);
        }
    }

    fn emit_auth(&self, event: AuthEvent) {
        let _ = self.inner.auth_events.send(event);
    }
}

fn issue_session(user: AuthUser) -> AuthSession {
    AuthSession {
        access_token: format!("memory-{}", Uuid::new_v4()),
        token_type: "bearer".to_string(),
        expires_in: 3600,
        expires_at: Some(Utc::now().timestamp() + 3600),
        refresh_token: Some(Uuid::new_v4().to_string()),
        user,
    }
}

/// Text form of a column value for equality filters.
fn filter_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_values(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (None, Some(_)) | (Some(JsonValue::Null), Some(_)) => Ordering::Less,
        (Some(_), None) | (Some(_), Some(JsonValue::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn project(row: &JsonValue, columns: &Option<Vec<String>>) -> JsonValue {
    match (columns, row) {
        (Some(columns), JsonValue::Object(map)) if !columns.is_empty() => {
            let projected: Map<String, JsonValue> = map
                .iter()
                .filter(|(key, _)| columns.iter().any(|c| c == *key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            JsonValue::Object(projected)
        }
        _ => row.clone(),
    }
}

fn has_id(row: &JsonValue, id: Uuid) -> bool {
    row.get("id")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<Uuid>().ok())
        == Some(id)
}

#[async_trait]
impl DataBackend for MemoryBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<JsonValue>> {
        self.record(format!("select:{}", table))?;
        let mut rows: Vec<JsonValue> = self
            .rows(table)
            .into_iter()
            .filter(|row| {
                query.filters.iter().all(|(column, value)| {
                    row.get(column).map(filter_text).as_deref() == Some(value.as_str())
                })
            })
            .collect();
        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows.iter().map(|row| project(row, &query.columns)).collect())
    }

    async fn insert(&self, table: &str, row: JsonValue) -> Result<JsonValue> {
        self.record(format!("insert:{}", table))?;
        let JsonValue::Object(mut map) = row else {
            return Err(Error::InvalidInput(format!("row for {} is not an object", table)));
        };
        map.entry("id")
            .or_insert_with(|| json!(Uuid::new_v4().to_string()));
        map.entry("created_at")
            .or_insert_with(|| json!(Utc::now().to_rfc3339()));
        let row = JsonValue::Object(map);
        lock(&self.inner.tables)
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        self.emit(ChangeEvent::insert(table, row.clone()));
        Ok(row)
    }

    async fn update(&self, table: &str, id: Uuid, changes: JsonValue) -> Result<JsonValue> {
        self.record(format!("update:{}", table))?;
        let JsonValue::Object(changes) = changes else {
            return Err(Error::InvalidInput(format!("changes for {} are not an object", table)));
        };
        let (old, new) = {
            let mut tables = lock(&self.inner.tables);
            let row = tables
                .get_mut(table)
                .and_then(|rows| rows.iter_mut().find(|row| has_id(row, id)))
                .ok_or_else(|| Error::NotFound(format!("{} row {}", table, id)))?;
            let old = row.clone();
            if let JsonValue::Object(map) = row {
                for (key, value) in changes {
                    map.insert(key, value);
                }
            }
            (old, row.clone())
        };
        self.emit(ChangeEvent::update(table, new.clone(), old));
        Ok(new)
    }

    async fn delete(&self, table: &str, id: Uuid) -> Result<()> {
        self.record(format!("delete:{}", table))?;
        let removed = {
            let mut tables = lock(&self.inner.tables);
            match tables.get_mut(table) {
                Some(rows) => {
                    let before = rows.len();
                    rows.retain(|row| !has_id(row, id));
                    rows.len() != before
                }
                None => false,
            }
        };
        if removed {
            self.emit(ChangeEvent::delete(table, json!({ "id": id.to_string() })));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        content_type: &str,
        upsert: bool,
    ) -> Result<()> {
        self.record(format!("upload:{}", bucket))?;
        let mut objects = lock(&self.inner.objects);
        let key = (bucket.to_string(), path.to_string());
        if !upsert && objects.contains_key(&key) {
            return Err(Error::Storage("The resource already exists".to_string()));
        }
        objects.insert(
            key,
            StoredObject {
                data: data.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        self.record(format!("remove:{}", bucket))?;
        let mut objects = lock(&self.inner.objects);
        for path in paths {
            objects.remove(&(bucket.to_string(), path.clone()));
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.inner.base_url, bucket, path
        )
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn current_session(&self) -> Result<Option<AuthSession>> {
        self.record("current_session".to_string())?;
        Ok(lock(&self.inner.session).clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.record("sign_in".to_string())?;
        let account = lock(&self.inner.accounts)
            .get(email)
            .filter(|account| account.password == password)
            .cloned()
            .ok_or_else(|| Error::Auth("Invalid login credentials".to_string()))?;
        let session = issue_session(account.user);
        *lock(&self.inner.session) = Some(session.clone());
        self.emit_auth(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        self.record("sign_out".to_string())?;
        let had_session = lock(&self.inner.session).take().is_some();
        if had_session {
            self.emit_auth(AuthEvent::SignedOut);
        }
        Ok(())
    }

    async fn current_user(&self) -> Result<AuthUser> {
        self.record("current_user".to_string())?;
        lock(&self.inner.session)
            .as_ref()
            .map(|session| session.user.clone())
            .ok_or_else(|| Error::Unauthorized("no active session".to_string()))
    }

    async fn update_password(&self, new_password: &str) -> Result<AuthUser> {
        self.record("update_password".to_string())?;
        let session = lock(&self.inner.session)
            .clone()
            .ok_or_else(|| Error::Unauthorized("no active session".to_string()))?;
        {
            let mut accounts = lock(&self.inner.accounts);
            let account = accounts
                .values_mut()
                .find(|account| account.user.id == session.user.id)
                .ok_or_else(|| Error::Auth("User not found".to_string()))?;
            if account.password == new_password {
                return Err(Error::Auth(
                    "New password should be different from the old password.".to_string(),
                ));
            }
            account.password = new_password.to_string();
        }
        self.emit_auth(AuthEvent::UserUpdated(session.clone()));
        Ok(session.user)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.auth_events.subscribe()
    }
}

impl ChangeFeed for MemoryBackend {
    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        lock(&self.inner.calls).push(format!("subscribe:{}", table));
        self.inner.bus.subscribe(table)
    }
}
