//! Shared HTTP plumbing for the data, storage and auth APIs.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{json, Value as JsonValue};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use sborr_core::defaults::{AUTH_EVENT_CAPACITY, TOKEN_REFRESH_MARGIN_SECS};
use sborr_core::{AuthEvent, AuthSession, Error, Result};

use crate::config::ClientConfig;

/// The session shared by every backend of one client.
///
/// The auth backend writes it; data and storage read the access token from
/// it so their requests run as the signed-in user. Session changes are
/// announced on its auth event channel.
#[derive(Clone)]
pub struct TokenSlot {
    inner: Arc<RwLock<Option<AuthSession>>>,
    events: broadcast::Sender<AuthEvent>,
    refresh_lock: Arc<Mutex<()>>,
}

impl Default for TokenSlot {
    fn default() -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(None)),
            events,
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }
}

impl TokenSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<AuthSession> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set(&self, session: Option<AuthSession>) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    pub fn access_token(&self) -> Option<String> {
        self.get().map(|s| s.access_token)
    }

    /// Announce a session change to every subscriber.
    pub fn emit(&self, event: AuthEvent) {
        debug!(event = event.name(), "auth state change");
        // No listeners is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

/// Fill in `expires_at` from `expires_in` when the API omits it.
pub fn with_expiry(mut session: AuthSession) -> AuthSession {
    if session.expires_at.is_none() && session.expires_in > 0 {
        session.expires_at = Some(Utc::now().timestamp() + session.expires_in);
    }
    session
}

/// Whether a session should be refreshed before its token is sent.
pub fn needs_refresh(session: &AuthSession) -> bool {
    session.is_expired(Utc::now() + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS))
}

/// HTTP client plus the credentials every request carries.
#[derive(Clone)]
pub struct HttpCore {
    client: Client,
    config: ClientConfig,
    tokens: TokenSlot,
}

impl HttpCore {
    pub fn new(config: ClientConfig, tokens: TokenSlot) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenSlot {
        &self.tokens
    }

    /// The current session, refreshed first when its token is expired or
    /// about to expire.
    ///
    /// A session that cannot be refreshed is dropped and `SignedOut` is
    /// announced; the caller continues anonymously.
    pub async fn session(&self) -> Result<Option<AuthSession>> {
        match self.tokens.get() {
            Some(session) if !needs_refresh(&session) => return Ok(Some(session)),
            None => return Ok(None),
            Some(_) => {}
        }

        // One refresh at a time; later callers pick up its result.
        let _guard = self.tokens.refresh_lock.lock().await;
        let Some(session) = self.tokens.get() else {
            return Ok(None);
        };
        if !needs_refresh(&session) {
            return Ok(Some(session));
        }

        let refreshed = match session.refresh_token.as_deref() {
            Some(refresh_token) => self
                .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
                .await
                .map_err(|e| warn!(error = %e, "auth: refresh failed, dropping session"))
                .ok(),
            None => None,
        };
        match refreshed {
            Some(session) => {
                self.tokens.set(Some(session.clone()));
                info!(user_id = %session.user_id(), "auth: token refreshed");
                self.tokens.emit(AuthEvent::TokenRefreshed(session.clone()));
                Ok(Some(session))
            }
            None => {
                self.tokens.set(None);
                self.tokens.emit(AuthEvent::SignedOut);
                Ok(None)
            }
        }
    }

    /// Exchange a grant for a session at the auth API's token endpoint.
    pub async fn token_grant(&self, grant_type: &str, body: JsonValue) -> Result<AuthSession> {
        let url = format!("{}/token", self.config.auth_url());
        let response = self
            .request_with_token(Method::POST, &url, &self.config.anon_key)
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let message = error_message(response).await;
            warn!(grant_type, error = %message, "auth: token grant rejected");
            return Err(Error::Auth(message));
        }
        let session: AuthSession = response.json().await?;
        Ok(with_expiry(session))
    }

    /// Build a request with the API key and the signed-in user's token,
    /// refreshing it first when needed. Without a session the anon key is
    /// the bearer.
    pub async fn authorized(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let bearer = match self.session().await? {
            Some(session) => session.access_token,
            None => self.config.anon_key.clone(),
        };
        Ok(self.request_with_token(method, url, &bearer))
    }

    /// Build a request authorized with an explicit token.
    pub fn request_with_token(&self, method: Method, url: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {}", token))
    }
}

/// Extract the most useful message from an error response body.
///
/// The three APIs disagree on the field: `message` (data, storage), `msg`
/// or `error_description` (auth), `error` (older gateways).
pub async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    message_from_body(&body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body.trim())
        }
    })
}

fn message_from_body(body: &str) -> Option<String> {
    let value: JsonValue = serde_json::from_str(body).ok()?;
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}
