//! Email/password auth against the hosted auth API.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{info, warn};

use sborr_core::{AuthEvent, AuthProvider, AuthSession, AuthUser, Error, Result};

use crate::http::{error_message, HttpCore, TokenSlot};

/// Auth API client. Holds the session in the shared [`TokenSlot`] and
/// announces changes on its event channel.
pub struct RestAuth {
    http: HttpCore,
}

impl RestAuth {
    pub fn new(http: HttpCore) -> Self {
        Self { http }
    }

    fn tokens(&self) -> &TokenSlot {
        self.http.tokens()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.http.config().auth_url(), path)
    }

    async fn require_session(&self) -> Result<AuthSession> {
        self.http
            .session()
            .await?
            .ok_or_else(|| Error::Unauthorized("no active session".to_string()))
    }
}

#[async_trait]
impl AuthProvider for RestAuth {
    async fn current_session(&self) -> Result<Option<AuthSession>> {
        self.http.session().await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        let session = self
            .http
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        self.tokens().set(Some(session.clone()));
        info!(user_id = %session.user_id(), "auth: signed in");
        self.tokens().emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.tokens().get() else {
            return Ok(());
        };
        let response = self
            .http
            .request_with_token(Method::POST, &self.url("logout"), &session.access_token)
            .send()
            .await?;
        let status = response.status();
        // An already revoked token still ends the local session.
        if !status.is_success() && status != StatusCode::UNAUTHORIZED {
            let message = error_message(response).await;
            warn!(error = %message, "auth: sign out rejected");
            return Err(Error::Auth(message));
        }
        self.tokens().set(None);
        info!(user_id = %session.user_id(), "auth: signed out");
        self.tokens().emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn current_user(&self) -> Result<AuthUser> {
        let session = self.require_session().await?;
        let response = self
            .http
            .request_with_token(Method::GET, &self.url("user"), &session.access_token)
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized(error_message(response).await));
        }
        if !response.status().is_success() {
            return Err(Error::Auth(error_message(response).await));
        }
        Ok(response.json().await?)
    }

    async fn update_password(&self, new_password: &str) -> Result<AuthUser> {
        let session = self.require_session().await?;
        let response = self
            .http
            .request_with_token(Method::PUT, &self.url("user"), &session.access_token)
            .json(&json!({ "password": new_password }))
            .send()
            .await?;
        if !response.status().is_success() {
            let message = error_message(response).await;
            warn!(error = %message, "auth: password update rejected");
            return Err(Error::Auth(message));
        }
        let user: AuthUser = response.json().await?;
        let updated = AuthSession {
            user: user.clone(),
            ..session
        };
        self.tokens().set(Some(updated.clone()));
        self.tokens().emit(AuthEvent::UserUpdated(updated));
        Ok(user)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tokens().subscribe()
    }
}
