//! Auth store: the current session and the public/protected gate.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use sborr_core::validation::{validate_credentials, validate_password_change};
use sborr_core::{AuthSession, Backend, Error, Result};

use crate::state::Shared;
use crate::subscription::Subscription;

/// Which side of the app the user may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// The stored session has not been read yet.
    Loading,
    /// No session: sign-in and public pages only.
    Public,
    /// Signed in.
    Protected,
}

#[derive(Debug, Clone)]
pub struct AuthState {
    pub session: Option<AuthSession>,
    pub loading: bool,
    pub error: Option<String>,
    pub initialized: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            session: None,
            loading: true,
            error: None,
            initialized: false,
        }
    }
}

#[derive(Clone)]
pub struct AuthStore {
    backend: Backend,
    shared: Arc<Shared<AuthState>>,
    listener: Arc<Mutex<Option<Subscription>>>,
}

impl AuthStore {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            shared: Arc::new(Shared::new(AuthState::default())),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    pub fn snapshot(&self) -> AuthState {
        self.shared.read(|s| s.clone())
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.shared.read(|s| s.session.clone())
    }

    /// Id of the signed-in user.
    pub fn user_id(&self) -> Option<Uuid> {
        self.shared
            .read(|s| s.session.as_ref().map(AuthSession::user_id))
    }

    pub fn loading(&self) -> bool {
        self.shared.read(|s| s.loading)
    }

    pub fn error(&self) -> Option<String> {
        self.shared.read(|s| s.error.clone())
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.shared.watch()
    }

    pub fn gate(&self) -> Gate {
        self.shared.read(|s| {
            if !s.initialized {
                Gate::Loading
            } else if s.session.is_some() {
                Gate::Protected
            } else {
                Gate::Public
            }
        })
    }

    /// Restore the stored session and follow auth state changes from now on.
    pub async fn initialize(&self) -> Result<()> {
        // Subscribe first so no transition between the read and the listener is lost.
        let events = self.backend.auth.subscribe();
        match self.backend.auth.current_session().await {
            Ok(session) => {
                debug!(signed_in = session.is_some(), "restored auth session");
                self.shared.update(|s| {
                    s.session = session;
                    s.loading = false;
                    s.initialized = true;
                });
                self.follow(events);
                Ok(())
            }
            Err(e) => {
                warn!(op = "initialize", error = %e, "failed to read auth session");
                self.shared.update(|s| {
                    s.error = Some(e.message());
                    s.loading = false;
                    s.initialized = true;
                });
                Err(e)
            }
        }
    }

    fn follow(&self, mut events: broadcast::Receiver<sborr_core::AuthEvent>) {
        let shared = self.shared.clone();
        let subscription = Subscription::spawn(&["auth"], async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        debug!(event = event.name(), "auth state change");
                        let session = event.session().cloned();
                        shared.update(|s| s.session = session);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "auth events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(subscription);
    }

    /// Stop following auth state changes.
    pub fn shutdown(&self) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(listener) = listener {
            listener.unsubscribe();
        }
    }

    fn fail(&self, op: &str, error: Error) -> Error {
        warn!(op, error = %error, "auth store operation failed");
        let message = error.message();
        self.shared.update(|s| {
            s.error = Some(message);
            s.loading = false;
        });
        error
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let email = email.trim();
        validate_credentials(email, password).map_err(|e| self.fail("sign_in", e))?;
        self.shared.update(|s| {
            s.loading = true;
            s.error = None;
        });
        match self.backend.auth.sign_in_with_password(email, password).await {
            Ok(session) => {
                info!(user_id = %session.user_id(), "signed in");
                let stored = session.clone();
                self.shared.update(|s| {
                    s.session = Some(stored);
                    s.loading = false;
                });
                Ok(session)
            }
            Err(e) => Err(self.fail("sign_in", e)),
        }
    }

    pub async fn sign_out(&self) -> Result<()> {
        match self.backend.auth.sign_out().await {
            Ok(()) => {
                info!("signed out");
                self.shared.update(|s| s.session = None);
                Ok(())
            }
            Err(e) => Err(self.fail("sign_out", e)),
        }
    }

    /// Change the password after re-authenticating with the current one.
    pub async fn change_password(&self, current: &str, new: &str, confirm: &str) -> Result<()> {
        validate_password_change(current, new, confirm)
            .map_err(|e| self.fail("change_password", e))?;
        self.shared.update(|s| {
            s.loading = true;
            s.error = None;
        });
        match self.change_password_inner(current, new).await {
            Ok(()) => {
                info!("password changed");
                self.shared.update(|s| s.loading = false);
                Ok(())
            }
            Err(e) => Err(self.fail("change_password", e)),
        }
    }

    async fn change_password_inner(&self, current: &str, new: &str) -> Result<()> {
        let not_logged_in = || Error::Unauthorized("You must be logged in.".to_string());
        let user = self
            .backend
            .auth
            .current_user()
            .await
            .map_err(|_| not_logged_in())?;
        let email = user.email.filter(|e| !e.is_empty()).ok_or_else(not_logged_in)?;

        self.backend
            .auth
            .sign_in_with_password(&email, current)
            .await
            .map_err(|_| Error::Auth("Your current password is incorrect.".to_string()))?;

        self.backend.auth.update_password(new).await?;
        Ok(())
    }
}
