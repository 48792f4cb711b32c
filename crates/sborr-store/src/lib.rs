//! # sborr-store
//!
//! Client-side state for the SBORR app: document, session, user and auth
//! stores that mirror backend tables in memory, apply local mutations, and
//! merge push events from the change feed.
//!
//! Stores are cheap-to-clone handles. Read state through snapshots, redraw
//! when [`watch`](DocumentStore::watch) ticks, and keep the [`Subscription`]
//! handles alive for as long as live updates are wanted.

pub mod auth;
pub mod dashboard;
pub mod documents;
pub mod merge;
pub mod sessions;
mod state;
pub mod subscription;
pub mod users;

use chrono::NaiveDate;
use tracing::{info, warn};

use sborr_core::{Backend, Result};

pub use auth::{AuthState, AuthStore, Gate};
pub use dashboard::DashboardStats;
pub use documents::{DocumentState, DocumentStore};
pub use sessions::{join_agendas, SessionState, SessionStore};
pub use subscription::Subscription;
pub use users::{AvatarUpload, UserState, UserStore};

/// All four stores over one backend.
#[derive(Clone)]
pub struct Stores {
    pub auth: AuthStore,
    pub documents: DocumentStore,
    pub sessions: SessionStore,
    pub users: UserStore,
}

impl Stores {
    pub fn new(backend: Backend) -> Self {
        let auth = AuthStore::new(backend.clone());
        Self {
            documents: DocumentStore::new(backend.clone()),
            sessions: SessionStore::new(backend.clone()),
            users: UserStore::new(backend, auth.clone()),
            auth,
        }
    }

    /// Load users, the logged-on user, sessions and documents concurrently.
    ///
    /// Every store records its own failure; the first error is returned.
    pub async fn load_all(&self) -> Result<()> {
        let (users, logon, sessions, documents) = futures::join!(
            self.users.fetch_all(),
            self.users.fetch_logon_user(),
            self.sessions.fetch_all(),
            self.documents.fetch_all(),
        );
        users?;
        logon?;
        sessions?;
        documents?;
        info!("stores loaded");
        Ok(())
    }

    /// Start live updates for documents, sessions and users.
    pub fn subscribe_all(&self) -> Vec<Subscription> {
        vec![
            self.documents.subscribe(),
            self.sessions.subscribe(),
            self.users.subscribe(),
        ]
    }

    /// Load everything, then start live updates.
    pub async fn start(&self) -> Vec<Subscription> {
        if let Err(e) = self.load_all().await {
            warn!(error = %e, "initial load incomplete");
        }
        self.subscribe_all()
    }

    pub fn dashboard(&self, today: NaiveDate) -> DashboardStats {
        DashboardStats::compute(
            &self.documents.documents(),
            &self.sessions.sessions(),
            today,
        )
    }
}
