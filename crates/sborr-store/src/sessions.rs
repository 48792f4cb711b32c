//! Session store: council sessions with their agendas.
//!
//! Sessions are read-only from the client. Every fetch pulls sessions, agenda
//! links and a projection of documents, then joins them in memory. Any change
//! to `sessions` or `session_documents` triggers a full refetch.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use sborr_core::defaults::{DOCUMENTS_TABLE, SESSIONS_TABLE, SESSION_DOCUMENTS_TABLE};
use sborr_core::{
    decode_rows, Agenda, AgendaItem, Backend, ChangeEvent, DocumentRef, Query, Result, Session,
    SessionFilter, SessionWithAgendas,
};

use crate::state::Shared;
use crate::subscription::Subscription;

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Newest first, each with its agenda.
    pub sessions: Vec<SessionWithAgendas>,
    /// Every agenda link, newest first.
    pub agendas: Vec<AgendaItem>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Join agenda links to their documents and sessions to their agendas.
///
/// Links to unknown documents keep empty title and URL. Agenda order within a
/// session follows `agendas`.
pub fn join_agendas(
    sessions: Vec<Session>,
    agendas: Vec<Agenda>,
    documents: &[DocumentRef],
) -> (Vec<SessionWithAgendas>, Vec<AgendaItem>) {
    let by_id: HashMap<Uuid, &DocumentRef> = documents.iter().map(|d| (d.id, d)).collect();
    let items: Vec<AgendaItem> = agendas
        .into_iter()
        .map(|agenda| {
            let doc = by_id.get(&agenda.document_id);
            AgendaItem {
                title: doc.map(|d| d.title.clone()),
                file_url: doc.and_then(|d| d.file_url.clone()),
                agenda,
            }
        })
        .collect();
    let sessions = sessions
        .into_iter()
        .map(|session| SessionWithAgendas {
            agendas: items
                .iter()
                .filter(|a| a.agenda.session_id == session.id)
                .cloned()
                .collect(),
            session,
        })
        .collect();
    (sessions, items)
}

#[derive(Clone)]
pub struct SessionStore {
    backend: Backend,
    shared: Arc<Shared<SessionState>>,
}

impl SessionStore {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            shared: Arc::new(Shared::new(SessionState::default())),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.shared.read(|s| s.clone())
    }

    pub fn sessions(&self) -> Vec<SessionWithAgendas> {
        self.shared.read(|s| s.sessions.clone())
    }

    pub fn agendas(&self) -> Vec<AgendaItem> {
        self.shared.read(|s| s.agendas.clone())
    }

    /// Agenda of one session.
    pub fn agendas_for(&self, session_id: Uuid) -> Vec<AgendaItem> {
        self.shared.read(|s| {
            s.agendas
                .iter()
                .filter(|a| a.agenda.session_id == session_id)
                .cloned()
                .collect()
        })
    }

    /// Sessions whose type, venue or agenda titles match `search`.
    pub fn filtered(&self, search: &str) -> Vec<SessionWithAgendas> {
        let filter = SessionFilter::search(search);
        self.shared.read(|s| filter.apply(&s.sessions))
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

    /// Fetch sessions, agenda links and documents, and rebuild the join.
    ///
    /// The previous error stays visible until a fetch succeeds.
    pub async fn fetch_all(&self) -> Result<Vec<SessionWithAgendas>> {
        self.shared.update(|s| s.loading = true);
        let result = self.load().await;
        self.shared.update(|s| {
            s.loading = false;
            match &result {
                Ok((sessions, agendas)) => {
                    s.sessions = sessions.clone();
                    s.agendas = agendas.clone();
                    s.error = None;
                }
                Err(e) => s.error = Some(e.message()),
            }
        });
        match result {
            Ok((sessions, agendas)) => {
                debug!(
                    result_count = sessions.len(),
                    agenda_count = agendas.len(),
                    "fetched sessions"
                );
                Ok(sessions)
            }
            Err(e) => {
                warn!(op = "fetch_all", table = SESSIONS_TABLE, error = %e, "session store operation failed");
                Err(e)
            }
        }
    }

    async fn load(&self) -> Result<(Vec<SessionWithAgendas>, Vec<AgendaItem>)> {
        let data = &self.backend.data;
        let sessions: Vec<Session> = decode_rows(
            data.select(SESSIONS_TABLE, &Query::all().newest_first())
                .await?,
        )?;
        let agendas: Vec<Agenda> = decode_rows(
            data.select(SESSION_DOCUMENTS_TABLE, &Query::all().newest_first())
                .await?,
        )?;
        let documents: Vec<DocumentRef> = decode_rows(
            data.select(
                DOCUMENTS_TABLE,
                &Query::all().columns(&["id", "title", "file_url"]),
            )
            .await?,
        )?;
        Ok(join_agendas(sessions, agendas, &documents))
    }

    /// Refetch on every change to sessions or agenda links.
    pub fn subscribe(&self) -> Subscription {
        let mut sessions_rx = self.backend.changes.subscribe(SESSIONS_TABLE);
        let mut agendas_rx = self.backend.changes.subscribe(SESSION_DOCUMENTS_TABLE);
        let store = self.clone();
        Subscription::spawn(&[SESSIONS_TABLE, SESSION_DOCUMENTS_TABLE], async move {
            let mut sessions_open = true;
            let mut agendas_open = true;
            while sessions_open || agendas_open {
                tokio::select! {
                    received = sessions_rx.recv(), if sessions_open => {
                        sessions_open = store.on_received(received).await;
                    }
                    received = agendas_rx.recv(), if agendas_open => {
                        agendas_open = store.on_received(received).await;
                    }
                }
            }
        })
    }

    /// Handle one receive result; `false` once the feed is closed.
    async fn on_received(
        &self,
        received: std::result::Result<ChangeEvent, broadcast::error::RecvError>,
    ) -> bool {
        match received {
            Ok(event) => {
                self.on_change(&event).await;
                true
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "session changes lagged, refetching");
                let _ = self.fetch_all().await;
                true
            }
            Err(broadcast::error::RecvError::Closed) => false,
        }
    }

    async fn on_change(&self, event: &ChangeEvent) {
        debug!(table = %event.table, event_kind = %event.kind, "session change, refetching");
        let _ = self.fetch_all().await;
    }
}
