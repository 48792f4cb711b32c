//! Dashboard figures derived from the document and session lists.

use chrono::NaiveDate;

use sborr_core::{Document, DocumentStatus, DocumentType, Session, SessionWithAgendas};

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardStats {
    pub total_sessions: usize,
    pub total_documents: usize,
    pub archived: usize,
    pub approved: usize,
    /// Count per document type, in [`DocumentType::ALL`] order.
    pub by_type: Vec<(DocumentType, usize)>,
    /// Sessions scheduled on `today`, earliest first.
    pub sessions_today: Vec<Session>,
    /// Earliest session scheduled after `today`.
    pub next_meeting: Option<Session>,
}

impl DashboardStats {
    /// Compute the figures. Dates compare on the UTC calendar day of `scheduled_at`.
    pub fn compute(
        documents: &[Document],
        sessions: &[SessionWithAgendas],
        today: NaiveDate,
    ) -> Self {
        let count_status =
            |status: DocumentStatus| documents.iter().filter(|d| d.status == status).count();
        let by_type = DocumentType::ALL
            .iter()
            .map(|t| (*t, documents.iter().filter(|d| d.doc_type == *t).count()))
            .collect();

        let scheduled = |day: fn(NaiveDate, NaiveDate) -> bool| {
            let mut matching: Vec<Session> = sessions
                .iter()
                .map(|s| &s.session)
                .filter(|s| s.scheduled_at.is_some_and(|at| day(at.date_naive(), today)))
                .cloned()
                .collect();
            matching.sort_by_key(|s| s.scheduled_at);
            matching
        };

        Self {
            total_sessions: sessions.len(),
            total_documents: documents.len(),
            archived: count_status(DocumentStatus::Archived),
            approved: count_status(DocumentStatus::Approved),
            by_type,
            sessions_today: scheduled(|day, today| day == today),
            next_meeting: scheduled(|day, today| day > today).into_iter().next(),
        }
    }

    pub fn count_of(&self, doc_type: DocumentType) -> usize {
        self.by_type
            .iter()
            .find(|(t, _)| *t == doc_type)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}
