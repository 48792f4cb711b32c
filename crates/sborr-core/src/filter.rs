//! List filters used by the document and session views.

use crate::models::{Document, DocumentStatus, DocumentType, SessionWithAgendas};

/// Search text plus optional type and status filters for documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    /// Case-insensitive match against title or author name.
    pub search: Option<String>,
    pub doc_type: Option<DocumentType>,
    pub status: Option<DocumentStatus>,
}

impl DocumentFilter {
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn doc_type(mut self, doc_type: DocumentType) -> Self {
        self.doc_type = Some(doc_type);
        self
    }

    pub fn status(mut self, status: DocumentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(needle) = normalized(self.search.as_deref()) {
            let hit = doc.title.to_lowercase().contains(&needle)
                || doc.author_name.to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }
        if self.doc_type.is_some_and(|t| t != doc.doc_type) {
            return false;
        }
        if self.status.is_some_and(|s| s != doc.status) {
            return false;
        }
        true
    }

    /// Matching documents, order preserved.
    pub fn apply(&self, docs: &[Document]) -> Vec<Document> {
        docs.iter().filter(|d| self.matches(d)).cloned().collect()
    }
}

/// Search over sessions by type, venue, or the titles on their agenda.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionFilter {
    pub search: Option<String>,
}

impl SessionFilter {
    pub fn search(text: impl Into<String>) -> Self {
        Self {
            search: Some(text.into()),
        }
    }

    pub fn matches(&self, entry: &SessionWithAgendas) -> bool {
        let Some(needle) = normalized(self.search.as_deref()) else {
            return true;
        };
        let session = &entry.session;
        session.session_type.to_lowercase().contains(&needle)
            || session
                .venue
                .as_deref()
                .is_some_and(|v| v.to_lowercase().contains(&needle))
            || entry.agendas.iter().any(|a| {
                a.title
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(&needle))
            })
    }

    pub fn apply(&self, sessions: &[SessionWithAgendas]) -> Vec<SessionWithAgendas> {
        sessions.iter().filter(|s| self.matches(s)).cloned().collect()
    }
}

fn normalized(search: Option<&str>) -> Option<String> {
    let trimmed = search?.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Agenda, AgendaItem, Session, SessionStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn doc(title: &str, author: &str, t: DocumentType, s: DocumentStatus) -> Document {
        Document {
            id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            doc_type: t,
            status: s,
            series: "2025".into(),
            author_name: author.into(),
            created_by: None,
            file_name: None,
            file_path: None,
            file_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_document_filter_search_title_or_author() {
        let docs = vec![
            doc("Tricycle Fares", "Hon. Cruz", DocumentType::Ordinance, DocumentStatus::Draft),
            doc("Budget 2025", "Hon. Tricia Lim", DocumentType::Resolution, DocumentStatus::Approved),
            doc("Flood Control", "Hon. Dela Rosa", DocumentType::Memorandum, DocumentStatus::Archived),
        ];
        let hits = DocumentFilter::default().search("  TRIC ").apply(&docs);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Tricycle Fares");

        assert_eq!(DocumentFilter::default().search("   ").apply(&docs).len(), 3);
    }

    #[test]
    fn test_document_filter_type_and_status() {
        let docs = vec![
            doc("A", "x", DocumentType::Ordinance, DocumentStatus::Draft),
            doc("B", "x", DocumentType::Ordinance, DocumentStatus::Approved),
            doc("C", "x", DocumentType::Resolution, DocumentStatus::Approved),
        ];
        let filter = DocumentFilter::default()
            .doc_type(DocumentType::Ordinance)
            .status(DocumentStatus::Approved);
        let hits = filter.apply(&docs);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "B");
    }

    #[test]
    fn test_session_filter_matches_agenda_titles() {
        let session = Session {
            id: Uuid::new_v4(),
            session_type: "regular_session".into(),
            venue: Some("Session Hall".into()),
            scheduled_at: None,
            status: SessionStatus::Scheduled,
            created_at: Utc::now(),
        };
        let entry = SessionWithAgendas {
            agendas: vec![AgendaItem {
                agenda: Agenda {
                    id: Uuid::new_v4(),
                    session_id: session.id,
                    document_id: Uuid::new_v4(),
                    created_at: Utc::now(),
                },
                title: Some("Anti-Littering Ordinance".into()),
                file_url: None,
            }],
            session,
        };

        assert!(SessionFilter::search("regular").matches(&entry));
        assert!(SessionFilter::search("hall").matches(&entry));
        assert!(SessionFilter::search("littering").matches(&entry));
        assert!(!SessionFilter::search("budget").matches(&entry));
        assert!(SessionFilter::default().matches(&entry));
    }
}
