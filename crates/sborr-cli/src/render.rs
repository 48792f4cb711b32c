//! Plain-text views of store contents.

use std::fmt::Write;

use sborr_core::{can_modify_document, Document, SessionWithAgendas, User};
use sborr_store::{DashboardStats, Stores};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Documents the logon user may edit are marked with `*`.
pub fn documents(docs: &[Document], logon: Option<&User>) -> String {
    if docs.is_empty() {
        return "No documents found.\n".to_string();
    }
    let mut out = String::new();
    for doc in docs {
        let mine = logon.is_some_and(|user| can_modify_document(user, doc));
        let _ = writeln!(
            out,
            "{:<11} {:<11} {:<6} {}  ({}){}",
            doc.status.label(),
            doc.doc_type.to_string(),
            doc.series,
            doc.title,
            doc.author_name,
            if mine { " *" } else { "" }
        );
    }
    out
}

pub fn uploaded(doc: &Document) -> String {
    format!(
        "Uploaded {} as {}\n{}\n",
        doc.title,
        doc.file_name.as_deref().unwrap_or("(no file)"),
        doc.file_url.as_deref().unwrap_or_default()
    )
}

pub fn sessions(sessions: &[SessionWithAgendas]) -> String {
    if sessions.is_empty() {
        return "No sessions found.\n".to_string();
    }
    let mut out = String::new();
    for entry in sessions {
        let session = &entry.session;
        let when = session
            .scheduled_at
            .map(|at| at.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "unscheduled".to_string());
        let _ = writeln!(
            out,
            "{}  {} at {} [{}]",
            when,
            session.type_label(),
            session.venue.as_deref().unwrap_or("TBA"),
            session.status
        );
        for item in &entry.agendas {
            let _ = writeln!(
                out,
                "    - {}",
                item.title.as_deref().unwrap_or("(untitled)")
            );
        }
    }
    out
}

pub fn dashboard(stats: &DashboardStats, logon: Option<&User>) -> String {
    let mut out = String::new();
    if let Some(user) = logon {
        let _ = writeln!(out, "Welcome, {} {}", user.role_title(), user.full_name());
    }
    let _ = writeln!(out, "Sessions:   {}", stats.total_sessions);
    let _ = writeln!(out, "Documents:  {}", stats.total_documents);
    let _ = writeln!(out, "Approved:   {}", stats.approved);
    let _ = writeln!(out, "Archived:   {}", stats.archived);
    for (doc_type, count) in &stats.by_type {
        let _ = writeln!(out, "  {:<11} {}", doc_type.to_string(), count);
    }

    let _ = writeln!(out, "Today:");
    if stats.sessions_today.is_empty() {
        let _ = writeln!(out, "  no sessions");
    }
    for session in &stats.sessions_today {
        let _ = writeln!(
            out,
            "  {} at {}",
            session.type_label(),
            session.venue.as_deref().unwrap_or("TBA")
        );
    }

    match &stats.next_meeting {
        Some(next) => {
            let when = next
                .scheduled_at
                .map(|at| at.format(DATE_FORMAT).to_string())
                .unwrap_or_default();
            let _ = writeln!(out, "Next meeting: {} {}", when, next.type_label());
        }
        None => {
            let _ = writeln!(out, "Next meeting: none scheduled");
        }
    }
    out
}

pub fn user(user: &User) -> String {
    format!(
        "{}\n{}\n{}\n{}\n",
        user.full_name(),
        user.role_title(),
        user.email,
        user.id
    )
}

pub fn watch_line(what: &str, stores: &Stores) -> String {
    format!(
        "[{}] {} documents, {} sessions, {} users",
        what,
        stores.documents.documents().len(),
        stores.sessions.sessions().len(),
        stores.users.users().len()
    )
}
