//! Decoding rows as the data API returns them.

use chrono::{Datelike, Timelike};
use serde_json::json;

use sborr_core::{
    AgendaItem, AuthSession, Document, DocumentStatus, DocumentType, DocumentUpdate, Session,
    SessionStatus, User, UserRole,
};

#[test]
fn test_document_row_with_numeric_series() {
    let row = json!({
        "id": "550e8400-e29b-41d4-a716-446655440000",
        "title": "An Ordinance Regulating Tricycle Fares",
        "description": null,
        "type": "ordinance",
        "status": "for_review",
        "series": 2024,
        "author_name": "Hon. Bautista",
        "created_by": null,
        "file_name": "1714000000000.pdf",
        "file_path": "documents/1714000000000.pdf",
        "file_url": "https://x.supabase.co/storage/v1/object/public/documents/documents/1714000000000.pdf",
        "created_at": "2024-04-25T03:15:00.123456+00:00"
    });

    let doc: Document = serde_json::from_value(row).unwrap();
    assert_eq!(doc.series, "2024");
    assert_eq!(doc.doc_type, DocumentType::Ordinance);
    assert_eq!(doc.status, DocumentStatus::ForReview);
    assert_eq!(doc.created_at.hour(), 3);
}

#[test]
fn test_document_serializes_type_column() {
    let row = json!({
        "id": "550e8400-e29b-41d4-a716-446655440000",
        "title": "Memo",
        "description": null,
        "type": "memorandum",
        "status": "draft",
        "series": "2025",
        "author_name": "Secretariat",
        "created_by": null,
        "file_name": null,
        "file_path": null,
        "file_url": null,
        "created_at": "2025-01-02T00:00:00+00:00"
    });
    let doc: Document = serde_json::from_value(row).unwrap();
    let back = serde_json::to_value(&doc).unwrap();
    assert_eq!(back["type"], "memorandum");
    assert!(back.get("doc_type").is_none());
}

#[test]
fn test_session_timestamp_without_offset_is_utc() {
    let row = json!({
        "id": "550e8400-e29b-41d4-a716-446655440001",
        "type": "regular_session",
        "venue": "Session Hall",
        "scheduled_at": "2024-06-03 14:00:00",
        "status": "in_session",
        "created_at": "2024-05-01T08:00:00"
    });

    let session: Session = serde_json::from_value(row).unwrap();
    let at = session.scheduled_at.unwrap();
    assert_eq!((at.month(), at.day(), at.hour()), (6, 3, 14));
    assert_eq!(session.status, SessionStatus::InSession);
    assert_eq!(session.type_label(), "regular session");
}

#[test]
fn test_session_rejects_garbage_timestamp() {
    let row = json!({
        "id": "550e8400-e29b-41d4-a716-446655440001",
        "type": "special_session",
        "venue": null,
        "scheduled_at": "next tuesday",
        "status": "scheduled",
        "created_at": "2024-05-01T08:00:00Z"
    });
    assert!(serde_json::from_value::<Session>(row).is_err());
}

#[test]
fn test_agenda_item_flattens_link_columns() {
    let row = json!({
        "id": "550e8400-e29b-41d4-a716-446655440002",
        "session_id": "550e8400-e29b-41d4-a716-446655440001",
        "document_id": "550e8400-e29b-41d4-a716-446655440000",
        "created_at": "2024-05-02T00:00:00Z",
        "title": "Budget",
        "file_url": null
    });
    let item: AgendaItem = serde_json::from_value(row).unwrap();
    assert_eq!(item.title.as_deref(), Some("Budget"));
    assert_eq!(
        item.agenda.session_id.to_string(),
        "550e8400-e29b-41d4-a716-446655440001"
    );
}

#[test]
fn test_user_row_with_missing_profile_fields() {
    let row = json!({
        "id": "550e8400-e29b-41d4-a716-446655440003",
        "role": "vice_mayor",
        "bio": null,
        "avatar_url": null,
        "avatar_path": null
    });
    let user: User = serde_json::from_value(row).unwrap();
    assert_eq!(user.role, Some(UserRole::ViceMayor));
    assert_eq!(user.role_title(), "Vice Mayor");
    assert_eq!(user.full_name(), "");
    assert!(user.created_at.is_none());
}

#[test]
fn test_document_update_only_sends_present_fields() {
    let update = DocumentUpdate {
        status: Some(DocumentStatus::Approved),
        ..Default::default()
    };
    assert_eq!(
        serde_json::to_value(&update).unwrap(),
        json!({"status": "approved"})
    );
    assert!(DocumentUpdate::default().is_empty());
    assert!(!update.is_empty());
}

#[test]
fn test_auth_session_token_response() {
    let body = json!({
        "access_token": "eyJhbGciOi",
        "expires_in": 3600,
        "expires_at": 1700000000,
        "refresh_token": "r-123",
        "user": {"id": "550e8400-e29b-41d4-a716-446655440003", "email": "clerk@city.gov"}
    });
    let session: AuthSession = serde_json::from_value(body).unwrap();
    assert_eq!(session.token_type, "bearer");
    let after = chrono::DateTime::from_timestamp(1700000001, 0).unwrap();
    let before = chrono::DateTime::from_timestamp(1699999999, 0).unwrap();
    assert!(session.is_expired(after));
    assert!(!session.is_expired(before));
}
