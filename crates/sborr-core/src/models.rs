//! Record types mirrored from the backend tables.
//!
//! Field names follow the table columns so rows round-trip through the data
//! API without renaming, except where a column name is a Rust keyword.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// =============================================================================
// RECORD TRAIT
// =============================================================================

/// A row with a UUID primary key. Lets list merges stay generic.
pub trait Record {
    fn record_id(&self) -> Uuid;
}

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Kind of legislative document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Ordinance,
    Resolution,
    Memorandum,
}

impl DocumentType {
    pub const ALL: [DocumentType; 3] = [Self::Ordinance, Self::Resolution, Self::Memorandum];
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ordinance => write!(f, "ordinance"),
            Self::Resolution => write!(f, "resolution"),
            Self::Memorandum => write!(f, "memorandum"),
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ordinance" => Ok(Self::Ordinance),
            "resolution" => Ok(Self::Resolution),
            "memorandum" => Ok(Self::Memorandum),
            _ => Err(format!("Invalid document type: {}", s)),
        }
    }
}

/// Workflow status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    ForReview,
    InSession,
    Approved,
    Rejected,
    Archived,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 6] = [
        Self::Draft,
        Self::ForReview,
        Self::InSession,
        Self::Approved,
        Self::Rejected,
        Self::Archived,
    ];

    /// Whether a newly uploaded document may start in this status.
    pub fn is_initial(&self) -> bool {
        matches!(self, Self::Draft | Self::ForReview)
    }

    /// Human-readable label ("for review", "in session").
    pub fn label(&self) -> String {
        self.to_string().replace('_', " ")
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::ForReview => write!(f, "for_review"),
            Self::InSession => write!(f, "in_session"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace(' ', "_").as_str() {
            "draft" => Ok(Self::Draft),
            "for_review" => Ok(Self::ForReview),
            "in_session" => Ok(Self::InSession),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("Invalid document status: {}", s)),
        }
    }
}

/// A legislative document record (`documents` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    /// Series year. Stored as text; numeric columns are accepted on read.
    #[serde(deserialize_with = "string_or_number::deserialize")]
    pub series: String,
    pub author_name: String,
    pub created_by: Option<Uuid>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub file_url: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Record for Document {
    fn record_id(&self) -> Uuid {
        self.id
    }
}

/// Metadata supplied when uploading a new document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub series: String,
    pub author_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
}

/// Editable document fields. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<DocumentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DocumentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
}

impl DocumentUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl From<&Document> for DocumentUpdate {
    fn from(doc: &Document) -> Self {
        Self {
            title: Some(doc.title.clone()),
            description: doc.description.clone(),
            doc_type: Some(doc.doc_type),
            status: Some(doc.status),
            series: Some(doc.series.clone()),
            author_name: Some(doc.author_name.clone()),
        }
    }
}

/// Projection of a document used by the agenda join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: Uuid,
    pub title: String,
    pub file_url: Option<String>,
}

impl Record for DocumentRef {
    fn record_id(&self) -> Uuid {
        self.id
    }
}

// =============================================================================
// SESSIONS AND AGENDAS
// =============================================================================

/// Lifecycle of a council session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    InSession,
    Completed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::InSession => write!(f, "in_session"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// A council session (`sessions` table). Read-only from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    /// Session kind, e.g. `regular_session` or `special_session`.
    #[serde(rename = "type")]
    pub session_type: String,
    pub venue: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Session kind with underscores replaced for display.
    pub fn type_label(&self) -> String {
        self.session_type.replace('_', " ")
    }
}

impl Record for Session {
    fn record_id(&self) -> Uuid {
        self.id
    }
}

/// A `session_documents` row linking a session to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agenda {
    pub id: Uuid,
    pub session_id: Uuid,
    pub document_id: Uuid,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Record for Agenda {
    fn record_id(&self) -> Uuid {
        self.id
    }
}

/// An agenda link enriched with the linked document's title and file URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgendaItem {
    #[serde(flatten)]
    pub agenda: Agenda,
    pub title: Option<String>,
    pub file_url: Option<String>,
}

impl Record for AgendaItem {
    fn record_id(&self) -> Uuid {
        self.agenda.id
    }
}

/// A session together with its agenda.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionWithAgendas {
    #[serde(flatten)]
    pub session: Session,
    pub agendas: Vec<AgendaItem>,
}

impl Record for SessionWithAgendas {
    fn record_id(&self) -> Uuid {
        self.session.id
    }
}

// =============================================================================
// USERS
// =============================================================================

/// Council role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Mayor,
    ViceMayor,
    Secretary,
    Councilor,
}

impl UserRole {
    /// Title shown on the dashboard greeting.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Mayor => "Mayor",
            Self::ViceMayor => "Vice Mayor",
            Self::Secretary => "Secretary",
            Self::Councilor => "Councilor",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mayor => write!(f, "mayor"),
            Self::ViceMayor => write!(f, "vice_mayor"),
            Self::Secretary => write!(f, "secretary"),
            Self::Councilor => write!(f, "councilor"),
        }
    }
}

/// A user profile (`users` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub email: String,
    pub role: Option<UserRole>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub avatar_path: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
            .trim()
            .to_string()
    }

    /// Role title, defaulting to councilor when the role is unset.
    pub fn role_title(&self) -> &'static str {
        self.role.unwrap_or(UserRole::Councilor).title()
    }
}

impl Record for User {
    fn record_id(&self) -> Uuid {
        self.id
    }
}

/// Profile fields a user may change. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_path: Option<String>,
}

// =============================================================================
// AUTH
// =============================================================================

/// The identity attached to an auth session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Token bundle returned by the auth provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    pub expires_at: Option<i64>,
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl AuthSession {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    /// Whether the access token has passed its expiry (unknown expiry never expires).
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|at| now.timestamp() >= at)
            .unwrap_or(false)
    }
}

// =============================================================================
// LOCAL FILES
// =============================================================================

/// A file handed over by the platform picker: its URI and raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    pub uri: String,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    pub fn new(uri: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            uri: uri.into(),
            bytes,
        }
    }

    /// Read a file from the local filesystem.
    pub async fn read(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let uri = path
            .to_str()
            .ok_or_else(|| Error::InvalidInput(format!("non UTF-8 path: {}", path.display())))?
            .to_string();
        Ok(Self { uri, bytes })
    }
}

// =============================================================================
// SERDE HELPERS
// =============================================================================

/// Timestamps arrive as RFC 3339 from `timestamptz` columns and without an
/// offset from `timestamp` columns; the latter are taken as UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            dt: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => s.serialize_some(&dt.to_rfc3339()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(raw) => super::parse(&raw).map(Some).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid timestamp: {raw}"))
                }),
                None => Ok(None),
            }
        }
    }
}

mod string_or_number {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        match Value::deserialize(d)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "expected string or number, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document_json() -> serde_json::Value {
        json!({
            "id": "6f1c1b9e-0000-4000-8000-000000000001",
            "title": "Ordinance on Street Vending",
            "description": null,
            "type": "ordinance",
            "status": "for_review",
            "series": 2024,
            "author_name": "Hon. Reyes",
            "created_by": "6f1c1b9e-0000-4000-8000-0000000000aa",
            "file_name": "1700000000000.pdf",
            "file_path": "documents/1700000000000.pdf",
            "file_url": "https://x.test/storage/v1/object/public/documents/1700000000000.pdf",
            "created_at": "2024-03-01T08:30:00+00:00"
        })
    }

    #[test]
    fn test_document_deserializes_numeric_series() {
        let doc: Document = serde_json::from_value(document_json()).unwrap();
        assert_eq!(doc.series, "2024");
        assert_eq!(doc.doc_type, DocumentType::Ordinance);
        assert_eq!(doc.status, DocumentStatus::ForReview);
    }

    #[test]
    fn test_document_serializes_type_column() {
        let doc: Document = serde_json::from_value(document_json()).unwrap();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["type"], "ordinance");
        assert_eq!(value["status"], "for_review");
        assert!(value.get("doc_type").is_none());
    }

    #[test]
    fn test_naive_timestamp_is_utc() {
        let dt = timestamp::parse("2024-03-01T08:30:00.123456").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-01T08:30:00.123456+00:00");
        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn test_status_parse_and_label() {
        assert_eq!(
            "for review".parse::<DocumentStatus>().unwrap(),
            DocumentStatus::ForReview
        );
        assert_eq!(DocumentStatus::InSession.label(), "in session");
        assert!("pending".parse::<DocumentStatus>().is_err());
        assert!(DocumentStatus::Draft.is_initial());
        assert!(!DocumentStatus::Approved.is_initial());
    }

    #[test]
    fn test_document_update_skips_absent_fields() {
        let update = DocumentUpdate {
            status: Some(DocumentStatus::Approved),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"status": "approved"})
        );
        assert!(DocumentUpdate::default().is_empty());
    }

    #[test]
    fn test_agenda_item_flattens_link() {
        let item: AgendaItem = serde_json::from_value(json!({
            "id": "6f1c1b9e-0000-4000-8000-000000000010",
            "session_id": "6f1c1b9e-0000-4000-8000-000000000020",
            "document_id": "6f1c1b9e-0000-4000-8000-000000000001",
            "created_at": "2024-03-02T00:00:00Z",
            "title": "Ordinance on Street Vending"
        }))
        .unwrap();
        assert_eq!(item.title.as_deref(), Some("Ordinance on Street Vending"));
        assert!(item.file_url.is_none());
    }

    #[test]
    fn test_user_role_title_defaults_to_councilor() {
        let user: User = serde_json::from_value(json!({
            "id": "6f1c1b9e-0000-4000-8000-0000000000aa",
            "firstname": "Ana",
            "lastname": "Reyes",
            "email": "ana@sborr.test",
            "role": null
        }))
        .unwrap();
        assert_eq!(user.role_title(), "Councilor");
        assert_eq!(user.full_name(), "Ana Reyes");
        assert!(user.created_at.is_none());
    }

    #[test]
    fn test_auth_session_expiry() {
        let session = AuthSession {
            access_token: "token".into(),
            token_type: "bearer".into(),
            expires_in: 3600,
            expires_at: Some(1_700_000_000),
            refresh_token: None,
            user: AuthUser {
                id: Uuid::nil(),
                email: None,
            },
        };
        let before = DateTime::from_timestamp(1_699_999_999, 0).unwrap();
        let after = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert!(!session.is_expired(before));
        assert!(session.is_expired(after));
    }
}
