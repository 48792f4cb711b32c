//! Centralized default constants for the SBORR client.
//!
//! Table names, bucket names and validation limits live here so the stores,
//! the backends and the CLI agree on them.

// =============================================================================
// TABLES
// =============================================================================

/// Document records (ordinances, resolutions, memoranda).
pub const DOCUMENTS_TABLE: &str = "documents";

/// Council sessions.
pub const SESSIONS_TABLE: &str = "sessions";

/// Agenda links between sessions and documents.
pub const SESSION_DOCUMENTS_TABLE: &str = "session_documents";

/// User profiles.
pub const USERS_TABLE: &str = "users";

/// Schema the watched tables live in.
pub const DB_SCHEMA: &str = "public";

// =============================================================================
// STORAGE
// =============================================================================

/// Bucket holding uploaded document files.
pub const DOCUMENTS_BUCKET: &str = "documents";

/// Bucket holding profile pictures.
pub const AVATARS_BUCKET: &str = "avatars";

/// Content type used when a document's type cannot be determined.
pub const DOCUMENT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type used when an avatar's type cannot be determined.
pub const AVATAR_CONTENT_TYPE: &str = "image/jpeg";

/// Extension assumed for avatars picked without one.
pub const AVATAR_EXTENSION: &str = "jpg";

/// Upload size ceiling (50 MiB, the storage API's default object limit).
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

// =============================================================================
// AUTH
// =============================================================================

/// Minimum password length accepted by the sign-in form.
pub const SIGN_IN_PASSWORD_MIN: usize = 8;

/// Minimum length for a new password on the change-password form.
pub const NEW_PASSWORD_MIN: usize = 6;

// =============================================================================
// EVENTS / REALTIME
// =============================================================================

/// Broadcast capacity for each table's change channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Broadcast capacity for auth state events.
pub const AUTH_EVENT_CAPACITY: usize = 16;

/// Realtime heartbeat interval in seconds.
pub const REALTIME_HEARTBEAT_SECS: u64 = 30;

/// Access tokens this close to expiry are refreshed before use.
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

// =============================================================================
// HTTP
// =============================================================================

/// Request timeout for the data, storage and auth APIs.
pub const HTTP_TIMEOUT_SECS: u64 = 30;
