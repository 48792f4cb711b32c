//! Structured logging field names shared by all SBORR crates.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Push payload or backend response could not be used |
//! | WARN  | Recoverable failure, store state records the error |
//! | INFO  | Lifecycle events (sign-in, subscriptions, uploads) |
//! | DEBUG | Decision points, merge outcomes, request details |
//! | TRACE | Per-frame realtime traffic |

/// Logical operation name.
/// Examples: "fetch_all", "upload", "remove", "merge"
pub const OPERATION: &str = "op";

/// Backend table affected.
pub const TABLE: &str = "table";

/// UUID of the record being operated on.
pub const RECORD_ID: &str = "record_id";

/// Storage bucket name.
pub const BUCKET: &str = "bucket";

/// Object path inside a bucket.
pub const STORAGE_PATH: &str = "storage_path";

/// Change event kind ("INSERT", "UPDATE", "DELETE").
pub const EVENT_KIND: &str = "event_kind";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows returned by a query.
pub const RESULT_COUNT: &str = "result_count";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
