//! # sborr-core
//!
//! Core types, traits, and abstractions for the SBORR client.
//!
//! This crate provides the record types mirrored from the backend tables, the
//! backend contracts (data, storage, auth, change feed) that concrete clients
//! implement, and the pure helpers the stores share.

pub mod defaults;
pub mod error;
pub mod events;
pub mod file_safety;
pub mod filter;
pub mod logging;
pub mod models;
pub mod policy;
pub mod traits;
pub mod validation;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{AuthEvent, ChangeEvent, ChangeKind, EventBus};
pub use file_safety::{detect_content_type, file_extension, validate_file, ValidationResult};
pub use filter::{DocumentFilter, SessionFilter};
pub use models::*;
pub use policy::{can_modify_document, can_upload_document};
pub use traits::*;
