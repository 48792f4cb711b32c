//! # sborr-client
//!
//! Backend implementations for the SBORR stores.
//!
//! [`connect`] wires the hosted services (data, storage and auth over HTTPS,
//! row changes over the realtime websocket) into one [`Backend`]. The
//! [`MemoryBackend`] implements the same contracts in process for tests and
//! offline use.

pub mod auth;
pub mod config;
pub mod http;
pub mod memory;
pub mod realtime;
pub mod rest;
pub mod storage;

use std::sync::Arc;

use tracing::info;

use sborr_core::{Backend, Result};

pub use auth::RestAuth;
pub use config::ClientConfig;
pub use http::{HttpCore, TokenSlot};
pub use memory::{MemoryBackend, StoredObject};
pub use realtime::RealtimeFeed;
pub use rest::RestDataBackend;
pub use storage::RestStorage;

/// Connect to a hosted project.
///
/// Must be called inside a tokio runtime: the realtime socket task is spawned
/// immediately and joins tables as stores subscribe.
pub fn connect(config: ClientConfig) -> Result<Backend> {
    config.validate()?;
    let http = HttpCore::new(config.clone(), TokenSlot::new())?;
    let backend = Backend::new(
        Arc::new(RestDataBackend::new(http.clone())),
        Arc::new(RestStorage::new(http.clone())),
        Arc::new(RestAuth::new(http.clone())),
        Arc::new(RealtimeFeed::start(config.clone(), http)),
    );
    info!(url = %config.url, "connected backend");
    Ok(backend)
}

/// Connect using `SBORR_*` environment variables.
pub fn connect_from_env() -> Result<Backend> {
    connect(ClientConfig::from_env()?)
}
