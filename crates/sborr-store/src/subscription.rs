//! Handles for live change listeners.

use tokio::task::JoinHandle;
use tracing::debug;

/// A running listener on one or more tables.
///
/// Listening stops when the handle is dropped or [`unsubscribe`](Self::unsubscribe)d.
#[must_use = "dropping a Subscription stops listening"]
pub struct Subscription {
    tables: Vec<String>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn spawn<F>(tables: &[&str], task: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(tables = ?tables, "subscription started");
        Self {
            tables: tables.iter().map(|t| t.to_string()).collect(),
            handle: Some(tokio::spawn(task)),
        }
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Whether the listener task is still running.
    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(tables = ?self.tables, "subscription stopped");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("tables", &self.tables)
            .field("active", &self.is_active())
            .finish()
    }
}
