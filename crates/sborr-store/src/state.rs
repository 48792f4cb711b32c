//! Shared state cell behind every store.

use std::sync::RwLock;

use tokio::sync::watch;

/// State guarded by a lock plus a version counter that ticks on every write.
///
/// Renderers hold a `watch::Receiver` and redraw when it changes; they read
/// the state itself through a snapshot.
pub(crate) struct Shared<S> {
    state: RwLock<S>,
    version: watch::Sender<u64>,
}

impl<S> Shared<S> {
    pub(crate) fn new(initial: S) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: RwLock::new(initial),
            version,
        }
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let guard = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    /// Mutate the state and notify watchers.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let result = {
            let mut guard = self
                .state
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard)
        };
        self.version.send_modify(|v| *v = v.wrapping_add(1));
        result
    }

    pub(crate) fn watch(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}
