//! App lifecycle source
//!
//! The host platform reports foreground/background transitions by calling
//! [`LifecycleSource::set`]. The supervisor listens for them to defer
//! reconnection while the app is not active and to reconnect promptly once
//! it is.

use livefeed_core::AppLifecycle;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared, observable lifecycle value; clones share one value
#[derive(Debug, Clone)]
pub struct LifecycleSource {
    tx: Arc<watch::Sender<AppLifecycle>>,
}

impl LifecycleSource {
    pub fn new(initial: AppLifecycle) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Report a lifecycle transition; returns false if nothing changed
    pub fn set(&self, state: AppLifecycle) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            tracing::debug!(lifecycle = ?state, "app lifecycle changed");
        }
        changed
    }

    pub fn current(&self) -> AppLifecycle {
        *self.tx.borrow()
    }

    pub fn is_foreground(&self) -> bool {
        self.current().is_foreground()
    }

    pub fn listen(&self) -> LifecycleListener {
        LifecycleListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for LifecycleSource {
    fn default() -> Self {
        Self::new(AppLifecycle::Active)
    }
}

/// Receiving side of a [`LifecycleSource`]
#[derive(Debug, Clone)]
pub struct LifecycleListener {
    rx: watch::Receiver<AppLifecycle>,
}

impl LifecycleListener {
    pub fn current(&self) -> AppLifecycle {
        *self.rx.borrow()
    }

    /// Wait for the next transition
    ///
    /// Returns `None` once every `LifecycleSource` clone is dropped. Safe to
    /// use as a `tokio::select!` branch.
    pub async fn changed(&mut self) -> Option<AppLifecycle> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}
