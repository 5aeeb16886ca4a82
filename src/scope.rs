//! Host lifetime handle.
//!
//! A [`Scope`] is handed to a store by its host. Tearing it down stops the
//! drain loop, completes every state stream and cancels running pipelines.
//! Teardown is idempotent.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Cloneable teardown handle shared between a host and the stores it owns
#[derive(Debug, Clone)]
pub struct Scope {
    cancelled: Arc<watch::Sender<bool>>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            cancelled: Arc::new(tx),
        }
    }

    /// Tear the scope down. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        let changed = self.cancelled.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        });
        if changed {
            debug!("Scope torn down");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves once the scope has been torn down.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.subscribe();
        // The sender lives in `self`, so `wait_for` can only fail if it is
        // dropped, which cannot happen while we borrow it.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// A child scope that is torn down with its parent but can also be
    /// cancelled on its own.
    pub fn child(&self) -> Scope {
        let child = Scope::new();
        if self.is_cancelled() {
            child.cancel();
            return child;
        }
        let parent = self.clone();
        let handle = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => handle.cancel(),
                _ = handle.cancelled() => {}
            }
        });
        child
    }
}
