//! Cancellable lifetime scopes.
//!
//! A [`Scope`] bounds how long a registered handler stays active. Clones share the
//! same cancellation state; cancelling any clone cancels all of them.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Scope {
    tx: Arc<watch::Sender<bool>>,
}

impl Scope {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancel the scope. Repeat calls are no-ops.
    pub fn cancel(&self) {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        });
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the scope is cancelled.
    ///
    /// Pending forever while any clone of the scope is alive and uncancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // Sender is owned by self, so wait_for can only return once cancelled.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// A detached receiver for watchers that must not keep the scope alive.
    pub(crate) fn subscribe(&self) -> ScopeWatch {
        ScopeWatch {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of a [`Scope`], held by registry watchers.
#[derive(Debug)]
pub(crate) struct ScopeWatch {
    rx: watch::Receiver<bool>,
}

impl ScopeWatch {
    /// `true` once the scope is cancelled; `false` if every `Scope` clone was
    /// dropped without cancelling.
    pub(crate) async fn cancelled(mut self) -> bool {
        let fired = self.rx.wait_for(|cancelled| *cancelled).await.is_ok();
        fired
    }
}
