//! # Handler Registry
//!
//! Ordered, concurrency-safe collection of named shared handlers.
//!
//! ## Overview
//!
//! Each registration is bound to a [`Scope`]. When the scope is cancelled a watcher
//! task removes exactly that registration, matching on its id rather than its
//! position so concurrent inserts and removals cannot remove the wrong entry.
//!
//! ## Key Features
//!
//! - **Registration order is dispatch order** for every snapshot
//! - **Ids are never reused**, so removal is exact and at-most-once
//! - **Snapshots are point-in-time copies**; the lock is never held while handlers run
//! - **Watchers are tracked** in a subscription table and aborted on
//!   [`HandlerRegistry::shutdown`] or when the last registry handle is dropped

use crate::dispatch::SharedControllerHandler;
use crate::logging::log_registry_operation;
use crate::object::Object;
use crate::scope::{Scope, ScopeWatch};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::warn;

/// Registration id. Monotonically increasing, starting at 1.
pub type HandlerId = u64;

/// A registered handler.
pub struct HandlerEntry<O: Object> {
    pub id: HandlerId,
    pub name: String,
    pub handler: Arc<dyn SharedControllerHandler<O>>,
}

impl<O: Object> Clone for HandlerEntry<O> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<O: Object> std::fmt::Debug for HandlerEntry<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("handler", &"<Arc<dyn SharedControllerHandler>>")
            .finish()
    }
}

struct RegistryInner<O: Object> {
    resource: String,
    id_counter: AtomicU64,
    handlers: RwLock<Vec<HandlerEntry<O>>>,
    watchers: DashMap<HandlerId, JoinHandle<()>>,
}

impl<O: Object> RegistryInner<O> {
    fn remove(&self, id: HandlerId) -> Option<HandlerEntry<O>> {
        let mut handlers = self.handlers.write();
        let index = handlers.iter().position(|entry| entry.id == id)?;
        Some(handlers.remove(index))
    }
}

impl<O: Object> Drop for RegistryInner<O> {
    fn drop(&mut self) {
        for watcher in self.watchers.iter() {
            watcher.value().abort();
        }
    }
}

/// Registry of shared handlers. Cloning yields another handle to the same registry.
pub struct HandlerRegistry<O: Object> {
    inner: Arc<RegistryInner<O>>,
}

impl<O: Object> Clone for HandlerRegistry<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: Object> HandlerRegistry<O> {
    pub fn new() -> Self {
        Self::for_resource("")
    }

    /// Registry whose log lines are tagged with `resource`.
    pub fn for_resource(resource: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                resource: resource.into(),
                id_counter: AtomicU64::new(0),
                handlers: RwLock::new(Vec::new()),
                watchers: DashMap::new(),
            }),
        }
    }

    /// Append `handler` under `name`, active until `scope` is cancelled.
    ///
    /// Removal on cancellation needs a Tokio runtime. Outside one the handler stays
    /// registered until [`HandlerRegistry::shutdown`].
    pub fn register<H>(&self, scope: &Scope, name: impl Into<String>, handler: H) -> HandlerId
    where
        H: SharedControllerHandler<O> + 'static,
    {
        let name = name.into();
        let id = {
            let mut handlers = self.inner.handlers.write();
            let id = self.inner.id_counter.fetch_add(1, Ordering::Relaxed) + 1;
            handlers.push(HandlerEntry {
                id,
                name: name.clone(),
                handler: Arc::new(handler),
            });
            id
        };

        log_registry_operation(
            "register",
            &self.inner.resource,
            Some(id),
            Some(&name),
            "registered",
        );

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => self.watch_scope(&runtime, id, scope.subscribe()),
            Err(_) => warn!(
                handler_id = id,
                handler = %name,
                "No Tokio runtime; handler will not be removed on scope cancellation"
            ),
        }

        id
    }

    fn watch_scope(&self, runtime: &tokio::runtime::Handle, id: HandlerId, watch: ScopeWatch) {
        let registry: Weak<RegistryInner<O>> = Arc::downgrade(&self.inner);

        // The entry guard is held across spawn so the watcher's own cleanup
        // always finds its table entry.
        let slot = self.inner.watchers.entry(id);
        let watcher = runtime.spawn(async move {
            let cancelled = watch.cancelled().await;
            let Some(inner) = registry.upgrade() else {
                return;
            };
            if cancelled {
                if let Some(entry) = inner.remove(id) {
                    log_registry_operation(
                        "remove",
                        &inner.resource,
                        Some(id),
                        Some(&entry.name),
                        "scope_cancelled",
                    );
                }
            }
            inner.watchers.remove(&id);
        });
        slot.insert(watcher);
    }

    /// Point-in-time copy of the registered handlers, in registration order.
    pub fn snapshot(&self) -> Vec<HandlerEntry<O>> {
        self.inner.handlers.read().clone()
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.inner
            .handlers
            .read()
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.handlers.read().is_empty()
    }

    /// Number of scope watchers still waiting.
    pub fn pending_watchers(&self) -> usize {
        self.inner.watchers.len()
    }

    pub fn resource(&self) -> &str {
        &self.inner.resource
    }

    /// Last id handed out, 0 before the first registration.
    pub fn last_id(&self) -> HandlerId {
        self.inner.id_counter.load(Ordering::Relaxed)
    }

    /// Abort every scope watcher and drop all registrations. Idempotent.
    pub fn shutdown(&self) {
        self.inner.watchers.retain(|_, watcher| {
            watcher.abort();
            false
        });
        let removed = {
            let mut handlers = self.inner.handlers.write();
            std::mem::take(&mut *handlers).len()
        };
        log_registry_operation(
            "shutdown",
            &self.inner.resource,
            None,
            None,
            &format!("removed {removed}"),
        );
    }
}

impl<O: Object> Default for HandlerRegistry<O> {
    fn default() -> Self {
        Self::new()
    }
}
