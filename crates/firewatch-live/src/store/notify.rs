//! Notifier — how the store tells interested parties that something changed.
//!
//! UI layers adapt [`LiveStateStore::watch`] to their own reactivity model;
//! this crate only guarantees "a callback fires after every mutation".
//!
//! Emission snapshots the watcher list under the lock and invokes callbacks
//! with the lock released, so a callback may freely register or drop watchers:
//! a watcher dropped during an emission is still called in that round, and a
//! watcher added during an emission is first called on the next one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::realtime::SubscriptionStatus;
use crate::store::apply::ApplyOutcome;
use crate::types::Collection;

// ============================================================================
// StoreEvent
// ============================================================================

/// What just happened to the live state — the hooks a dashboard needs for
/// re-rendering and one-shot toasts.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A change event mutated (or was skipped by) a collection.
    Changed {
        collection: Collection,
        outcome: ApplyOutcome,
        id: Option<String>,
    },
    /// A collection was wholesale-replaced by a refresh.
    Replaced {
        collection: Collection,
        count: usize,
    },
    /// The aggregate realtime connectivity flipped.
    ConnectionChanged { connected: bool },
    /// A collection's subscription gave up for the session. Fired once per
    /// collection; UIs show it as a persistent warning.
    RealtimeDegraded { status: SubscriptionStatus },
    /// A refresh cycle finished; `failed` lists collections whose fetch
    /// errored (their previous contents were kept).
    RefreshFinished {
        refreshed: Vec<Collection>,
        failed: Vec<Collection>,
    },
}

// ============================================================================
// Notifier / WatchGuard
// ============================================================================

type WatcherFn = dyn Fn(&StoreEvent) + Send + Sync;

#[derive(Default)]
struct Registry {
    watchers: HashMap<u64, Arc<WatcherFn>>,
}

/// Typed fan-out with RAII unsubscription.
pub struct Notifier {
    registry: Arc<Mutex<Registry>>,
    next_id: AtomicU64,
}

/// Keeps one watcher registered; dropping it unregisters.
#[must_use = "the watcher is removed as soon as the guard is dropped"]
pub struct WatchGuard {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `callback` for every future emission.
    pub fn watch(&self, callback: impl Fn(&StoreEvent) + Send + Sync + 'static) -> WatchGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.lock().watchers.insert(id, Arc::new(callback));
        WatchGuard {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `event` to every currently registered watcher.
    pub fn emit(&self, event: &StoreEvent) {
        let snapshot: Vec<Arc<WatcherFn>> = {
            let registry = self.registry.lock();
            registry.watchers.values().cloned().collect()
        };
        for watcher in snapshot {
            watcher(event);
        }
    }

    /// Number of registered watchers.
    pub fn watcher_count(&self) -> usize {
        self.registry.lock().watchers.len()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().watchers.remove(&self.id);
        }
    }
}
