//! SubscriptionRegistry — owns one [`ChangeSubscription`] per watched
//! collection and folds their connectivity into a single aggregate signal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::realtime::subscription::ChangeSubscription;
use crate::realtime::types::{
    ChangeCallback, ChannelSpec, RealtimeTransport, RetryPolicy, StatusCallback,
    SubscriptionStatus,
};
use crate::types::{ChangeEvent, Collection};

// ============================================================================
// Callbacks and options
// ============================================================================

/// Invoked with every change event, tagged with its collection.
pub type RegistryEventCallback = dyn Fn(Collection, ChangeEvent) + Send + Sync;

/// Invoked after any per-collection status change.
pub type RegistryUpdateCallback = dyn Fn(&RegistryUpdate) + Send + Sync;

/// One status change plus the aggregate view after applying it.
#[derive(Debug, Clone)]
pub struct RegistryUpdate {
    /// The per-collection status that just changed.
    pub status: SubscriptionStatus,
    /// Logical AND of all watched collections' connectivity.
    pub all_connected: bool,
    /// True exactly once per collection: the transition into terminal
    /// (retries-exhausted) state. Owners surface this as a persistent
    /// "realtime degraded" warning.
    pub newly_exhausted: bool,
}

pub struct RegistryOptions {
    pub transport: Arc<dyn RealtimeTransport>,
    pub policy: RetryPolicy,
    pub on_event: Arc<RegistryEventCallback>,
    pub on_update: Arc<RegistryUpdateCallback>,
}

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Aggregation state shared into subscription callbacks. Kept separate from
/// the registry itself so the callbacks do not keep the registry alive.
struct Shared {
    statuses: Mutex<HashMap<Collection, SubscriptionStatus>>,
    /// Collections whose terminal warning has already been emitted.
    warned: Mutex<HashSet<Collection>>,
    on_update: Arc<RegistryUpdateCallback>,
}

impl Shared {
    fn handle_status(&self, status: &SubscriptionStatus) {
        let all_connected = {
            let mut statuses = self.statuses.lock();
            statuses.insert(status.collection, status.clone());
            Collection::ALL
                .iter()
                .all(|c| statuses.get(c).is_some_and(|s| s.connected))
        };

        // One warning per collection for the whole session, not one per
        // failed retry.
        let newly_exhausted = status.exhausted && self.warned.lock().insert(status.collection);
        if newly_exhausted {
            tracing::warn!(
                collection = %status.collection,
                error = status.error.as_deref().unwrap_or("unknown"),
                "realtime updates degraded: retries exhausted, collection will not reconnect this session"
            );
        }

        (self.on_update)(&RegistryUpdate {
            status: status.clone(),
            all_connected,
            newly_exhausted,
        });
    }
}

pub struct SubscriptionRegistry {
    subscriptions: HashMap<Collection, Arc<ChangeSubscription>>,
    shared: Arc<Shared>,
}

impl SubscriptionRegistry {
    /// Open one subscription per watched collection and start them all.
    pub async fn start(options: RegistryOptions) -> Self {
        let shared = Arc::new(Shared {
            statuses: Mutex::new(HashMap::new()),
            warned: Mutex::new(HashSet::new()),
            on_update: options.on_update,
        });

        let mut subscriptions = HashMap::new();
        for collection in Collection::ALL {
            let on_status: Arc<StatusCallback> = {
                let shared = Arc::clone(&shared);
                Arc::new(move |status| shared.handle_status(status))
            };
            let on_event: Arc<ChangeCallback> = {
                let forward = Arc::clone(&options.on_event);
                Arc::new(move |event| forward(collection, event))
            };

            let subscription = ChangeSubscription::new(
                ChannelSpec::all(collection),
                Arc::clone(&options.transport),
                options.policy,
                on_event,
                on_status,
            );
            subscription.start().await;
            subscriptions.insert(collection, subscription);
        }

        Self {
            subscriptions,
            shared,
        }
    }

    /// Aggregate connectivity: true only when every watched collection's
    /// channel is live.
    pub fn is_connected(&self) -> bool {
        let statuses = self.shared.statuses.lock();
        Collection::ALL
            .iter()
            .all(|c| statuses.get(c).is_some_and(|s| s.connected))
    }

    /// Diagnostics for one collection, or `None` if it is not watched.
    pub fn status(&self, collection: Collection) -> Option<SubscriptionStatus> {
        self.subscriptions.get(&collection).map(|s| s.status())
    }

    /// Tear down every subscription: cancel pending retries, close channels.
    pub fn dispose(&self) {
        for subscription in self.subscriptions.values() {
            subscription.dispose();
        }
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        self.dispose();
    }
}
