//! LiveSession — the one object a dashboard session constructs and talks to.
//!
//! Built explicitly per session (no globals): created once at session start
//! with the transport, the remote store, and a server-fetched snapshot; torn
//! down with [`LiveSession::shutdown`]. Terminal subscription failures stay
//! terminal for the session's lifetime — starting a fresh session is what
//! resets the retry counters.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::realtime::registry::{RegistryEventCallback, RegistryUpdateCallback};
use crate::realtime::{
    RealtimeTransport, RegistryOptions, RetryPolicy, SubscriptionRegistry, SubscriptionStatus,
};
use crate::remote::RemoteStore;
use crate::store::{
    InitialSnapshot, LiveStateStore, RefreshController, RefreshReport, StoreEvent, WatchGuard,
};
use crate::types::{Collection, FireZone, SecurityPoint, TeamMember};

// ============================================================================
// SessionOptions
// ============================================================================

pub struct SessionOptions {
    pub transport: Arc<dyn RealtimeTransport>,
    pub remote: Arc<dyn RemoteStore>,
    pub snapshot: InitialSnapshot,
    /// Reconnect tuning (default: 3 retries at 5s/10s/20s, 30s ceiling).
    pub retry: RetryPolicy,
    /// When set, a full resync runs on this period in addition to the
    /// on-demand [`LiveSession::refresh_data`].
    pub refresh_interval: Option<Duration>,
}

// ============================================================================
// LiveSession
// ============================================================================

pub struct LiveSession {
    store: Arc<LiveStateStore>,
    registry: SubscriptionRegistry,
    refresh: Arc<RefreshController>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl LiveSession {
    /// Wire the store, the three subscriptions, and the refresh controller,
    /// and open the channels.
    pub async fn start(options: SessionOptions) -> Arc<Self> {
        let store = Arc::new(LiveStateStore::new(
            Arc::clone(&options.remote),
            options.snapshot,
        ));
        let refresh = RefreshController::new(Arc::clone(&store), Arc::clone(&options.remote));
        let last_error = Arc::new(Mutex::new(None));

        // Delivered changes flow straight into the store; the store handles
        // dedupe and ordering, the subscription does not.
        let on_event: Arc<RegistryEventCallback> = {
            let store = Arc::clone(&store);
            Arc::new(move |collection, event| {
                store.apply_change(collection, &event);
            })
        };

        // Connectivity flips and terminal failures surface through the same
        // watcher channel as data changes, so UIs subscribe once.
        let on_update: Arc<RegistryUpdateCallback> = {
            let store = Arc::clone(&store);
            let last_error = Arc::clone(&last_error);
            let connected = Mutex::new(false);
            Arc::new(move |update| {
                if update.newly_exhausted {
                    if let Some(error) = &update.status.error {
                        *last_error.lock() = Some(error.clone());
                    }
                    store.emit(&StoreEvent::RealtimeDegraded {
                        status: update.status.clone(),
                    });
                }
                let flipped = {
                    let mut current = connected.lock();
                    if *current != update.all_connected {
                        *current = update.all_connected;
                        true
                    } else {
                        false
                    }
                };
                if flipped {
                    store.emit(&StoreEvent::ConnectionChanged {
                        connected: update.all_connected,
                    });
                }
            })
        };

        let registry = SubscriptionRegistry::start(RegistryOptions {
            transport: options.transport,
            policy: options.retry,
            on_event,
            on_update,
        })
        .await;

        let session = Arc::new(Self {
            store,
            registry,
            refresh,
            last_error,
        });
        if let Some(period) = options.refresh_interval {
            session.refresh.start_interval(period);
        }
        tracing::debug!("live session started");
        session
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn fire_zones(&self) -> Arc<Vec<FireZone>> {
        self.store.fire_zones()
    }

    pub fn security_points(&self) -> Arc<Vec<SecurityPoint>> {
        self.store.security_points()
    }

    pub fn team_members(&self) -> Arc<Vec<TeamMember>> {
        self.store.team_members()
    }

    /// True only while every watched collection's channel is live.
    pub fn is_connected(&self) -> bool {
        self.registry.is_connected()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.store.last_updated()
    }

    /// The most recent terminal or refresh error, for a persistent banner.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Per-collection diagnostics; `None` for unwatched collections.
    pub fn subscription_status(&self, collection: Collection) -> Option<SubscriptionStatus> {
        self.registry.status(collection)
    }

    /// Register a watcher for data changes, connectivity flips, degraded
    /// warnings, and refresh outcomes.
    pub fn watch(&self, callback: impl Fn(&StoreEvent) + Send + Sync + 'static) -> WatchGuard {
        self.store.watch(callback)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Discard stream-accumulated state and reload every collection from
    /// source. Partial failure replaces what it can and reports the rest.
    pub async fn refresh_data(&self) -> RefreshReport {
        let report = self.refresh.refresh().await;
        if let Some((collection, error)) = report.errors.first() {
            *self.last_error.lock() = Some(format!("refresh of {collection} failed: {error}"));
        }
        report
    }

    /// Write-through status update; converges via the change stream.
    pub async fn update_team_member_status(
        &self,
        id: &str,
        status: &str,
    ) -> crate::error::Result<()> {
        self.store.update_team_member_status(id, status).await
    }

    /// Write-through location update; converges via the change stream.
    pub async fn update_team_member_location(
        &self,
        id: &str,
        latitude: f64,
        longitude: f64,
        visible_on_map: bool,
    ) -> crate::error::Result<()> {
        self.store
            .update_team_member_location(id, latitude, longitude, visible_on_map)
            .await
    }

    /// Tear down subscriptions and the periodic resync. Idempotent.
    pub fn shutdown(&self) {
        self.registry.dispose();
        self.refresh.stop_interval();
        tracing::debug!("live session shut down");
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        // Registry teardown happens in its own Drop; the interval task must
        // be stopped here or it would keep the controller alive forever.
        self.refresh.stop_interval();
    }
}
