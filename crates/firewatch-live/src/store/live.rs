//! LiveStateStore — the session's in-memory view of the watched collections.
//!
//! Collections are held as `Arc<Vec<T>>` behind `parking_lot::Mutex`es and
//! replaced wholesale on every mutation (copy-on-write), so a reader holding
//! a snapshot never observes a half-applied update. Locks are released
//! before watchers are notified.
//!
//! Write-through helpers send the mutation to the remote store and leave
//! local state untouched — the resulting change event (or a refresh) is what
//! converges the collection. While the stream is down, written state lags
//! visibly; that is accepted behavior.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{Result, StoreError};
use crate::remote::RemoteStore;
use crate::store::apply::{apply_event, sort_canonical, ApplyOutcome};
use crate::store::notify::{Notifier, StoreEvent, WatchGuard};
use crate::types::{ChangeEvent, Collection, FireZone, LiveRecord, SecurityPoint, TeamMember};

// ============================================================================
// InitialSnapshot
// ============================================================================

/// Server-fetched contents the store is seeded with, once, at session start.
/// Whatever fetched it (a pre-render step, usually) is out of scope here.
#[derive(Debug, Clone, Default)]
pub struct InitialSnapshot {
    pub fire_zones: Vec<FireZone>,
    pub security_points: Vec<SecurityPoint>,
    pub team_members: Vec<TeamMember>,
}

// ============================================================================
// LiveStateStore
// ============================================================================

pub struct LiveStateStore {
    remote: Arc<dyn RemoteStore>,
    fire_zones: Mutex<Arc<Vec<FireZone>>>,
    security_points: Mutex<Arc<Vec<SecurityPoint>>>,
    team_members: Mutex<Arc<Vec<TeamMember>>>,
    last_updated: Mutex<Option<DateTime<Utc>>>,
    notifier: Notifier,
}

impl LiveStateStore {
    pub fn new(remote: Arc<dyn RemoteStore>, snapshot: InitialSnapshot) -> Self {
        let mut team_members = snapshot.team_members;
        sort_canonical(&mut team_members);

        Self {
            remote,
            fire_zones: Mutex::new(Arc::new(snapshot.fire_zones)),
            security_points: Mutex::new(Arc::new(snapshot.security_points)),
            team_members: Mutex::new(Arc::new(team_members)),
            last_updated: Mutex::new(None),
            notifier: Notifier::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn fire_zones(&self) -> Arc<Vec<FireZone>> {
        Arc::clone(&self.fire_zones.lock())
    }

    pub fn security_points(&self) -> Arc<Vec<SecurityPoint>> {
        Arc::clone(&self.security_points.lock())
    }

    pub fn team_members(&self) -> Arc<Vec<TeamMember>> {
        Arc::clone(&self.team_members.lock())
    }

    /// When any collection last changed (event, replacement); `None` until
    /// the first mutation.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self.last_updated.lock()
    }

    /// Register a watcher for store events. Dropping the guard unregisters.
    pub fn watch(&self, callback: impl Fn(&StoreEvent) + Send + Sync + 'static) -> WatchGuard {
        self.notifier.watch(callback)
    }

    /// Emit an event to the store's watchers. Used by the owning session to
    /// fan connectivity/refresh outcomes through the same channel as data
    /// changes.
    pub(crate) fn emit(&self, event: &StoreEvent) {
        self.notifier.emit(event);
    }

    // -----------------------------------------------------------------------
    // Mutation from the change stream
    // -----------------------------------------------------------------------

    /// Apply one delivered change event to the matching collection.
    pub fn apply_change(&self, collection: Collection, event: &ChangeEvent) -> ApplyOutcome {
        let outcome = match collection {
            Collection::FireZones => apply_to(&self.fire_zones, event),
            Collection::SecurityPoints => apply_to(&self.security_points, event),
            Collection::TeamMembers => apply_to(&self.team_members, event),
        };

        if outcome != ApplyOutcome::Skipped {
            self.touch();
        }
        self.notifier.emit(&StoreEvent::Changed {
            collection,
            outcome,
            id: event.record_id().map(str::to_owned),
        });
        outcome
    }

    // -----------------------------------------------------------------------
    // Wholesale replacement (refresh path)
    // -----------------------------------------------------------------------

    /// Replace a collection with freshly fetched rows, discarding whatever
    /// the stream had accumulated. Rows that fail to decode are skipped with
    /// a warning; the valid remainder still lands.
    pub fn replace_all(&self, collection: Collection, rows: Vec<Value>) -> usize {
        let count = match collection {
            Collection::FireZones => replace_typed(&self.fire_zones, collection, rows),
            Collection::SecurityPoints => replace_typed(&self.security_points, collection, rows),
            Collection::TeamMembers => replace_typed(&self.team_members, collection, rows),
        };

        self.touch();
        self.notifier.emit(&StoreEvent::Replaced { collection, count });
        count
    }

    // -----------------------------------------------------------------------
    // Write-through helpers
    // -----------------------------------------------------------------------

    /// Update a team member's status on the remote store. Local state is not
    /// touched; the resulting change event converges it.
    pub async fn update_team_member_status(&self, id: &str, status: &str) -> Result<()> {
        let patch = json!({
            "status": status,
            "updated_at": Utc::now(),
        });
        self.write_through(id, patch).await
    }

    /// Update a team member's reported position and map visibility.
    pub async fn update_team_member_location(
        &self,
        id: &str,
        latitude: f64,
        longitude: f64,
        visible_on_map: bool,
    ) -> Result<()> {
        let patch = json!({
            "latitude": latitude,
            "longitude": longitude,
            "visible_on_map": visible_on_map,
            "updated_at": Utc::now(),
        });
        self.write_through(id, patch).await
    }

    async fn write_through(&self, id: &str, patch: Value) -> Result<()> {
        self.remote
            .update(Collection::TeamMembers.name(), id, patch)
            .await
            .map_err(|source| StoreError::Update {
                collection: Collection::TeamMembers,
                id: id.to_owned(),
                source,
            })?;
        Ok(())
    }

    fn touch(&self) {
        *self.last_updated.lock() = Some(Utc::now());
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn apply_to<T>(slot: &Mutex<Arc<Vec<T>>>, event: &ChangeEvent) -> ApplyOutcome
where
    T: LiveRecord + DeserializeOwned,
{
    let mut guard = slot.lock();
    let (next, outcome) = apply_event(&guard, event);
    if outcome != ApplyOutcome::Skipped {
        *guard = Arc::new(next);
    }
    outcome
}

fn replace_typed<T>(slot: &Mutex<Arc<Vec<T>>>, collection: Collection, rows: Vec<Value>) -> usize
where
    T: LiveRecord + DeserializeOwned,
{
    let mut decoded: Vec<T> = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        match serde_json::from_value::<T>(row) {
            Ok(record) => decoded.push(record),
            Err(e) => {
                tracing::warn!(
                    collection = %collection,
                    row = index,
                    error = %e,
                    "dropping refreshed row that failed to decode"
                );
            }
        }
    }
    sort_canonical(&mut decoded);

    let count = decoded.len();
    *slot.lock() = Arc::new(decoded);
    count
}
