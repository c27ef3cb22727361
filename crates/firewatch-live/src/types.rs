//! Shared types: entity records, watched-collection names, and the change
//! events delivered by the realtime transport.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Collection
// ============================================================================

/// The three record sets kept live by subscriptions.
///
/// Other entities ([`Notification`], [`MapConfig`], [`LiveFeedSetting`]) are
/// plain CRUD rows fetched by wire name and are never subscribed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    FireZones,
    SecurityPoints,
    TeamMembers,
}

impl Collection {
    /// All watched collections, in registry order.
    pub const ALL: [Collection; 3] = [
        Collection::FireZones,
        Collection::SecurityPoints,
        Collection::TeamMembers,
    ];

    /// The wire name used by the remote store and the change stream.
    pub fn name(self) -> &'static str {
        match self {
            Collection::FireZones => "fire_zones",
            Collection::SecurityPoints => "security_points",
            Collection::TeamMembers => "team_members",
        }
    }

    /// Resolve a wire name back to a watched collection. Transport
    /// implementations use this when mapping channel topics to collections.
    pub fn from_name(name: &str) -> Option<Self> {
        Collection::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// ChangeEvent
// ============================================================================

/// What the server did to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

/// A committed row change pushed by the change stream.
///
/// Payloads stay as raw [`Value`]s at this level; the store deserializes them
/// into the typed entity for the affected collection. Insert/Update carry
/// `new_record` with an `id` field; Delete carries `old_record` with an `id`.
/// Ordering matches server commit order per collection, but events published
/// while a channel is down are lost — the refresh path exists to close that
/// gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub action: ChangeAction,
    pub new_record: Option<Value>,
    pub old_record: Option<Value>,
}

impl ChangeEvent {
    /// The id of the affected row, read from the record the action requires.
    ///
    /// Returns `None` for malformed events (missing record or non-string
    /// `id`); callers skip those rather than erroring.
    pub fn record_id(&self) -> Option<&str> {
        let record = match self.action {
            ChangeAction::Insert | ChangeAction::Update => self.new_record.as_ref(),
            ChangeAction::Delete => self.old_record.as_ref(),
        };
        record.and_then(|r| r.get("id")).and_then(Value::as_str)
    }
}

// ============================================================================
// LiveRecord
// ============================================================================

/// The surface the live store needs from an entity: identity for dedupe and,
/// optionally, a name to keep the collection sorted by.
pub trait LiveRecord: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    /// `Some` for collections whose canonical order is name-sorted
    /// (team members); `None` for most-recent-first collections.
    fn sort_name(&self) -> Option<&str> {
        None
    }
}

// ============================================================================
// Entity records
// ============================================================================

/// A monitored fire zone. `status`/`severity` are free-form strings —
/// validation is presentation policy, not this layer's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireZone {
    pub id: String,
    pub name: String,
    pub status: String,
    pub severity: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LiveRecord for FireZone {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A security checkpoint, camera, or sensor position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityPoint {
    pub id: String,
    pub name: String,
    pub point_type: String,
    pub status: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LiveRecord for SecurityPoint {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A field team member. Location fields are optional — members without a
/// reported position simply stay off the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    pub role: String,
    pub status: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub visible_on_map: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LiveRecord for TeamMember {
    fn id(&self) -> &str {
        &self.id
    }

    fn sort_name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

/// An alert/notification row (CRUD only, not subscribed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LiveRecord for Notification {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A saved map view (CRUD only, not subscribed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    pub id: String,
    pub name: String,
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub zoom: f64,
    pub layer: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LiveRecord for MapConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A configured live video/sensor feed (CRUD only, not subscribed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveFeedSetting {
    pub id: String,
    pub name: String,
    pub feed_url: String,
    #[serde(default)]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LiveRecord for LiveFeedSetting {
    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// Tests
// ============================================================================
