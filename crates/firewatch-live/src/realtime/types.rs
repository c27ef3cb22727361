//! Realtime-specific types: the transport trait, channel/connection states,
//! the retry policy, and the status snapshots handed to subscription owners.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::{ChangeAction, ChangeEvent, Collection};

// ============================================================================
// Channel / connection states
// ============================================================================

/// Statuses the transport reports through its subscribe callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    TimedOut,
    ChannelError,
    Closed,
}

/// The subscription's own lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// An attempt is in flight (initial or retry).
    Connecting,
    /// The channel is live and delivering events.
    Subscribed,
    /// The last attempt failed with a channel error.
    Error,
    /// The last attempt timed out.
    TimedOut,
    /// The channel was closed — intentional teardown, or terminal after
    /// retries were exhausted.
    Closed,
}

// ============================================================================
// Channel binding
// ============================================================================

/// Server-side event-type filter for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventFilter {
    /// Deliver inserts, updates, and deletes.
    #[default]
    All,
    /// Deliver only one action kind.
    Only(ChangeAction),
}

/// Describes one channel binding: which collection, which events, and an
/// optional server-side row filter (e.g. `"zone_id=eq.7"`).
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub collection: Collection,
    pub events: EventFilter,
    pub row_filter: Option<String>,
}

impl ChannelSpec {
    /// A spec watching every change to `collection`.
    pub fn all(collection: Collection) -> Self {
        Self {
            collection,
            events: EventFilter::All,
            row_filter: None,
        }
    }
}

// ============================================================================
// Transport seam
// ============================================================================

/// Callback invoked with each change delivered on a channel.
pub type ChangeCallback = dyn Fn(ChangeEvent) + Send + Sync;

/// Callback invoked with each transport status transition on a channel.
pub type ChannelStatusCallback = dyn Fn(ChannelStatus) + Send + Sync;

/// A live transport-level channel. Closing is idempotent.
pub trait ChannelHandle: Send + Sync {
    fn close(&self);
    fn is_closed(&self) -> bool;
}

/// The change-stream primitive this crate wraps.
///
/// `subscribe` must not fail: every outcome — including an immediately dead
/// channel — is reported through `on_status`. Callers therefore never need a
/// fallible path around subscription setup.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn subscribe(
        &self,
        spec: ChannelSpec,
        on_event: Arc<ChangeCallback>,
        on_status: Arc<ChannelStatusCallback>,
    ) -> Box<dyn ChannelHandle>;
}

// ============================================================================
// Retry policy
// ============================================================================

/// Exponential backoff with a ceiling. Defaults match the dashboard's
/// production tuning: 3 retries at 5s, 10s, 20s.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following failure number `retry_count`
    /// (0-based): `min(initial * 2^retry_count, max)`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let doubled = self
            .initial_delay
            .checked_mul(1u32.checked_shl(retry_count).unwrap_or(u32::MAX))
            .unwrap_or(self.max_delay);
        doubled.min(self.max_delay)
    }
}

// ============================================================================
// Status snapshot
// ============================================================================

/// Point-in-time view of one subscription, pushed to the owner on every
/// state change and available on demand for diagnostics.
#[derive(Debug, Clone)]
pub struct SubscriptionStatus {
    pub collection: Collection,
    pub state: ConnectionState,
    pub connected: bool,
    pub error: Option<String>,
    pub retry_count: u32,
    /// True once the retry budget is spent; cleared only by a new session.
    pub exhausted: bool,
}

/// Callback invoked by a subscription whenever its status changes.
pub type StatusCallback = dyn Fn(&SubscriptionStatus) + Send + Sync;

// ============================================================================
// Tests
// ============================================================================
