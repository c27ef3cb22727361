//! Realtime layer — per-collection change subscriptions with automatic
//! reconnect, and the registry that aggregates them.
//!
//! # Modules
//!
//! - [`types`] — transport seam ([`RealtimeTransport`], [`ChannelHandle`]),
//!   channel/connection states, [`RetryPolicy`], status snapshots.
//! - [`subscription`] — [`ChangeSubscription`], the reconnect-with-backoff
//!   state machine for one collection's change feed.
//! - [`registry`] — [`SubscriptionRegistry`], one subscription per watched
//!   collection folded into an aggregate connectivity signal.

pub mod registry;
pub mod subscription;
pub mod types;

pub use registry::{RegistryOptions, RegistryUpdate, SubscriptionRegistry};
pub use subscription::ChangeSubscription;
pub use types::{
    ChannelHandle, ChannelSpec, ChannelStatus, ConnectionState, EventFilter, RealtimeTransport,
    RetryPolicy, SubscriptionStatus,
};
