//! Live state — the in-memory collections, how change events mutate them,
//! and the refresh path that rebuilds them from source.
//!
//! # Modules
//!
//! - [`apply`] — pure, copy-on-write application of one change event.
//! - [`notify`] — [`Notifier`]/[`WatchGuard`] fan-out and [`StoreEvent`].
//! - [`live`] — [`LiveStateStore`], the session's collections plus
//!   write-through mutation helpers.
//! - [`refresh`] — [`RefreshController`], manual and periodic full resync.

pub mod apply;
pub mod live;
pub mod notify;
pub mod refresh;

pub use apply::ApplyOutcome;
pub use live::{InitialSnapshot, LiveStateStore};
pub use notify::{Notifier, StoreEvent, WatchGuard};
pub use refresh::{RefreshController, RefreshReport};
