//! firewatch-live — realtime data layer for the Firewatch farm incident
//! dashboard.
//!
//! Keeps a session's view of fire zones, security points, and team members
//! live: a reconnect-with-backoff subscription per collection, an in-memory
//! store that change events and write-throughs converge on, and a manual/
//! periodic full-resync path for when the stream cannot be trusted.
//!
//! The hosted data service stays behind two traits — [`remote::RemoteStore`]
//! for CRUD and [`realtime::RealtimeTransport`] for the change stream — so
//! this crate carries no network code of its own.

pub mod error;
pub mod types;

pub mod realtime;
pub mod remote;
pub mod session;
pub mod store;

pub use error::{LiveError, RealtimeError, RequestError, RequestErrorKind, Result, StoreError};
pub use session::{LiveSession, SessionOptions};
pub use types::{ChangeAction, ChangeEvent, Collection};
