use thiserror::Error;

use crate::types::Collection;

// ---------------------------------------------------------------------------
// RequestErrorKind / RequestError
// ---------------------------------------------------------------------------

/// Classification of remote-store request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestErrorKind {
    /// Retriable (network, temporary failures)
    Transient,
    /// Not retriable (bad request, constraint violation, etc.)
    Permanent,
    /// Authentication failed
    Auth,
    /// Rate limit or quota exceeded
    Capacity,
}

/// A failed call against the remote store (fetch or update).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RequestError {
    pub message: String,
    pub kind: RequestErrorKind,
}

impl RequestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: RequestErrorKind::Transient,
        }
    }

    pub fn with_kind(message: impl Into<String>, kind: RequestErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// RealtimeError
// ---------------------------------------------------------------------------

/// Failures on the change-stream path. These are reported through status
/// callbacks, never thrown across the subscribe boundary.
#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    #[error("Realtime channel for \"{collection}\" timed out")]
    Timeout { collection: Collection },

    #[error("Realtime channel for \"{collection}\" failed")]
    Channel { collection: Collection },

    #[error(
        "Realtime subscription for \"{collection}\" gave up after {retries} retries: {last_error}"
    )]
    RetriesExhausted {
        collection: Collection,
        retries: u32,
        last_error: String,
    },
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Update of {collection}/{id} failed: {source}")]
    Update {
        collection: Collection,
        id: String,
        #[source]
        source: RequestError,
    },
}

// ---------------------------------------------------------------------------
// LiveError — top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LiveError {
    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Convenience alias — the default error type is `LiveError`.
pub type Result<T, E = LiveError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
