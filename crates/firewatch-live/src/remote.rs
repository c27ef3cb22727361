//! The persistence seam — everything this crate needs from the hosted
//! relational store, expressed as a trait so the whole data layer stays
//! out of scope.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::RequestError;

// ============================================================================
// RemoteStore — user-provided persistence layer
// ============================================================================

/// CRUD surface of the hosted store. Implementations wrap whatever client
/// the deployment uses; this crate only ever calls these two methods.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch every row of a collection, identified by wire name.
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Value>, RequestError>;

    /// Patch one row and return the updated row as stored.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> Result<Value, RequestError>;
}

// ============================================================================
// Typed fetch helper
// ============================================================================

/// Rows of `collection` decoded into `T`, plus per-row decode failures.
///
/// A row that fails to decode does not fail the batch — it is collected in
/// `failures` as `(row index, error message)` and the remaining rows still
/// land. Callers decide whether a non-empty failure list is worth surfacing.
#[derive(Debug)]
pub struct TypedRows<T> {
    pub rows: Vec<T>,
    pub failures: Vec<(usize, String)>,
}

/// Fetch a collection and decode each row into `T`, tolerating bad rows.
pub async fn fetch_all_as<T: DeserializeOwned>(
    remote: &dyn RemoteStore,
    collection: &str,
) -> Result<TypedRows<T>, RequestError> {
    let raw = remote.fetch_all(collection).await?;

    let mut rows = Vec::with_capacity(raw.len());
    let mut failures = Vec::new();
    for (index, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<T>(value) {
            Ok(row) => rows.push(row),
            Err(e) => {
                tracing::warn!(
                    collection,
                    row = index,
                    error = %e,
                    "skipping row that failed to decode"
                );
                failures.push((index, e.to_string()));
            }
        }
    }

    Ok(TypedRows { rows, failures })
}
