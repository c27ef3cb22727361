//! Pure application of one [`ChangeEvent`] to an in-memory collection.
//!
//! Always copy-on-write: the input slice is never mutated, a fresh vector is
//! returned. Per-event problems (duplicate insert, missing target, payload
//! that fails to decode) degrade to [`ApplyOutcome::Skipped`] — a broken
//! event must never take the collection down.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::{ChangeAction, ChangeEvent, LiveRecord};

/// What applying an event actually did, for caller reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted,
    Updated,
    Removed,
    /// Nothing changed: duplicate insert, absent update/delete target, or a
    /// malformed event.
    Skipped,
}

/// Apply `event` to `current`, returning the next collection value.
///
/// - Insert: ignored if the id is already present (duplicate delivery after
///   a reconnect); otherwise prepended, or inserted in name order for
///   name-sorted types.
/// - Update: replaces the matching record, position unchanged; name-sorted
///   types are re-sorted after every update.
/// - Delete: removes the matching record; no-op if absent.
pub fn apply_event<T>(current: &[T], event: &ChangeEvent) -> (Vec<T>, ApplyOutcome)
where
    T: LiveRecord + DeserializeOwned,
{
    let Some(id) = event.record_id().map(str::to_owned) else {
        tracing::warn!(action = ?event.action, "skipping change event without a record id");
        return (current.to_vec(), ApplyOutcome::Skipped);
    };

    match event.action {
        ChangeAction::Insert => {
            if current.iter().any(|r| r.id() == id) {
                return (current.to_vec(), ApplyOutcome::Skipped);
            }
            let Some(record) = decode::<T>(event.new_record.as_ref(), &id) else {
                return (current.to_vec(), ApplyOutcome::Skipped);
            };
            let mut next = Vec::with_capacity(current.len() + 1);
            next.push(record);
            next.extend_from_slice(current);
            resort_if_named(&mut next);
            (next, ApplyOutcome::Inserted)
        }
        ChangeAction::Update => {
            let Some(index) = current.iter().position(|r| r.id() == id) else {
                tracing::debug!(id = %id, "update for a record not held locally, skipping");
                return (current.to_vec(), ApplyOutcome::Skipped);
            };
            let Some(record) = decode::<T>(event.new_record.as_ref(), &id) else {
                return (current.to_vec(), ApplyOutcome::Skipped);
            };
            let mut next = current.to_vec();
            next[index] = record;
            resort_if_named(&mut next);
            (next, ApplyOutcome::Updated)
        }
        ChangeAction::Delete => {
            let before = current.len();
            let next: Vec<T> = current.iter().filter(|r| r.id() != id).cloned().collect();
            if next.len() == before {
                (next, ApplyOutcome::Skipped)
            } else {
                (next, ApplyOutcome::Removed)
            }
        }
    }
}

/// Sort `rows` by name when the record type carries a sort name. Used on
/// seed and wholesale replacement so name-sorted collections always present
/// their canonical order.
pub fn sort_canonical<T: LiveRecord>(rows: &mut [T]) {
    resort_if_named(rows);
}

fn resort_if_named<T: LiveRecord>(rows: &mut [T]) {
    if rows.first().is_some_and(|r| r.sort_name().is_some()) {
        rows.sort_by(|a, b| a.sort_name().cmp(&b.sort_name()));
    }
}

fn decode<T: DeserializeOwned>(value: Option<&Value>, id: &str) -> Option<T> {
    let value = value?;
    match serde_json::from_value::<T>(value.clone()) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(id = %id, error = %e, "skipping change event whose payload failed to decode");
            None
        }
    }
}
