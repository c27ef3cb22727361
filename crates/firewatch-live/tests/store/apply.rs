//! Tests for the pure change-event application: dedupe, in-place update,
//! delete tolerance, and canonical ordering.

use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::json;

use firewatch_live::store::apply::{apply_event, sort_canonical, ApplyOutcome};
use firewatch_live::types::{ChangeAction, ChangeEvent, FireZone, LiveRecord, TeamMember};

// ============================================================================
// Fixtures
// ============================================================================

fn zone(id: &str, status: &str) -> FireZone {
    serde_json::from_value(zone_json(id, status)).unwrap()
}

fn zone_json(id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("Zone {id}"),
        "status": status,
        "severity": "High",
        "latitude": -31.95,
        "longitude": 115.86,
        "description": null,
        "created_at": Utc::now(),
        "updated_at": Utc::now(),
    })
}

fn member(id: &str, name: &str) -> TeamMember {
    serde_json::from_value(member_json(id, name)).unwrap()
}

fn member_json(id: &str, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "role": "Ranger",
        "status": "Available",
        "latitude": null,
        "longitude": null,
        "visible_on_map": false,
        "created_at": Utc::now(),
        "updated_at": Utc::now(),
    })
}

fn insert(record: serde_json::Value) -> ChangeEvent {
    ChangeEvent {
        action: ChangeAction::Insert,
        new_record: Some(record),
        old_record: None,
    }
}

fn update(record: serde_json::Value) -> ChangeEvent {
    ChangeEvent {
        action: ChangeAction::Update,
        new_record: Some(record),
        old_record: None,
    }
}

fn delete(id: &str) -> ChangeEvent {
    ChangeEvent {
        action: ChangeAction::Delete,
        new_record: None,
        old_record: Some(json!({ "id": id })),
    }
}

fn ids<T: LiveRecord>(rows: &[T]) -> Vec<String> {
    rows.iter().map(|r| r.id().to_owned()).collect()
}

// ============================================================================
// Insert
// ============================================================================

#[test]
fn insert_prepends_for_most_recent_first_collections() {
    let current = vec![zone("z-1", "Active")];

    let (next, outcome) = apply_event(&current, &insert(zone_json("z-2", "Active")));

    assert_eq!(outcome, ApplyOutcome::Inserted);
    assert_eq!(ids(&next), vec!["z-2", "z-1"]);
}

#[test]
fn duplicate_insert_is_idempotent() {
    let current = vec![zone("z-1", "Active")];
    let event = insert(zone_json("z-1", "Contained"));

    let (once, outcome) = apply_event(&current, &event);
    assert_eq!(outcome, ApplyOutcome::Skipped);

    let (twice, outcome) = apply_event(&once, &event);
    assert_eq!(outcome, ApplyOutcome::Skipped);
    assert_eq!(once, twice);
    assert_eq!(once, current);
    // The duplicate's differing payload must not leak in either.
    assert_eq!(once[0].status, "Active");
}

#[test]
fn insert_lands_in_name_order_for_team_members() {
    let current = vec![member("m-1", "Avery"), member("m-3", "Morgan")];

    let (next, outcome) = apply_event(&current, &insert(member_json("m-2", "Jules")));

    assert_eq!(outcome, ApplyOutcome::Inserted);
    let names: Vec<&str> = next.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Avery", "Jules", "Morgan"]);
}

// ============================================================================
// Update
// ============================================================================

#[test]
fn update_replaces_exactly_one_record_in_place() {
    let current = vec![
        zone("z-1", "Active"),
        zone("z-2", "Active"),
        zone("z-3", "Active"),
    ];

    let (next, outcome) = apply_event(&current, &update(zone_json("z-2", "Contained")));

    assert_eq!(outcome, ApplyOutcome::Updated);
    assert_eq!(next.len(), current.len());
    assert_eq!(ids(&next), ids(&current), "position must be preserved");
    assert_eq!(next[1].status, "Contained");
    assert_eq!(next[0].status, "Active");
    assert_eq!(next[2].status, "Active");
}

#[test]
fn update_for_an_unknown_id_is_skipped() {
    let current = vec![zone("z-1", "Active")];

    let (next, outcome) = apply_event(&current, &update(zone_json("z-9", "Contained")));

    assert_eq!(outcome, ApplyOutcome::Skipped);
    assert_eq!(next, current);
}

#[test]
fn renaming_a_team_member_moves_them_to_their_new_slot() {
    let current = vec![
        member("m-1", "Avery"),
        member("m-2", "Jules"),
        member("m-3", "Morgan"),
    ];

    let (next, outcome) = apply_event(&current, &update(member_json("m-1", "Zoe")));

    assert_eq!(outcome, ApplyOutcome::Updated);
    let names: Vec<&str> = next.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Jules", "Morgan", "Zoe"]);
}

// ============================================================================
// Delete
// ============================================================================

#[test]
fn delete_removes_the_matching_record() {
    let current = vec![zone("z-1", "Active"), zone("z-2", "Active")];

    let (next, outcome) = apply_event(&current, &delete("z-1"));

    assert_eq!(outcome, ApplyOutcome::Removed);
    assert_eq!(ids(&next), vec!["z-2"]);
}

#[test]
fn delete_of_an_absent_id_is_a_no_op() {
    let current = vec![zone("z-1", "Active")];

    let (next, outcome) = apply_event(&current, &delete("z-404"));

    assert_eq!(outcome, ApplyOutcome::Skipped);
    assert_eq!(next, current);
}

// ============================================================================
// Malformed events
// ============================================================================

#[test]
fn an_event_without_a_record_id_is_skipped() {
    let current = vec![zone("z-1", "Active")];
    let event = ChangeEvent {
        action: ChangeAction::Insert,
        new_record: Some(json!({ "status": "Active" })),
        old_record: None,
    };

    let (next, outcome) = apply_event(&current, &event);

    assert_eq!(outcome, ApplyOutcome::Skipped);
    assert_eq!(next, current);
}

#[test]
fn an_undecodable_payload_is_skipped() {
    let current = vec![zone("z-1", "Active")];
    // Has an id but is missing every other required field.
    let event = insert(json!({ "id": "z-2" }));

    let (next, outcome) = apply_event::<FireZone>(&current, &event);

    assert_eq!(outcome, ApplyOutcome::Skipped);
    assert_eq!(next, current);
}

// ============================================================================
// Canonical sort
// ============================================================================

#[test]
fn sort_canonical_orders_members_and_leaves_zones_alone() {
    let mut members = vec![member("m-2", "Morgan"), member("m-1", "Avery")];
    sort_canonical(&mut members);
    assert_eq!(members[0].name, "Avery");

    let mut zones = vec![zone("z-2", "Active"), zone("z-1", "Active")];
    sort_canonical(&mut zones);
    assert_eq!(ids(&zones), vec!["z-2", "z-1"]);
}
