// ── Delta engine ──
//
// Pure comparison of two summary maps. Neither input is modified; the
// output order is: current-snapshot entities (added/status/position) in
// current order, then removals in previous order.

use std::sync::Arc;

use crate::model::{Delta, DeltaKind, EntitySummary, Position, SummaryMap};

/// Per-axis absolute tolerance below which two coordinates are equal.
pub const POSITION_TOLERANCE: f64 = 1e-3;

/// Rounding slack so a move of exactly the tolerance still counts
/// (`1.001 - 1.0` is slightly below `1e-3` in binary floating point).
const TOLERANCE_SLACK: f64 = 1e-9;

/// Compute the semantic changes from `previous` to `current`.
pub fn compute_world_deltas(previous: &SummaryMap, current: &SummaryMap) -> Vec<Delta> {
    let mut deltas = Vec::new();

    for (id, cur) in current {
        let Some(prev) = previous.get(id) else {
            let label = format!("{} appeared", cur.name);
            deltas.push(delta(cur, DeltaKind::Added, label, None, Some(cur)));
            continue;
        };

        // A status appearing or disappearing is not reported.
        if let (Some(old), Some(new)) = (&prev.status, &cur.status) {
            if old != new {
                let label = format!("{}: {old} -> {new}", cur.name);
                deltas.push(delta(cur, DeltaKind::Status, label, Some(prev), Some(cur)));
            }
        }

        if positions_differ(prev.position.as_ref(), cur.position.as_ref()) {
            let label = format!("{} moved", cur.name);
            deltas.push(delta(cur, DeltaKind::Position, label, Some(prev), Some(cur)));
        }
    }

    for (id, prev) in previous {
        if !current.contains_key(id) {
            let label = format!("{} disappeared", prev.name);
            deltas.push(delta(prev, DeltaKind::Removed, label, Some(prev), None));
        }
    }

    deltas
}

fn delta(
    subject: &EntitySummary,
    kind: DeltaKind,
    label: String,
    previous: Option<&Arc<EntitySummary>>,
    current: Option<&Arc<EntitySummary>>,
) -> Delta {
    Delta {
        id: subject.id.clone(),
        entity_type: subject.entity_type.clone(),
        kind,
        label,
        previous: previous.cloned(),
        current: current.cloned(),
    }
}

/// Absent on both sides is equal; absent on one side is a change.
pub fn positions_differ(a: Option<&Position>, b: Option<&Position>) -> bool {
    match (a, b) {
        (None, None) => false,
        (Some(a), Some(b)) => a
            .axes()
            .into_iter()
            .zip(b.axes())
            .any(|(a, b)| axis_differs(a, b)),
        _ => true,
    }
}

fn axis_differs(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => false,
        (Some(a), Some(b)) => (a - b).abs() >= POSITION_TOLERANCE - TOLERANCE_SLACK,
        _ => true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::summarize::summarize_snapshot;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use worldsync_api::{RawEntity, WorldSnapshot};

    fn world(entities: &[(&str, Value)]) -> SummaryMap {
        let entities = entities
            .iter()
            .map(|(id, props)| {
                let mut raw = RawEntity::new(*id, "agent");
                if let Value::Object(map) = props {
                    raw.properties = map.clone();
                }
                raw
            })
            .collect();
        summarize_snapshot(&WorldSnapshot::from_entities(entities))
    }

    fn kinds(deltas: &[Delta]) -> Vec<(String, DeltaKind)> {
        deltas.iter().map(|d| (d.id.clone(), d.kind)).collect()
    }

    #[test]
    fn identical_snapshots_produce_nothing() {
        let s = world(&[
            ("a", json!({"name": "A", "status": "idle", "x": 1, "y": 2})),
            ("b", json!({})),
        ]);
        assert!(compute_world_deltas(&s, &s).is_empty());
    }

    #[test]
    fn empty_to_empty_is_empty() {
        assert!(compute_world_deltas(&SummaryMap::new(), &SummaryMap::new()).is_empty());
    }

    #[test]
    fn added_and_removed_cover_symmetric_difference() {
        let prev = world(&[("a", json!({})), ("b", json!({})), ("c", json!({}))]);
        let cur = world(&[("c", json!({})), ("d", json!({})), ("a", json!({}))]);

        let deltas = compute_world_deltas(&prev, &cur);
        assert_eq!(
            kinds(&deltas),
            vec![
                ("d".to_owned(), DeltaKind::Added),
                ("b".to_owned(), DeltaKind::Removed),
            ]
        );
    }

    #[test]
    fn added_and_removed_carry_the_affected_summary() {
        let prev = world(&[("old", json!({"name": "Old Tower", "status": "idle"}))]);
        let cur = world(&[("new", json!({"name": "Scout", "x": 2, "y": 3}))]);

        let deltas = compute_world_deltas(&prev, &cur);
        let added = &deltas[0];
        assert_eq!(added.kind, DeltaKind::Added);
        assert!(added.previous.is_none());
        assert_eq!(added.current.as_ref(), cur.get("new"));

        let removed = &deltas[1];
        assert_eq!(removed.kind, DeltaKind::Removed);
        assert_eq!(removed.previous.as_ref(), prev.get("old"));
        assert!(removed.current.is_none());
    }

    #[test]
    fn added_and_removed_carry_names_in_labels() {
        let prev = world(&[("old", json!({"name": "Old Tower"}))]);
        let cur = world(&[("new", json!({"name": "Scout"}))]);

        let labels: Vec<String> = compute_world_deltas(&prev, &cur)
            .into_iter()
            .map(|d| d.label)
            .collect();
        assert_eq!(labels, vec!["Scout appeared", "Old Tower disappeared"]);
    }

    #[test]
    fn status_change_emits_exactly_one_delta() {
        let prev = world(&[("t", json!({"name": "Task", "status": "pending"}))]);
        let cur = world(&[("t", json!({"name": "Task", "status": "done"}))]);

        let deltas = compute_world_deltas(&prev, &cur);
        assert_eq!(deltas.len(), 1);
        let d = &deltas[0];
        assert_eq!(d.kind, DeltaKind::Status);
        assert_eq!(d.label, "Task: pending -> done");
        assert_eq!(d.previous.as_ref().unwrap().status.as_deref(), Some("pending"));
        assert_eq!(d.current.as_ref().unwrap().status.as_deref(), Some("done"));
        assert_eq!(d.entity_type, "agent");
    }

    #[test]
    fn status_case_differences_are_not_changes() {
        let prev = world(&[("t", json!({"status": "Done"}))]);
        let cur = world(&[("t", json!({"state": "DONE"}))]);
        assert!(compute_world_deltas(&prev, &cur).is_empty());
    }

    #[test]
    fn one_sided_status_emits_nothing() {
        let none = world(&[("t", json!({}))]);
        let some = world(&[("t", json!({"status": "active"}))]);
        assert!(compute_world_deltas(&none, &some).is_empty());
        assert!(compute_world_deltas(&some, &none).is_empty());
    }

    #[test]
    fn movement_below_tolerance_is_ignored() {
        let prev = world(&[("a", json!({"x": 0, "y": 0}))]);
        let cur = world(&[("a", json!({"x": 0.0009, "y": -0.0009}))]);
        assert!(compute_world_deltas(&prev, &cur).is_empty());
    }

    #[test]
    fn movement_at_tolerance_is_reported() {
        let prev = world(&[("a", json!({"name": "Rover", "x": 0, "y": 0}))]);
        let cur = world(&[("a", json!({"name": "Rover", "x": 0.001, "y": 0}))]);

        let deltas = compute_world_deltas(&prev, &cur);
        assert_eq!(kinds(&deltas), vec![("a".to_owned(), DeltaKind::Position)]);
        assert_eq!(deltas[0].label, "Rover moved");
        assert_eq!(
            deltas[0].previous.as_ref().unwrap().position,
            Some(Position::xy(0.0, 0.0))
        );
        assert_eq!(
            deltas[0].current.as_ref().unwrap().position,
            Some(Position::xy(0.001, 0.0))
        );
    }

    #[test]
    fn tolerance_holds_away_from_the_origin() {
        for (from, to) in [(1.0, 1.001), (100.0, 100.001), (-5.0, -5.001), (1.0, 0.999)] {
            let prev = world(&[("a", json!({"x": from, "y": 0}))]);
            let cur = world(&[("a", json!({"x": to, "y": 0}))]);
            assert_eq!(
                compute_world_deltas(&prev, &cur).len(),
                1,
                "{from} -> {to} should move"
            );
        }

        let prev = world(&[("a", json!({"x": 100.0, "y": 0}))]);
        let cur = world(&[("a", json!({"x": 100.0009, "y": 0}))]);
        assert!(compute_world_deltas(&prev, &cur).is_empty());
    }

    #[test]
    fn gaining_or_losing_position_is_movement() {
        let placed = world(&[("a", json!({"x": 1, "y": 1}))]);
        let unplaced = world(&[("a", json!({}))]);

        let deltas = compute_world_deltas(&unplaced, &placed);
        assert_eq!(kinds(&deltas), vec![("a".to_owned(), DeltaKind::Position)]);
        assert_eq!(deltas[0].previous.as_ref().unwrap().position, None);

        let deltas = compute_world_deltas(&placed, &unplaced);
        assert_eq!(kinds(&deltas), vec![("a".to_owned(), DeltaKind::Position)]);
        assert_eq!(deltas[0].current.as_ref().unwrap().position, None);
    }

    #[test]
    fn one_sided_axis_is_movement() {
        let flat = world(&[("a", json!({"x": 1, "y": 1}))]);
        let lifted = world(&[("a", json!({"x": 1, "y": 1, "z": 0}))]);
        assert_eq!(compute_world_deltas(&flat, &lifted).len(), 1);
    }

    #[test]
    fn status_and_position_can_both_fire() {
        let prev = world(&[("a", json!({"status": "idle", "x": 0, "y": 0}))]);
        let cur = world(&[("a", json!({"status": "moving", "x": 5, "y": 0}))]);

        assert_eq!(
            kinds(&compute_world_deltas(&prev, &cur)),
            vec![
                ("a".to_owned(), DeltaKind::Status),
                ("a".to_owned(), DeltaKind::Position),
            ]
        );
    }

    #[test]
    fn added_entities_never_get_status_or_position() {
        let cur = world(&[("a", json!({"status": "idle", "x": 3, "y": 4}))]);
        let deltas = compute_world_deltas(&SummaryMap::new(), &cur);
        assert_eq!(kinds(&deltas), vec![("a".to_owned(), DeltaKind::Added)]);
    }

    #[test]
    fn inputs_are_left_untouched() {
        let prev = world(&[("a", json!({"status": "idle"}))]);
        let cur = world(&[("a", json!({"status": "busy"})), ("b", json!({}))]);
        let (prev_copy, cur_copy) = (prev.clone(), cur.clone());

        let _ = compute_world_deltas(&prev, &cur);
        assert_eq!(prev, prev_copy);
        assert_eq!(cur, cur_copy);
    }
}
