use linkgrid_core::{
    compute_delta, LinkMatrix, MatrixEntity, MatrixSource, NormalizeReport, RowDelta, Snapshot,
};

fn entities(prefix: &str, ids: &[i64]) -> Vec<MatrixEntity> {
    ids.iter()
        .map(|id| MatrixEntity::new(*id, format!("{prefix}{id}"), ""))
        .collect()
}

fn matrix(rows: &[i64], columns: &[i64], links: &[(i64, i64)]) -> LinkMatrix {
    LinkMatrix::from_source(MatrixSource {
        generation: 1,
        rows: entities("R", rows),
        columns: entities("C", columns),
        links: Snapshot::from_pairs(links.iter().copied()),
        report: NormalizeReport::default(),
    })
}

fn snapshot_pairs() -> Vec<(Snapshot, Snapshot)> {
    vec![
        (Snapshot::new(), Snapshot::from_pairs([(1, 10)])),
        (
            Snapshot::from_pairs([(1, 10), (1, 20), (2, 10)]),
            Snapshot::from_pairs([(1, 20), (2, 30), (3, 10)]),
        ),
        (
            Snapshot::from_pairs([(5, 50), (6, 60)]),
            Snapshot::from_pairs([(5, 50), (6, 60)]),
        ),
        (
            Snapshot::from_pairs([(7, 1), (7, 2), (7, 3)]),
            Snapshot::new(),
        ),
    ]
}

#[test]
fn toggling_a_pair_twice_restores_the_working_set() {
    let mut matrix = matrix(&[1, 2], &[10, 20], &[(1, 10)]);

    for (row_id, column_id) in [(1, 10), (1, 20), (2, 10)] {
        let before = matrix.working().clone();
        matrix.toggle(row_id, column_id).unwrap();
        matrix.toggle(row_id, column_id).unwrap();
        assert_eq!(matrix.working(), &before);
    }
    assert!(!matrix.is_dirty());
}

#[test]
fn delta_is_symmetric_under_snapshot_swap() {
    for (a, b) in snapshot_pairs() {
        let forward = compute_delta(&a, &b);
        let backward = compute_delta(&b, &a);

        assert_eq!(forward.inverse(), backward);
        for (_, row) in &forward {
            assert!(row.added.iter().all(|id| !row.removed.contains(id)));
        }
    }
}

#[test]
fn dirty_flag_tracks_membership_changes() {
    let mut matrix = matrix(&[1, 2], &[10, 20], &[(1, 10)]);
    assert!(!matrix.is_dirty());

    matrix.toggle(2, 20).unwrap();
    assert!(matrix.is_dirty());

    matrix.set_link(2, 20, false).unwrap();
    assert!(!matrix.is_dirty());

    matrix.set_link(1, 10, true).unwrap();
    assert!(!matrix.is_dirty());
}

#[test]
fn toggles_on_two_rows_produce_additions_only() {
    let mut matrix = matrix(&[1, 2], &[10, 20], &[(1, 10)]);

    matrix.toggle(1, 20).unwrap();
    matrix.toggle(2, 10).unwrap();

    let delta = matrix.delta();
    assert_eq!(delta.len(), 2);
    assert_eq!(
        delta.get(1),
        Some(&RowDelta {
            added: vec![20],
            removed: vec![]
        })
    );
    assert_eq!(
        delta.get(2),
        Some(&RowDelta {
            added: vec![10],
            removed: vec![]
        })
    );
}

#[test]
fn double_toggle_on_fully_linked_row_leaves_empty_delta() {
    let mut matrix = matrix(&[1], &[10, 20], &[(1, 10), (1, 20)]);

    matrix.toggle(1, 10).unwrap();
    matrix.toggle(1, 10).unwrap();

    assert!(matrix.delta().is_empty());
    assert!(!matrix.is_dirty());
}

#[test]
fn delta_ignores_toggle_order() {
    let toggles = [(1, 10), (2, 20), (1, 20), (2, 20), (1, 10), (2, 10)];

    let mut forward = matrix(&[1, 2], &[10, 20], &[(1, 10)]);
    for (row_id, column_id) in toggles {
        forward.toggle(row_id, column_id).unwrap();
    }

    let mut backward = matrix(&[1, 2], &[10, 20], &[(1, 10)]);
    for (row_id, column_id) in toggles.iter().rev() {
        backward.toggle(*row_id, *column_id).unwrap();
    }

    assert_eq!(forward.delta(), backward.delta());
    assert_eq!(forward.working(), backward.working());
}

#[test]
fn cleared_row_appears_in_delta_as_removals() {
    let mut matrix = matrix(&[1, 2], &[10, 20], &[(1, 10), (1, 20), (2, 10)]);

    matrix.clear_row(1).unwrap();

    let delta = matrix.delta();
    assert_eq!(delta.len(), 1);
    assert_eq!(delta.get(1).unwrap().removed, vec![10, 20]);
    assert_eq!(delta.call_count(), 1);
}
