//! Dirty check and delta computation between two snapshots.
//!
//! # Responsibility
//! - Decide whether a working snapshot differs from its initial snapshot.
//! - Produce the per-row added/removed column ids a commit must send.
//!
//! # Invariants
//! - Comparison is by set membership, never by identity.
//! - For each row, `added` and `removed` are disjoint and ascending.
//! - Rows whose added and removed lists are both empty never appear.
//! - Output depends only on the two snapshots, not on toggle history.

use crate::model::entity::EntityId;
use crate::model::snapshot::{LinkSet, Snapshot};
use serde::Serialize;
use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

/// Added/removed column ids for one row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RowDelta {
    pub added: Vec<EntityId>,
    pub removed: Vec<EntityId>,
}

impl RowDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Per-row changes between `initial` and `working`, keyed by row id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Delta {
    rows: BTreeMap<EntityId, RowDelta>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows with at least one change.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, row_id: EntityId) -> Option<&RowDelta> {
        self.rows.get(&row_id)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, EntityId, RowDelta> {
        self.rows.iter()
    }

    /// Remote calls a commit of this delta dispatches: one per non-empty
    /// `added` list plus one per non-empty `removed` list.
    pub fn call_count(&self) -> usize {
        self.rows
            .values()
            .map(|row| usize::from(!row.added.is_empty()) + usize::from(!row.removed.is_empty()))
            .sum()
    }

    /// Total number of `(row, column)` pairs added and removed.
    pub fn link_counts(&self) -> (usize, usize) {
        self.rows.values().fold((0, 0), |(added, removed), row| {
            (added + row.added.len(), removed + row.removed.len())
        })
    }

    /// Delta that undoes this one (added and removed swapped).
    pub fn inverse(&self) -> Delta {
        Delta {
            rows: self
                .rows
                .iter()
                .map(|(row_id, row)| {
                    (
                        *row_id,
                        RowDelta {
                            added: row.removed.clone(),
                            removed: row.added.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Delta {
    type Item = (&'a EntityId, &'a RowDelta);
    type IntoIter = btree_map::Iter<'a, EntityId, RowDelta>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl FromIterator<(EntityId, RowDelta)> for Delta {
    fn from_iter<T: IntoIterator<Item = (EntityId, RowDelta)>>(iter: T) -> Self {
        Delta {
            rows: iter.into_iter().filter(|(_, row)| !row.is_empty()).collect(),
        }
    }
}

/// Returns `true` when any row's membership differs between the snapshots.
pub fn is_dirty(initial: &Snapshot, working: &Snapshot) -> bool {
    initial != working
}

/// Computes the per-row delta that turns `initial` into `working`.
pub fn compute_delta(initial: &Snapshot, working: &Snapshot) -> Delta {
    let empty = LinkSet::new();
    let row_ids: BTreeSet<EntityId> = initial.row_ids().chain(working.row_ids()).collect();

    row_ids
        .into_iter()
        .map(|row_id| {
            let before = initial.links(row_id).unwrap_or(&empty);
            let after = working.links(row_id).unwrap_or(&empty);
            (
                row_id,
                RowDelta {
                    added: after.difference(before),
                    removed: before.difference(after),
                },
            )
        })
        .collect()
}
