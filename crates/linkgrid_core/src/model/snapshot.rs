//! Link sets and row→link-set snapshots.
//!
//! # Responsibility
//! - Hold one full `RowId -> LinkSet` mapping as a plain owned value.
//! - Provide in-place edit primitives used by the working copy.
//!
//! # Invariants
//! - Column ids inside a `LinkSet` are unique (set semantics).
//! - Snapshot equality compares membership: a row with an empty set equals
//!   an absent row.
//! - Iteration order is ascending by id, so derived output is deterministic.

use crate::model::entity::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

/// Column ids currently linked to one row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkSet(BTreeSet<EntityId>);

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, column_id: EntityId) -> bool {
        self.0.contains(&column_id)
    }

    /// Returns `true` when the id was not present before.
    pub fn insert(&mut self, column_id: EntityId) -> bool {
        self.0.insert(column_id)
    }

    /// Returns `true` when the id was present before.
    pub fn remove(&mut self, column_id: EntityId) -> bool {
        self.0.remove(&column_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.0.iter().copied()
    }

    /// Ids in `self` that are not in `other`, ascending.
    pub fn difference(&self, other: &LinkSet) -> Vec<EntityId> {
        self.0.difference(&other.0).copied().collect()
    }
}

impl FromIterator<EntityId> for LinkSet {
    fn from_iter<T: IntoIterator<Item = EntityId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Full `RowId -> LinkSet` mapping at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    rows: BTreeMap<EntityId, LinkSet>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from `(row, column)` pairs. Duplicate pairs collapse.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (EntityId, EntityId)>) -> Self {
        let mut snapshot = Self::new();
        for (row_id, column_id) in pairs {
            snapshot.insert(row_id, column_id);
        }
        snapshot
    }

    /// Links for one row. `None` when the row has no entry at all.
    pub fn links(&self, row_id: EntityId) -> Option<&LinkSet> {
        self.rows.get(&row_id)
    }

    pub fn contains(&self, row_id: EntityId, column_id: EntityId) -> bool {
        self.rows
            .get(&row_id)
            .is_some_and(|links| links.contains(column_id))
    }

    /// Adds one link. Returns `true` when membership changed.
    pub fn insert(&mut self, row_id: EntityId, column_id: EntityId) -> bool {
        self.rows.entry(row_id).or_default().insert(column_id)
    }

    /// Removes one link. Returns `true` when membership changed.
    ///
    /// The row entry is kept (possibly empty) so a cleared row stays visible
    /// to callers iterating `row_ids`.
    pub fn remove(&mut self, row_id: EntityId, column_id: EntityId) -> bool {
        self.rows
            .get_mut(&row_id)
            .is_some_and(|links| links.remove(column_id))
    }

    /// Flips one link and returns the new membership.
    pub fn toggle(&mut self, row_id: EntityId, column_id: EntityId) -> bool {
        if self.remove(row_id, column_id) {
            false
        } else {
            self.insert(row_id, column_id);
            true
        }
    }

    /// Replaces one row's links. Returns `true` when membership changed.
    pub fn set_row(&mut self, row_id: EntityId, links: LinkSet) -> bool {
        let previous = self.rows.insert(row_id, links);
        let current = self.rows.get(&row_id);
        match previous {
            Some(previous) => Some(&previous) != current,
            None => current.is_some_and(|links| !links.is_empty()),
        }
    }

    /// Row ids that have an entry, including rows whose set is empty.
    pub fn row_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.rows.keys().copied()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, EntityId, LinkSet> {
        self.rows.iter()
    }

    /// Total number of `(row, column)` links.
    pub fn link_count(&self) -> usize {
        self.rows.values().map(LinkSet::len).sum()
    }

    /// Rows linked to one column, ascending.
    pub fn rows_linked_to(&self, column_id: EntityId) -> Vec<EntityId> {
        self.rows
            .iter()
            .filter(|(_, links)| links.contains(column_id))
            .map(|(row_id, _)| *row_id)
            .collect()
    }

    /// Drops rows and links that reference ids outside the given sets.
    ///
    /// Returns the number of links removed.
    pub fn retain_known(
        &mut self,
        row_ids: &BTreeSet<EntityId>,
        column_ids: &BTreeSet<EntityId>,
    ) -> usize {
        let before = self.link_count();
        self.rows.retain(|row_id, _| row_ids.contains(row_id));
        for links in self.rows.values_mut() {
            links.0.retain(|column_id| column_ids.contains(column_id));
        }
        before - self.link_count()
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        let empty = LinkSet::new();
        self.rows
            .keys()
            .chain(other.rows.keys())
            .all(|row_id| {
                self.rows.get(row_id).unwrap_or(&empty) == other.rows.get(row_id).unwrap_or(&empty)
            })
    }
}

impl Eq for Snapshot {}

#[cfg(test)]
mod tests {
    use super::{LinkSet, Snapshot};
    use std::collections::BTreeSet;

    #[test]
    fn toggle_twice_restores_membership() {
        let mut snapshot = Snapshot::from_pairs([(1, 10)]);
        let before = snapshot.clone();

        assert!(snapshot.toggle(1, 20));
        assert!(!snapshot.toggle(1, 20));
        assert_eq!(snapshot, before);
    }

    #[test]
    fn empty_row_equals_absent_row() {
        let mut cleared = Snapshot::from_pairs([(1, 10)]);
        cleared.remove(1, 10);

        assert_eq!(cleared, Snapshot::new());
        assert_eq!(cleared.row_ids().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn set_row_reports_membership_change_only() {
        let mut snapshot = Snapshot::from_pairs([(1, 10), (1, 20)]);

        assert!(!snapshot.set_row(1, [20, 10].into_iter().collect()));
        assert!(snapshot.set_row(1, LinkSet::new()));
        assert!(!snapshot.set_row(2, LinkSet::new()));
        assert_eq!(snapshot.link_count(), 0);
    }

    #[test]
    fn retain_known_drops_orphans() {
        let mut snapshot = Snapshot::from_pairs([(1, 10), (1, 99), (7, 10)]);
        let rows: BTreeSet<i64> = [1].into_iter().collect();
        let columns: BTreeSet<i64> = [10].into_iter().collect();

        assert_eq!(snapshot.retain_known(&rows, &columns), 2);
        assert_eq!(snapshot, Snapshot::from_pairs([(1, 10)]));
    }
}
