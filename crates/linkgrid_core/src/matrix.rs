//! Link matrix state: rows, columns, and the initial/working snapshot pair.
//!
//! # Responsibility
//! - Own one editing session's rows, columns and snapshots.
//! - Apply local link edits to the working snapshot only.
//!
//! # Invariants
//! - `initial` changes only through `initialize`/`apply_source`/`rebase`.
//! - `working` starts as an independent copy of `initial`.
//! - Edits reject row/column ids absent from the loaded lists.
//! - `revision` increases on every membership change of `working`.

use crate::diff::{compute_delta, is_dirty, Delta};
use crate::model::entity::{EntityId, MatrixEntity};
use crate::model::snapshot::{LinkSet, Snapshot};
use crate::normalize::MatrixSource;
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from local matrix edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    UnknownRow(EntityId),
    UnknownColumn(EntityId),
}

impl Display for MatrixError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownRow(id) => write!(f, "row not in matrix: {id}"),
            Self::UnknownColumn(id) => write!(f, "column not in matrix: {id}"),
        }
    }
}

impl Error for MatrixError {}

/// Rows × columns with an initial and a working link snapshot.
#[derive(Debug, Clone, Default)]
pub struct LinkMatrix {
    rows: Vec<MatrixEntity>,
    columns: Vec<MatrixEntity>,
    row_index: BTreeMap<EntityId, usize>,
    column_index: BTreeMap<EntityId, usize>,
    initial: Snapshot,
    working: Snapshot,
    generation: Option<u64>,
    revision: u64,
}

impl LinkMatrix {
    /// Creates an empty, never-loaded matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a matrix initialized from `source`.
    pub fn from_source(source: MatrixSource) -> Self {
        let mut matrix = Self::new();
        matrix.initialize(source);
        matrix
    }

    /// Replaces rows, columns and both snapshots from `source`.
    ///
    /// Links referencing entities outside `source.rows`/`source.columns` are
    /// dropped. `working` becomes an independent copy of `initial`.
    pub fn initialize(&mut self, source: MatrixSource) {
        let MatrixSource {
            generation,
            rows,
            columns,
            mut links,
            report,
        } = source;

        self.row_index = index_of(&rows);
        self.column_index = index_of(&columns);
        self.rows = rows;
        self.columns = columns;

        let dropped = links.retain_known(&self.row_ids(), &self.column_ids());
        self.working = links.clone();
        self.initial = links;
        self.generation = Some(generation);
        self.revision += 1;

        info!(
            "event=matrix_init module=matrix status=ok generation={} rows={} columns={} links={} dropped_links={}",
            generation,
            self.rows.len(),
            self.columns.len(),
            self.initial.link_count(),
            dropped + report.dropped_links
        );
    }

    /// Initializes from `source` only when it comes from a different fetch
    /// than the one currently loaded. Returns `true` when it re-initialized.
    pub fn apply_source(&mut self, source: MatrixSource) -> bool {
        if self.generation == Some(source.generation) {
            return false;
        }
        self.initialize(source);
        true
    }

    /// Replaces `initial` (and the entity lists) with freshly fetched state
    /// while keeping the working links the user intended.
    ///
    /// Working links that reference entities no longer present are dropped.
    pub fn rebase(&mut self, source: MatrixSource) {
        let intended = std::mem::take(&mut self.working);
        self.initialize(source);
        let mut working = intended;
        working.retain_known(&self.row_ids(), &self.column_ids());
        if working != self.working {
            self.revision += 1;
        }
        self.working = working;
    }

    pub fn rows(&self) -> &[MatrixEntity] {
        &self.rows
    }

    pub fn columns(&self) -> &[MatrixEntity] {
        &self.columns
    }

    pub fn row(&self, row_id: EntityId) -> Option<&MatrixEntity> {
        self.row_index.get(&row_id).map(|&index| &self.rows[index])
    }

    pub fn column(&self, column_id: EntityId) -> Option<&MatrixEntity> {
        self.column_index
            .get(&column_id)
            .map(|&index| &self.columns[index])
    }

    pub fn initial(&self) -> &Snapshot {
        &self.initial
    }

    pub fn working(&self) -> &Snapshot {
        &self.working
    }

    /// Fetch generation currently loaded, `None` before the first load.
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    /// Change counter for the working snapshot.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether `column_id` is linked to `row_id` in the working copy.
    ///
    /// Unknown ids yield `false`.
    pub fn is_linked(&self, row_id: EntityId, column_id: EntityId) -> bool {
        self.working.contains(row_id, column_id)
    }

    /// Whether the pair differs between working and initial.
    pub fn is_changed(&self, row_id: EntityId, column_id: EntityId) -> bool {
        self.working.contains(row_id, column_id) != self.initial.contains(row_id, column_id)
    }

    /// Column ids linked to `row_id` in the working copy, ascending.
    pub fn linked_columns(&self, row_id: EntityId) -> Vec<EntityId> {
        self.working
            .links(row_id)
            .map(|links| links.iter().collect())
            .unwrap_or_default()
    }

    /// Row ids linked to `column_id` in the working copy, ascending.
    pub fn linked_rows(&self, column_id: EntityId) -> Vec<EntityId> {
        self.working.rows_linked_to(column_id)
    }

    /// Flips one link in the working copy and returns the new membership.
    pub fn toggle(&mut self, row_id: EntityId, column_id: EntityId) -> Result<bool, MatrixError> {
        self.ensure_known(row_id, column_id)?;
        let linked = self.working.toggle(row_id, column_id);
        self.revision += 1;
        debug!(
            "event=matrix_toggle module=matrix status=ok row_id={} column_id={} linked={}",
            row_id, column_id, linked
        );
        Ok(linked)
    }

    /// Sets one link in the working copy. Returns `true` when it changed.
    pub fn set_link(
        &mut self,
        row_id: EntityId,
        column_id: EntityId,
        linked: bool,
    ) -> Result<bool, MatrixError> {
        self.ensure_known(row_id, column_id)?;
        let changed = if linked {
            self.working.insert(row_id, column_id)
        } else {
            self.working.remove(row_id, column_id)
        };
        if changed {
            self.revision += 1;
        }
        Ok(changed)
    }

    /// Replaces one row's working links. Returns `true` when it changed.
    pub fn set_row(
        &mut self,
        row_id: EntityId,
        column_ids: impl IntoIterator<Item = EntityId>,
    ) -> Result<bool, MatrixError> {
        if !self.row_index.contains_key(&row_id) {
            return Err(MatrixError::UnknownRow(row_id));
        }
        let links: LinkSet = column_ids.into_iter().collect();
        if let Some(unknown) = links.iter().find(|id| !self.column_index.contains_key(id)) {
            return Err(MatrixError::UnknownColumn(unknown));
        }
        let changed = self.working.set_row(row_id, links);
        if changed {
            self.revision += 1;
        }
        Ok(changed)
    }

    /// Removes every working link of one row.
    pub fn clear_row(&mut self, row_id: EntityId) -> Result<bool, MatrixError> {
        self.set_row(row_id, [])
    }

    /// Links (or unlinks) one column against every row.
    ///
    /// Returns the number of rows whose membership changed.
    pub fn set_column(&mut self, column_id: EntityId, linked: bool) -> Result<usize, MatrixError> {
        if !self.column_index.contains_key(&column_id) {
            return Err(MatrixError::UnknownColumn(column_id));
        }
        let row_ids: Vec<EntityId> = self.rows.iter().map(|row| row.id).collect();
        let mut changed = 0;
        for row_id in row_ids {
            let row_changed = if linked {
                self.working.insert(row_id, column_id)
            } else {
                self.working.remove(row_id, column_id)
            };
            changed += usize::from(row_changed);
        }
        if changed > 0 {
            self.revision += 1;
        }
        Ok(changed)
    }

    /// Drops every local edit (working := initial).
    pub fn discard_changes(&mut self) -> bool {
        if !self.is_dirty() {
            return false;
        }
        self.working = self.initial.clone();
        self.revision += 1;
        true
    }

    /// Whether working differs from initial.
    pub fn is_dirty(&self) -> bool {
        is_dirty(&self.initial, &self.working)
    }

    /// Per-row changes a commit would send.
    pub fn delta(&self) -> Delta {
        compute_delta(&self.initial, &self.working)
    }

    fn ensure_known(&self, row_id: EntityId, column_id: EntityId) -> Result<(), MatrixError> {
        if !self.row_index.contains_key(&row_id) {
            return Err(MatrixError::UnknownRow(row_id));
        }
        if !self.column_index.contains_key(&column_id) {
            return Err(MatrixError::UnknownColumn(column_id));
        }
        Ok(())
    }

    fn row_ids(&self) -> BTreeSet<EntityId> {
        self.row_index.keys().copied().collect()
    }

    fn column_ids(&self) -> BTreeSet<EntityId> {
        self.column_index.keys().copied().collect()
    }
}

fn index_of(entities: &[MatrixEntity]) -> BTreeMap<EntityId, usize> {
    entities
        .iter()
        .enumerate()
        .map(|(index, entity)| (entity.id, index))
        .collect()
}
