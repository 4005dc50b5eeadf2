//! Read-only projections of a matrix for list and grid screens.
//!
//! # Responsibility
//! - Filter and sort rows by search text and link membership.
//! - Project the working copy into grid cells and per-row checklists.
//!
//! # Invariants
//! - Views never mutate the matrix.
//! - Sorting is stable and falls back to id order for ties.

use crate::matrix::LinkMatrix;
use crate::model::entity::{EntityId, MatrixEntity};
use serde::Serialize;
use std::cmp::Ordering;

/// Row ordering for list views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowSort {
    /// Backend position, unpositioned rows last.
    #[default]
    Position,
    Code,
    Label,
    Id,
}

/// Client-side row filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowQuery {
    /// Case-insensitive substring matched against code and label.
    pub search: Option<String>,
    pub sort: RowSort,
    /// Keep only rows linked to this column in the working copy.
    pub linked_to: Option<EntityId>,
}

/// One cell of the desktop grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridCell {
    pub column_id: EntityId,
    pub linked: bool,
    /// Differs from the loaded state.
    pub changed: bool,
}

/// One row of the desktop grid, cells in column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridRow {
    pub row_id: EntityId,
    pub code: String,
    pub cells: Vec<GridCell>,
}

/// One entry of a per-row checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistItem {
    pub column_id: EntityId,
    pub code: String,
    pub label: String,
    pub linked: bool,
    pub changed: bool,
}

/// Rows matching `query`, in the requested order.
pub fn filter_rows<'a>(matrix: &'a LinkMatrix, query: &RowQuery) -> Vec<&'a MatrixEntity> {
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_lowercase);

    let mut rows: Vec<&MatrixEntity> = matrix
        .rows()
        .iter()
        .filter(|row| match &needle {
            Some(needle) => {
                row.code.to_lowercase().contains(needle.as_str())
                    || row.label.to_lowercase().contains(needle.as_str())
            }
            None => true,
        })
        .filter(|row| match query.linked_to {
            Some(column_id) => matrix.is_linked(row.id, column_id),
            None => true,
        })
        .collect();

    rows.sort_by(|left, right| compare_rows(left, right, query.sort));
    rows
}

fn compare_rows(left: &MatrixEntity, right: &MatrixEntity, sort: RowSort) -> Ordering {
    let primary = match sort {
        RowSort::Position => match (left.position, right.position) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        RowSort::Code => left.code.to_lowercase().cmp(&right.code.to_lowercase()),
        RowSort::Label => left.label.to_lowercase().cmp(&right.label.to_lowercase()),
        RowSort::Id => Ordering::Equal,
    };
    primary.then(left.id.cmp(&right.id))
}

/// Full grid of the working copy, rows and columns in loaded order.
pub fn grid(matrix: &LinkMatrix) -> Vec<GridRow> {
    matrix
        .rows()
        .iter()
        .map(|row| GridRow {
            row_id: row.id,
            code: row.code.clone(),
            cells: matrix
                .columns()
                .iter()
                .map(|column| GridCell {
                    column_id: column.id,
                    linked: matrix.is_linked(row.id, column.id),
                    changed: matrix.is_changed(row.id, column.id),
                })
                .collect(),
        })
        .collect()
}

/// Every column with its link state for one row. Empty for unknown rows.
pub fn row_checklist(matrix: &LinkMatrix, row_id: EntityId) -> Vec<ChecklistItem> {
    if matrix.row(row_id).is_none() {
        return Vec::new();
    }
    matrix
        .columns()
        .iter()
        .map(|column| ChecklistItem {
            column_id: column.id,
            code: column.code.clone(),
            label: column.label.clone(),
            linked: matrix.is_linked(row_id, column.id),
            changed: matrix.is_changed(row_id, column.id),
        })
        .collect()
}
