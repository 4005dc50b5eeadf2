//! Domain model for association-matrix editing.
//!
//! # Responsibility
//! - Define the row/column entities and association kinds edited by the core.
//! - Define the snapshot value types shared by matrix, diff and commit layers.
//!
//! # Invariants
//! - Every row and column is identified by a stable backend `EntityId`.
//! - Snapshots are plain values; two snapshots never share mutable state.

pub mod entity;
pub mod snapshot;
