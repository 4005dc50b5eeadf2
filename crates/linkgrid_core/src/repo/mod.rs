//! Link repository contract and implementations.
//!
//! # Responsibility
//! - Define the backend calls the editing core depends on.
//! - Provide in-memory and SQLite implementations of that contract.
//!
//! # Invariants
//! - Add/remove calls are idempotent per `(row, column)` pair.
//! - Repositories report failures as `RepoError`, never by panicking.

pub mod link_repo;
pub mod memory_repo;
pub mod sqlite_repo;
