//! Association-matrix reconciliation core.
//!
//! Loads rows, columns and their links from a backend, keeps an initial and
//! a working snapshot, and commits only the per-row delta between them.

pub mod commit;
pub mod config;
pub mod db;
pub mod diff;
pub mod logging;
pub mod matrix;
pub mod model;
pub mod normalize;
pub mod repo;
pub mod session;
pub mod view;

pub use commit::{
    plan_calls, CallResult, CommitCoordinator, CommitOutcome, CommitReport, LinkOp, PlannedCall,
};
pub use config::{CommitPolicy, ConfigError, CoreConfig};
pub use diff::{compute_delta, is_dirty, Delta, RowDelta};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use matrix::{LinkMatrix, MatrixError};
pub use model::entity::{
    AssociationKind, EntityId, EntitySide, LinkEmbedding, MatrixEntity, MatrixScope,
};
pub use model::snapshot::{LinkSet, Snapshot};
pub use normalize::{
    build_snapshot, parse_entity_list, source_from_fetch, FetchedEntity, MatrixSource,
    NormalizeError, NormalizeReport,
};
pub use repo::link_repo::{LinkRepository, RepoError, RepoResult};
pub use repo::memory_repo::{CallCounts, InMemoryLinkRepository};
pub use repo::sqlite_repo::{ImportSummary, SqliteLinkRepository};
pub use session::{LoadError, MatrixSession, SessionError, SessionState};
pub use view::{filter_rows, grid, row_checklist, ChecklistItem, GridCell, GridRow, RowQuery, RowSort};

/// Minimal health-check API for CLI and embedder smoke tests.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
