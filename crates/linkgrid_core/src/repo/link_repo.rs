//! Link repository contract consumed by the editing core.
//!
//! # Responsibility
//! - Define the fetch/add/remove calls a matrix session needs from its
//!   backend, independent of transport or storage.
//!
//! # Invariants
//! - `add_links` of an already-present link and `remove_links` of an absent
//!   link are no-ops, so every call can be retried independently.
//! - Fetched entities on the embedding side of `scope.kind` carry `linked`.

use crate::db::DbError;
use crate::model::entity::{AssociationKind, EntityId, MatrixScope};
use crate::normalize::FetchedEntity;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors reported by link repositories.
#[derive(Debug)]
pub enum RepoError {
    /// Storage-level failure.
    Db(DbError),
    /// Backend refused the call (validation, permission, injected failure).
    Rejected(String),
    /// Backend could not be reached or is in an unusable state.
    Unavailable(String),
    /// Stored data cannot be mapped to the canonical model.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Rejected(message) => write!(f, "request rejected: {message}"),
            Self::Unavailable(message) => write!(f, "backend unavailable: {message}"),
            Self::InvalidData(message) => write!(f, "invalid link data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "link repository requires schema version {expected_version}, got {actual_version}"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Backend calls used by matrix sessions.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Lists row entities of one matrix.
    async fn fetch_rows(&self, scope: MatrixScope) -> RepoResult<Vec<FetchedEntity>>;
    /// Lists column entities of one matrix.
    async fn fetch_columns(&self, scope: MatrixScope) -> RepoResult<Vec<FetchedEntity>>;
    /// Links `column_ids` to `row_id`.
    async fn add_links(
        &self,
        kind: AssociationKind,
        row_id: EntityId,
        column_ids: &[EntityId],
    ) -> RepoResult<()>;
    /// Unlinks `column_ids` from `row_id`.
    async fn remove_links(
        &self,
        kind: AssociationKind,
        row_id: EntityId,
        column_ids: &[EntityId],
    ) -> RepoResult<()>;
}

#[async_trait]
impl<T: LinkRepository + ?Sized> LinkRepository for Arc<T> {
    async fn fetch_rows(&self, scope: MatrixScope) -> RepoResult<Vec<FetchedEntity>> {
        (**self).fetch_rows(scope).await
    }

    async fn fetch_columns(&self, scope: MatrixScope) -> RepoResult<Vec<FetchedEntity>> {
        (**self).fetch_columns(scope).await
    }

    async fn add_links(
        &self,
        kind: AssociationKind,
        row_id: EntityId,
        column_ids: &[EntityId],
    ) -> RepoResult<()> {
        (**self).add_links(kind, row_id, column_ids).await
    }

    async fn remove_links(
        &self,
        kind: AssociationKind,
        row_id: EntityId,
        column_ids: &[EntityId],
    ) -> RepoResult<()> {
        (**self).remove_links(kind, row_id, column_ids).await
    }
}
