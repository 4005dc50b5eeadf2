//! One editing session over one association matrix.
//!
//! # Responsibility
//! - Load rows/columns for a scope and keep the matrix in sync with the
//!   backend across commits.
//! - Gate local edits and commits on the session state.
//!
//! # Invariants
//! - State flow: `Loading -> Ready -> Committing -> Ready`, with
//!   `LoadFailed` on any fetch failure. Dirty/clean is derived from the
//!   matrix, not stored.
//! - Edits and commits are rejected while `Committing`.
//! - A failed commit never modifies the working copy and never refetches
//!   unless `rebase_after_failure` is set.
//! - Only `load`/`reload` leave `LoadFailed` or a `Committing` state whose
//!   commit future was dropped.

use crate::commit::{CommitCoordinator, CommitOutcome, CommitReport};
use crate::config::CommitPolicy;
use crate::matrix::{LinkMatrix, MatrixError};
use crate::model::entity::{EntityId, LinkEmbedding, MatrixScope};
use crate::normalize::{source_from_fetch, MatrixSource, NormalizeError};
use crate::repo::link_repo::{LinkRepository, RepoError};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Lifecycle state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state and the state during `load`/`reload`.
    Loading,
    /// Matrix loaded; may be clean or dirty.
    Ready,
    /// A commit is in flight.
    Committing,
    /// The last fetch failed; no matrix is usable.
    LoadFailed(String),
}

/// Fetch-side failures.
#[derive(Debug)]
pub enum LoadError {
    Repo(RepoError),
    Normalize(NormalizeError),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Normalize(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Normalize(err) => Some(err),
        }
    }
}

impl From<RepoError> for LoadError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<NormalizeError> for LoadError {
    fn from(value: NormalizeError) -> Self {
        Self::Normalize(value)
    }
}

/// Errors from session operations.
#[derive(Debug)]
pub enum SessionError {
    /// Operation needs a loaded matrix.
    NotReady,
    /// A commit is already in flight.
    CommitInFlight,
    /// Local edit referenced an unknown row/column.
    Matrix(MatrixError),
    /// Loading rows/columns failed.
    Load(LoadError),
    /// The commit succeeded but the follow-up refetch failed.
    Refetch {
        report: CommitReport,
        source: LoadError,
    },
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReady => write!(f, "matrix is not loaded"),
            Self::CommitInFlight => write!(f, "a commit is already in progress"),
            Self::Matrix(err) => write!(f, "{err}"),
            Self::Load(err) => write!(f, "failed to load matrix: {err}"),
            Self::Refetch { source, .. } => {
                write!(f, "changes saved but reloading the matrix failed: {source}")
            }
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotReady | Self::CommitInFlight => None,
            Self::Matrix(err) => Some(err),
            Self::Load(err) => Some(err),
            Self::Refetch { source, .. } => Some(source),
        }
    }
}

impl From<MatrixError> for SessionError {
    fn from(value: MatrixError) -> Self {
        Self::Matrix(value)
    }
}

impl From<LoadError> for SessionError {
    fn from(value: LoadError) -> Self {
        Self::Load(value)
    }
}

/// Editing session for one `MatrixScope`.
pub struct MatrixSession<R> {
    scope: MatrixScope,
    embedding: LinkEmbedding,
    coordinator: CommitCoordinator<R>,
    rebase_after_failure: bool,
    matrix: LinkMatrix,
    state: SessionState,
    generation: u64,
}

impl<R: LinkRepository> MatrixSession<R> {
    /// Creates an unloaded session. Call `load` before editing.
    pub fn new(repo: R, scope: MatrixScope, policy: &CommitPolicy) -> Self {
        Self {
            scope,
            embedding: scope.kind.default_embedding(),
            coordinator: CommitCoordinator::new(repo).with_max_in_flight(policy.max_in_flight),
            rebase_after_failure: policy.rebase_after_failure,
            matrix: LinkMatrix::new(),
            state: SessionState::Loading,
            generation: 0,
        }
    }

    /// Overrides which side embeds links in fetched payloads.
    pub fn with_embedding(mut self, embedding: LinkEmbedding) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn scope(&self) -> MatrixScope {
        self.scope
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn matrix(&self) -> &LinkMatrix {
        &self.matrix
    }

    pub fn repo(&self) -> &R {
        self.coordinator.repo()
    }

    pub fn is_dirty(&self) -> bool {
        self.state == SessionState::Ready && self.matrix.is_dirty()
    }

    /// Fetches rows and columns and initializes the matrix.
    ///
    /// On failure the session enters `LoadFailed` and keeps no partial matrix.
    pub async fn load(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Loading;
        match self.fetch_source().await {
            Ok(source) => {
                self.matrix.initialize(source);
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(err) => {
                self.matrix = LinkMatrix::new();
                self.state = SessionState::LoadFailed(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Discards local state and loads again.
    pub async fn reload(&mut self) -> Result<(), SessionError> {
        self.load().await
    }

    /// Flips one link in the working copy.
    pub fn toggle(&mut self, row_id: EntityId, column_id: EntityId) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        Ok(self.matrix.toggle(row_id, column_id)?)
    }

    /// Sets one link in the working copy.
    pub fn set_link(
        &mut self,
        row_id: EntityId,
        column_id: EntityId,
        linked: bool,
    ) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        Ok(self.matrix.set_link(row_id, column_id, linked)?)
    }

    /// Replaces one row's links in the working copy.
    pub fn set_row(
        &mut self,
        row_id: EntityId,
        column_ids: impl IntoIterator<Item = EntityId>,
    ) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        Ok(self.matrix.set_row(row_id, column_ids)?)
    }

    pub fn clear_row(&mut self, row_id: EntityId) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        Ok(self.matrix.clear_row(row_id)?)
    }

    /// Links or unlinks one column against every row.
    pub fn set_column(&mut self, column_id: EntityId, linked: bool) -> Result<usize, SessionError> {
        self.ensure_editable()?;
        Ok(self.matrix.set_column(column_id, linked)?)
    }

    /// Drops local edits.
    pub fn discard_changes(&mut self) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        Ok(self.matrix.discard_changes())
    }

    /// Sends the current delta to the backend.
    ///
    /// - Empty delta: `NothingToSave`, no calls, no state change.
    /// - All calls succeed: refetch and re-initialize; the matrix is clean.
    /// - Any call fails: `Failed` with the per-call report; working copy kept.
    pub async fn commit(&mut self) -> Result<CommitOutcome, SessionError> {
        self.ensure_editable()?;

        let delta = self.matrix.delta();
        if delta.is_empty() {
            info!(
                "event=session_commit module=session status=skipped scope={} reason=nothing_to_save",
                self.scope
            );
            return Ok(CommitOutcome::NothingToSave);
        }

        self.state = SessionState::Committing;
        let outcome = self.coordinator.commit(self.scope.kind, &delta).await;

        match outcome {
            CommitOutcome::Saved(report) => match self.fetch_source().await {
                Ok(source) => {
                    self.matrix.initialize(source);
                    self.state = SessionState::Ready;
                    Ok(CommitOutcome::Saved(report))
                }
                Err(err) => {
                    error!(
                        "event=session_commit module=session status=error scope={} stage=refetch error={}",
                        self.scope, err
                    );
                    self.matrix = LinkMatrix::new();
                    self.state = SessionState::LoadFailed(err.to_string());
                    Err(SessionError::Refetch {
                        report,
                        source: err,
                    })
                }
            },
            CommitOutcome::Failed(report) => {
                if self.rebase_after_failure {
                    self.rebase_onto_backend().await;
                }
                self.state = SessionState::Ready;
                Ok(CommitOutcome::Failed(report))
            }
            CommitOutcome::NothingToSave => {
                self.state = SessionState::Ready;
                Ok(CommitOutcome::NothingToSave)
            }
        }
    }

    async fn rebase_onto_backend(&mut self) {
        match self.fetch_source().await {
            Ok(source) => {
                self.matrix.rebase(source);
                info!(
                    "event=session_rebase module=session status=ok scope={} remaining_calls={}",
                    self.scope,
                    self.matrix.delta().call_count()
                );
            }
            Err(err) => {
                warn!(
                    "event=session_rebase module=session status=error scope={} error={}",
                    self.scope, err
                );
            }
        }
    }

    async fn fetch_source(&mut self) -> Result<MatrixSource, LoadError> {
        self.generation += 1;
        let generation = self.generation;
        let started_at = Instant::now();
        let repo = self.coordinator.repo();

        let fetched = futures::try_join!(repo.fetch_rows(self.scope), repo.fetch_columns(self.scope));
        let result = fetched
            .map_err(LoadError::from)
            .and_then(|(rows, columns)| {
                source_from_fetch(generation, rows, columns, self.embedding).map_err(LoadError::from)
            });

        match &result {
            Ok(source) => info!(
                "event=session_load module=session status=ok scope={} generation={} rows={} columns={} duration_ms={}",
                self.scope,
                generation,
                source.rows.len(),
                source.columns.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=session_load module=session status=error scope={} generation={} duration_ms={} error={}",
                self.scope,
                generation,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn ensure_editable(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Committing => Err(SessionError::CommitInFlight),
            SessionState::Loading | SessionState::LoadFailed(_) => Err(SessionError::NotReady),
        }
    }
}
