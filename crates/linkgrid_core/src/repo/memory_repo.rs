//! In-memory link repository with failure injection.
//!
//! # Responsibility
//! - Serve fetch/add/remove calls from process memory.
//! - Let callers force individual calls to fail and count dispatched calls.
//!
//! # Invariants
//! - Failed calls leave stored links untouched.
//! - Successful calls apply immediately and independently of each other.

use crate::model::entity::{AssociationKind, EntityId, EntitySide, MatrixEntity, MatrixScope};
use crate::model::snapshot::Snapshot;
use crate::normalize::FetchedEntity;
use crate::repo::link_repo::{LinkRepository, RepoError, RepoResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    rows: HashMap<MatrixScope, Vec<MatrixEntity>>,
    columns: HashMap<MatrixScope, Vec<MatrixEntity>>,
    links: HashMap<AssociationKind, Snapshot>,
    fail_fetch: bool,
    fail_add: HashSet<EntityId>,
    fail_remove: HashSet<EntityId>,
}

/// Per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub fetches: usize,
    pub adds: usize,
    pub removes: usize,
}

/// Thread-safe in-memory `LinkRepository`.
#[derive(Debug, Default)]
pub struct InMemoryLinkRepository {
    state: Mutex<MemoryState>,
    fetches: AtomicUsize,
    adds: AtomicUsize,
    removes: AtomicUsize,
}

impl InMemoryLinkRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the row list of one scope.
    pub fn set_rows(&self, scope: MatrixScope, rows: Vec<MatrixEntity>) -> RepoResult<()> {
        self.lock()?.rows.insert(scope, rows);
        Ok(())
    }

    /// Replaces the column list of one scope.
    pub fn set_columns(&self, scope: MatrixScope, columns: Vec<MatrixEntity>) -> RepoResult<()> {
        self.lock()?.columns.insert(scope, columns);
        Ok(())
    }

    /// Stores one link directly, bypassing failure injection and counters.
    pub fn link(&self, kind: AssociationKind, row_id: EntityId, column_id: EntityId) -> RepoResult<()> {
        self.lock()?
            .links
            .entry(kind)
            .or_default()
            .insert(row_id, column_id);
        Ok(())
    }

    /// Current stored links of one association kind.
    pub fn links(&self, kind: AssociationKind) -> RepoResult<Snapshot> {
        Ok(self.lock()?.links.get(&kind).cloned().unwrap_or_default())
    }

    /// Makes every fetch fail until cleared.
    pub fn fail_fetch(&self, fail: bool) -> RepoResult<()> {
        self.lock()?.fail_fetch = fail;
        Ok(())
    }

    /// Makes `add_links` for `row_id` fail until cleared.
    pub fn fail_add_for(&self, row_id: EntityId) -> RepoResult<()> {
        self.lock()?.fail_add.insert(row_id);
        Ok(())
    }

    /// Makes `remove_links` for `row_id` fail until cleared.
    pub fn fail_remove_for(&self, row_id: EntityId) -> RepoResult<()> {
        self.lock()?.fail_remove.insert(row_id);
        Ok(())
    }

    pub fn clear_failures(&self) -> RepoResult<()> {
        let mut state = self.lock()?;
        state.fail_fetch = false;
        state.fail_add.clear();
        state.fail_remove.clear();
        Ok(())
    }

    pub fn call_counts(&self) -> CallCounts {
        CallCounts {
            fetches: self.fetches.load(Ordering::SeqCst),
            adds: self.adds.load(Ordering::SeqCst),
            removes: self.removes.load(Ordering::SeqCst),
        }
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| RepoError::Unavailable("in-memory state lock poisoned".to_string()))
    }

    fn fetch_side(&self, scope: MatrixScope, side: EntitySide) -> RepoResult<Vec<FetchedEntity>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.lock()?;
        if state.fail_fetch {
            return Err(RepoError::Unavailable(format!("fetch failed for {scope}")));
        }

        let empty = Vec::new();
        let entities = match side {
            EntitySide::Row => state.rows.get(&scope),
            EntitySide::Column => state.columns.get(&scope),
        }
        .unwrap_or(&empty);

        if side != scope.kind.default_embedding().owner_side() {
            return Ok(entities.iter().cloned().map(FetchedEntity::new).collect());
        }

        let counterparts: HashSet<EntityId> = match side {
            EntitySide::Row => state.columns.get(&scope),
            EntitySide::Column => state.rows.get(&scope),
        }
        .into_iter()
        .flatten()
        .map(|entity| entity.id)
        .collect();
        let links = state.links.get(&scope.kind).cloned().unwrap_or_default();
        Ok(entities
            .iter()
            .cloned()
            .map(|entity| {
                let linked: Vec<EntityId> = match side {
                    EntitySide::Row => links
                        .links(entity.id)
                        .map(|set| set.iter().collect())
                        .unwrap_or_default(),
                    EntitySide::Column => links.rows_linked_to(entity.id),
                };
                FetchedEntity::with_links(
                    entity,
                    linked.into_iter().filter(|id| counterparts.contains(id)),
                )
            })
            .collect())
    }
}

#[async_trait]
impl LinkRepository for InMemoryLinkRepository {
    async fn fetch_rows(&self, scope: MatrixScope) -> RepoResult<Vec<FetchedEntity>> {
        self.fetch_side(scope, EntitySide::Row)
    }

    async fn fetch_columns(&self, scope: MatrixScope) -> RepoResult<Vec<FetchedEntity>> {
        self.fetch_side(scope, EntitySide::Column)
    }

    async fn add_links(
        &self,
        kind: AssociationKind,
        row_id: EntityId,
        column_ids: &[EntityId],
    ) -> RepoResult<()> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock()?;
        if state.fail_add.contains(&row_id) {
            return Err(RepoError::Rejected(format!("add refused for row {row_id}")));
        }
        let links = state.links.entry(kind).or_default();
        for &column_id in column_ids {
            links.insert(row_id, column_id);
        }
        Ok(())
    }

    async fn remove_links(
        &self,
        kind: AssociationKind,
        row_id: EntityId,
        column_ids: &[EntityId],
    ) -> RepoResult<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock()?;
        if state.fail_remove.contains(&row_id) {
            return Err(RepoError::Rejected(format!("remove refused for row {row_id}")));
        }
        if let Some(links) = state.links.get_mut(&kind) {
            for &column_id in column_ids {
                links.remove(row_id, column_id);
            }
        }
        Ok(())
    }
}
