//! SQLite-backed link repository.
//!
//! # Responsibility
//! - Persist matrix entities and links in `matrix_entities`/`matrix_links`.
//! - Serve the `LinkRepository` contract over one owned connection.
//!
//! # Invariants
//! - The connection must be migrated to the latest schema version.
//! - Link mutations are idempotent: `INSERT OR IGNORE` and plain `DELETE`.
//! - Each add/remove call is applied in its own transaction.
//! - Async contract calls run on tokio's blocking pool, never on the
//!   executor thread that polls them.

use crate::db::migrations::{current_user_version, latest_version};
use crate::model::entity::{AssociationKind, EntityId, EntitySide, MatrixEntity, MatrixScope};
use crate::model::snapshot::Snapshot;
use crate::normalize::{build_snapshot, FetchedEntity};
use crate::repo::link_repo::{LinkRepository, RepoError, RepoResult};
use async_trait::async_trait;
use log::info;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task;

const ENTITY_SELECT_SQL: &str = "SELECT entity_id, code, label, position
FROM matrix_entities
WHERE scope_kind = ?1 AND parent_id = ?2 AND side = ?3
ORDER BY position IS NULL, position ASC, entity_id ASC;";

const SCOPE_LINKS_SQL: &str = "SELECT l.row_id, l.column_id
FROM matrix_links l
JOIN matrix_entities r
  ON r.scope_kind = l.scope_kind AND r.parent_id = ?2 AND r.side = 'row' AND r.entity_id = l.row_id
JOIN matrix_entities c
  ON c.scope_kind = l.scope_kind AND c.parent_id = ?2 AND c.side = 'column' AND c.entity_id = l.column_id
WHERE l.scope_kind = ?1;";

const ADD_LINK_SQL: &str = "INSERT OR IGNORE INTO matrix_links (scope_kind, row_id, column_id)
VALUES (?1, ?2, ?3);";

const REMOVE_LINK_SQL: &str =
    "DELETE FROM matrix_links WHERE scope_kind = ?1 AND row_id = ?2 AND column_id = ?3;";

/// Counts written by one `import_scope` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub rows: usize,
    pub columns: usize,
    pub links: usize,
    pub dropped_links: usize,
}

/// SQLite-backed `LinkRepository`.
pub struct SqliteLinkRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLinkRepository {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when the schema version is not the latest.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        let actual_version = current_user_version(&conn)?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Inserts or updates one entity of a scope.
    pub fn upsert_entity(
        &self,
        scope: MatrixScope,
        side: EntitySide,
        entity: &MatrixEntity,
    ) -> RepoResult<()> {
        let conn = self.lock()?;
        upsert_entity_on(&conn, scope, side, entity)?;
        Ok(())
    }

    /// Imports fetched rows/columns (with embedded links) into one scope.
    ///
    /// Links are read from the embedding side of `scope.kind`; links to
    /// entities outside the imported lists are skipped and counted.
    pub fn import_scope(
        &self,
        scope: MatrixScope,
        rows: &[FetchedEntity],
        columns: &[FetchedEntity],
    ) -> RepoResult<ImportSummary> {
        let (links, report) = build_snapshot(rows, columns, scope.kind.default_embedding())
            .map_err(|err| RepoError::InvalidData(err.to_string()))?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for fetched in rows {
            upsert_entity_on(&tx, scope, EntitySide::Row, &fetched.entity)?;
        }
        for fetched in columns {
            upsert_entity_on(&tx, scope, EntitySide::Column, &fetched.entity)?;
        }
        for (row_id, columns_of_row) in links.iter() {
            for column_id in columns_of_row.iter() {
                tx.execute(ADD_LINK_SQL, params![scope.kind.as_str(), row_id, column_id])?;
            }
        }
        tx.commit()?;

        let summary = ImportSummary {
            rows: rows.len(),
            columns: columns.len(),
            links: links.link_count(),
            dropped_links: report.dropped_links,
        };
        info!(
            "event=scope_import module=repo status=ok scope={} rows={} columns={} links={} dropped_links={}",
            scope, summary.rows, summary.columns, summary.links, summary.dropped_links
        );
        Ok(summary)
    }

    /// Stored links of one scope as a snapshot.
    pub fn scope_links(&self, scope: MatrixScope) -> RepoResult<Snapshot> {
        let conn = self.lock()?;
        load_scope_links(&conn, scope)
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, Connection>> {
        lock_connection(&self.conn)
    }

    /// Runs `work` against the connection on the blocking pool.
    async fn run_blocking<T, F>(&self, op: &'static str, work: F) -> RepoResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> RepoResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let mut guard = lock_connection(&conn)?;
            work(&mut guard)
        })
        .await
        .map_err(|err| RepoError::Unavailable(format!("sqlite worker for {op} failed: {err}")))?
    }
}

fn lock_connection(conn: &Mutex<Connection>) -> RepoResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| RepoError::Unavailable("sqlite connection lock poisoned".to_string()))
}

fn fetch_side_on(
    conn: &Connection,
    scope: MatrixScope,
    side: EntitySide,
) -> RepoResult<Vec<FetchedEntity>> {
    let mut stmt = conn.prepare(ENTITY_SELECT_SQL)?;
    let mut rows = stmt.query(params![scope.kind.as_str(), scope.parent_id, side.as_str()])?;
    let mut entities = Vec::new();
    while let Some(row) = rows.next()? {
        entities.push(MatrixEntity {
            id: row.get("entity_id")?,
            code: row.get("code")?,
            label: row.get("label")?,
            position: row.get("position")?,
        });
    }

    if side != scope.kind.default_embedding().owner_side() {
        return Ok(entities.into_iter().map(FetchedEntity::new).collect());
    }

    let links = load_scope_links(conn, scope)?;
    Ok(entities
        .into_iter()
        .map(|entity| {
            let linked: Vec<EntityId> = match side {
                EntitySide::Row => links
                    .links(entity.id)
                    .map(|set| set.iter().collect())
                    .unwrap_or_default(),
                EntitySide::Column => links.rows_linked_to(entity.id),
            };
            FetchedEntity::with_links(entity, linked)
        })
        .collect())
}

fn mutate_links_on(
    conn: &mut Connection,
    kind: AssociationKind,
    row_id: EntityId,
    column_ids: &[EntityId],
    sql: &str,
) -> RepoResult<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(sql)?;
        for column_id in column_ids {
            stmt.execute(params![kind.as_str(), row_id, column_id])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn upsert_entity_on(
    conn: &Connection,
    scope: MatrixScope,
    side: EntitySide,
    entity: &MatrixEntity,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO matrix_entities (scope_kind, parent_id, side, entity_id, code, label, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (scope_kind, parent_id, side, entity_id) DO UPDATE SET
            code = excluded.code,
            label = excluded.label,
            position = excluded.position;",
        params![
            scope.kind.as_str(),
            scope.parent_id,
            side.as_str(),
            entity.id,
            entity.code.as_str(),
            entity.label.as_str(),
            entity.position,
        ],
    )
}

fn load_scope_links(conn: &Connection, scope: MatrixScope) -> RepoResult<Snapshot> {
    let mut stmt = conn.prepare(SCOPE_LINKS_SQL)?;
    let mut rows = stmt.query(params![scope.kind.as_str(), scope.parent_id])?;
    let mut snapshot = Snapshot::new();
    while let Some(row) = rows.next()? {
        snapshot.insert(row.get(0)?, row.get(1)?);
    }
    Ok(snapshot)
}

#[async_trait]
impl LinkRepository for SqliteLinkRepository {
    async fn fetch_rows(&self, scope: MatrixScope) -> RepoResult<Vec<FetchedEntity>> {
        self.run_blocking("fetch_rows", move |conn| {
            fetch_side_on(conn, scope, EntitySide::Row)
        })
        .await
    }

    async fn fetch_columns(&self, scope: MatrixScope) -> RepoResult<Vec<FetchedEntity>> {
        self.run_blocking("fetch_columns", move |conn| {
            fetch_side_on(conn, scope, EntitySide::Column)
        })
        .await
    }

    async fn add_links(
        &self,
        kind: AssociationKind,
        row_id: EntityId,
        column_ids: &[EntityId],
    ) -> RepoResult<()> {
        let column_ids = column_ids.to_vec();
        self.run_blocking("add_links", move |conn| {
            mutate_links_on(conn, kind, row_id, &column_ids, ADD_LINK_SQL)
        })
        .await
    }

    async fn remove_links(
        &self,
        kind: AssociationKind,
        row_id: EntityId,
        column_ids: &[EntityId],
    ) -> RepoResult<()> {
        let column_ids = column_ids.to_vec();
        self.run_blocking("remove_links", move |conn| {
            mutate_links_on(conn, kind, row_id, &column_ids, REMOVE_LINK_SQL)
        })
        .await
    }
}
