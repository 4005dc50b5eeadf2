//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register link-store schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "matrix_entities",
        sql: include_str!("0001_matrix_entities.sql"),
    },
    Migration {
        version: 2,
        name: "matrix_links",
        sql: include_str!("0002_matrix_links.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    apply_migration_set(conn, MIGRATIONS)
}

fn apply_migration_set(conn: &mut Connection, migrations: &[Migration]) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = migrations.last().map_or(0, |migration| migration.version);

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    // One transaction for the whole set: a failing step leaves the store at
    // `current_version`.
    let tx = conn.transaction()?;
    let mut applied = Vec::new();
    for migration in migrations.iter().filter(|m| m.version > current_version) {
        let step = tx.execute_batch(migration.sql).and_then(|()| {
            tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))
        });
        if let Err(source) = step {
            error!(
                "event=db_migrate module=db status=error from_version={} failed_version={} migration={}",
                current_version, migration.version, migration.name
            );
            return Err(DbError::Migration {
                version: migration.version,
                name: migration.name,
                source,
            });
        }
        applied.push(migration.name);
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={} applied={}",
        current_version,
        latest,
        applied.join(",")
    );
    Ok(())
}

/// Reads `PRAGMA user_version` from the connection.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::{apply_migration_set, current_user_version, latest_version, Migration, MIGRATIONS};
    use crate::db::DbError;
    use rusqlite::Connection;

    #[test]
    fn registry_versions_are_strictly_increasing() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
        assert_eq!(latest_version(), 2);
    }

    #[test]
    fn failing_step_names_the_migration_and_keeps_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        let broken = [
            MIGRATIONS[0],
            Migration {
                version: 2,
                name: "matrix_links",
                sql: "CREATE TABLE matrix_links (row_id INTEGER,",
            },
        ];

        let err = apply_migration_set(&mut conn, &broken).unwrap_err();

        assert!(matches!(
            err,
            DbError::Migration {
                version: 2,
                name: "matrix_links",
                ..
            }
        ));
        assert_eq!(current_user_version(&conn).unwrap(), 0);
        let entities_exist: i64 = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name = 'matrix_entities');",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(entities_exist, 0);
    }
}
