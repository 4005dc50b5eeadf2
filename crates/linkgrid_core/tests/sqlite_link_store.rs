use linkgrid_core::db::migrations::latest_version;
use linkgrid_core::db::{open_db, open_db_in_memory};
use linkgrid_core::{
    parse_entity_list, AssociationKind, CommitPolicy, EntitySide, FetchedEntity, LinkRepository,
    MatrixEntity, MatrixScope, MatrixSession, RepoError, Snapshot, SqliteLinkRepository,
};
use serde_json::json;

const PO_PLO: MatrixScope = MatrixScope {
    kind: AssociationKind::ProgramObjectivePlo,
    parent_id: 3,
};

fn seeded_repo() -> SqliteLinkRepository {
    let repo = SqliteLinkRepository::try_new(open_db_in_memory().unwrap()).unwrap();
    let rows = vec![
        FetchedEntity::new(MatrixEntity::new(1, "PO1", "Graduates apply math")),
        FetchedEntity::new(MatrixEntity::new(2, "PO2", "Graduates communicate")),
    ];
    // PLOs embed the objectives mapped onto them.
    let columns = vec![
        FetchedEntity::with_links(MatrixEntity::new(10, "PLO1", "").with_position(1), [1]),
        FetchedEntity::with_links(MatrixEntity::new(20, "PLO2", "").with_position(2), [1, 2, 9]),
    ];
    let summary = repo.import_scope(PO_PLO, &rows, &columns).unwrap();
    assert_eq!(summary.links, 3);
    assert_eq!(summary.dropped_links, 1);
    repo
}

#[test]
fn migrations_create_link_tables() {
    let conn = open_db_in_memory().unwrap();

    let version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, latest_version());

    for table in ["matrix_entities", "matrix_links"] {
        let exists: i64 = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
                [table],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(exists, 1, "missing table {table}");
    }

    let mut stmt = conn.prepare("PRAGMA table_info(matrix_links);").unwrap();
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(columns, ["scope_kind", "row_id", "column_id"]);
}

#[test]
fn repository_rejects_unmigrated_connection() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();

    let err = SqliteLinkRepository::try_new(conn).err().unwrap();
    assert!(matches!(
        err,
        RepoError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
}

#[tokio::test]
async fn fetch_embeds_links_on_the_plo_side() {
    let repo = seeded_repo();

    let rows = repo.fetch_rows(PO_PLO).await.unwrap();
    let columns = repo.fetch_columns(PO_PLO).await.unwrap();

    assert!(rows.iter().all(|row| row.linked.is_none()));
    assert_eq!(columns[0].entity.code, "PLO1");
    assert_eq!(columns[0].linked, Some(vec![1]));
    assert_eq!(columns[1].linked, Some(vec![1, 2]));
}

#[tokio::test]
async fn add_and_remove_are_idempotent() {
    let repo = seeded_repo();
    let kind = PO_PLO.kind;

    repo.add_links(kind, 2, &[10, 20]).await.unwrap();
    repo.add_links(kind, 2, &[10]).await.unwrap();
    repo.remove_links(kind, 1, &[20, 20]).await.unwrap();
    repo.remove_links(kind, 1, &[20]).await.unwrap();

    assert_eq!(
        repo.scope_links(PO_PLO).unwrap(),
        Snapshot::from_pairs([(1, 10), (2, 10), (2, 20)])
    );
}

#[tokio::test]
async fn upsert_entity_updates_existing_rows() {
    let repo = seeded_repo();

    repo.upsert_entity(
        PO_PLO,
        EntitySide::Row,
        &MatrixEntity::new(1, "PO1", "Graduates model problems"),
    )
    .unwrap();

    let rows = repo.fetch_rows(PO_PLO).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].entity.label, "Graduates model problems");
}

#[tokio::test]
async fn session_round_trips_through_a_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("links.sqlite3");

    {
        let repo = SqliteLinkRepository::try_new(open_db(&path).unwrap()).unwrap();
        let payload = json!({
            "data": {
                "plos": [
                    {"id": 10, "code": "PLO1", "pos": [{"id": 1}]},
                    {"id": 20, "code": "PLO2", "pos": []}
                ]
            }
        });
        let columns = parse_entity_list(&payload, "plos", "pos").unwrap();
        let rows = parse_entity_list(&json!([{"id": 1, "code": "PO1"}, {"id": 2}]), "pos", "plos")
            .unwrap();
        repo.import_scope(PO_PLO, &rows, &columns).unwrap();

        let mut session = MatrixSession::new(repo, PO_PLO, &CommitPolicy::default());
        session.load().await.unwrap();
        session.toggle(1, 10).unwrap();
        session.toggle(2, 20).unwrap();
        assert!(session.commit().await.unwrap().is_saved());
        assert!(!session.is_dirty());
    }

    let repo = SqliteLinkRepository::try_new(open_db(&path).unwrap()).unwrap();
    assert_eq!(repo.scope_links(PO_PLO).unwrap(), Snapshot::from_pairs([(2, 20)]));
}

#[tokio::test]
async fn mutations_wait_for_locks_off_the_runtime_thread() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("links.sqlite3");
    let repo = SqliteLinkRepository::try_new(open_db(&path).unwrap()).unwrap();

    let blocker = rusqlite::Connection::open(&path).unwrap();
    blocker.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    // On a current-thread runtime the release below only runs once the
    // add call has yielded; a call that blocked in place would time out.
    let (added, released) = futures::join!(
        repo.add_links(PO_PLO.kind, 1, &[10]),
        async move { blocker.execute_batch("COMMIT;") }
    );

    released.unwrap();
    added.unwrap();
    assert_eq!(
        repo.scope_links(PO_PLO).unwrap().link_count(),
        0,
        "links to unseeded entities stay outside the scope view"
    );
    let stored: i64 = rusqlite::Connection::open(&path)
        .unwrap()
        .query_row("SELECT COUNT(*) FROM matrix_links;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, 1);
}
