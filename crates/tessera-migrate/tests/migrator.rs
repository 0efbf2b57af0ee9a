//! Running migrations against the recording driver and in-memory SQLite.

use tessera_core::{col, lit, AlterTable, ColumnDef, ColumnType, InsertValues, SchemaOp, TableDefinition};
use tessera_db::{ConnectOptions, Database, MockDriver};
use tessera_migrate::{MigrateError, Migration, Migrator};
use tessera_sqlite::SqliteDriver;

fn memory_db() -> Database {
    Database::connect_with(
        ConnectOptions::new("sqlite").with_max_connections(1),
        &SqliteDriver::registry(),
    )
    .unwrap()
}

fn migrations() -> Vec<Migration> {
    vec![
        Migration::new(1, "create artists").create_table(
            TableDefinition::new("artists")
                .primary_key("id")
                .column_def(ColumnDef::new("name", ColumnType::String(Some(100))).not_null()),
        ),
        Migration::new(2, "add genre").alter_table(
            AlterTable::new("artists")
                .add_column(ColumnDef::new("genre", ColumnType::Text))
                .add_index(&["genre"]),
        ),
        Migration::new(3, "seed")
            .up(SchemaOp::raw("INSERT INTO artists (name) VALUES ('Nina')", None))
            .down(SchemaOp::raw("DELETE FROM artists", None)),
    ]
}

#[tokio::test]
async fn test_run_and_revert_on_sqlite() {
    let db = memory_db();
    let migrator = Migrator::new(db.clone(), migrations()).unwrap();

    assert_eq!(migrator.current_version().await.unwrap(), 0);
    assert_eq!(migrator.pending().await.unwrap().len(), 3);

    assert_eq!(migrator.run().await.unwrap(), 3);
    assert!(migrator.pending().await.unwrap().is_empty());
    assert_eq!(db.schema("artists").await.unwrap().to_vec(), vec!["id", "name", "genre"]);
    assert_eq!(db.from("artists").count().await.unwrap(), 1);

    // Running again is a no-op.
    assert_eq!(migrator.run().await.unwrap(), 3);
    assert_eq!(db.from("artists").count().await.unwrap(), 1);

    assert_eq!(migrator.run_to(1).await.unwrap(), 1);
    assert_eq!(db.schema("artists").await.unwrap().to_vec(), vec!["id", "name"]);
    assert_eq!(db.from("artists").count().await.unwrap(), 0);

    assert_eq!(migrator.run_to(0).await.unwrap(), 0);
    assert!(!db.table_exists("artists").await.unwrap());
    assert_eq!(db.from("schema_info").count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_migration_keeps_previous_version() {
    let db = memory_db();
    let broken = Migration::new(2, "broken")
        .up(SchemaOp::raw("CREATE TABLE scratch (id INTEGER)", None))
        .up(SchemaOp::raw("CREATE TABLE artists (id INTEGER)", None))
        .down(SchemaOp::drop_table("scratch"));
    let migrator = Migrator::new(db.clone(), [migrations().remove(0), broken]).unwrap();

    assert!(matches!(
        migrator.run().await.unwrap_err(),
        MigrateError::Database(_)
    ));
    assert_eq!(migrator.current_version().await.unwrap(), 1);
    assert!(!db.table_exists("scratch").await.unwrap());
}

#[tokio::test]
async fn test_irreversible_migration_fails_before_sql() {
    let db = memory_db();
    let migrator = Migrator::new(
        db.clone(),
        [
            migrations().remove(0),
            Migration::new(2, "drop names").alter_table(AlterTable::new("artists").drop_column("name")),
        ],
    )
    .unwrap();
    migrator.run_to(1).await.unwrap();
    db.from("artists")
        .insert(InsertValues::named([("name", lit("Nina"))]))
        .await
        .unwrap();

    migrator.run().await.unwrap();
    assert!(matches!(
        migrator.run_to(0).await.unwrap_err(),
        MigrateError::Irreversible { version: 2, .. }
    ));
    assert_eq!(migrator.current_version().await.unwrap(), 2);
    assert_eq!(
        db.from("artists").filter(col("id").eq(1)).count().await.unwrap(),
        1
    );
}

#[test]
fn test_duplicate_versions_are_rejected() {
    let db = MockDriver::new().database(ConnectOptions::new("mock"));
    let err = Migrator::new(
        db,
        [migrations().remove(0), Migration::new(1, "again").up(SchemaOp::drop_table("x"))],
    )
    .unwrap_err();
    assert!(matches!(err, MigrateError::DuplicateVersion(1)));
}

#[test]
fn test_mixed_migration_fails_at_load() {
    let driver = MockDriver::new();
    let db = driver.database(ConnectOptions::new("mock"));
    let mixed = Migration::new(7, "mixed")
        .change(SchemaOp::drop_table("a"))
        .up(SchemaOp::drop_table("b"));
    assert!(matches!(
        Migrator::new(db, [mixed]).unwrap_err(),
        MigrateError::Config { version: 7, .. }
    ));
    assert!(driver.sqls().is_empty());
}

#[tokio::test]
async fn test_each_migration_runs_in_its_own_transaction() {
    let driver = MockDriver::new();
    let db = driver.database(ConnectOptions::new("mock"));
    let migrator = Migrator::new(db, migrations().into_iter().take(1)).unwrap();
    migrator.run().await.unwrap();

    let sqls = driver.sqls();
    let begin = sqls.iter().position(|s| s == "BEGIN").unwrap();
    assert!(sqls[begin + 1].starts_with("CREATE TABLE artists"));
    assert_eq!(sqls[begin + 2], "UPDATE schema_info SET version = 1");
    assert_eq!(sqls[begin + 3], "COMMIT");
}
