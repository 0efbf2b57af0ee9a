#![allow(dead_code)]

use tessera_core::{ColumnDef, ColumnType, TableDefinition};
use tessera_db::{ConnectOptions, Database};
use tessera_sqlite::SqliteDriver;

/// An in-memory database on a single connection.
pub fn memory_db() -> Database {
    Database::connect_with(
        ConnectOptions::new("sqlite").with_max_connections(1),
        &SqliteDriver::registry(),
    )
    .unwrap()
}

pub fn items_table() -> TableDefinition {
    TableDefinition::new("items")
        .primary_key("id")
        .column_def(ColumnDef::new("name", ColumnType::String(Some(50))).not_null())
        .integer("qty")
        .unique_index(&["name"])
}

pub async fn items_db() -> Database {
    let db = memory_db();
    db.create_table(items_table()).await.unwrap();
    db
}
