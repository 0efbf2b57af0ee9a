//! DDL rendering of table definitions and schema operations per dialect.

use tessera_core::{
    AlterTable, ColumnDef, ColumnType, GenericDialect, MysqlDialect, PostgresDialect, SchemaOp,
    TableDefinition,
};

fn artists() -> TableDefinition {
    TableDefinition::new("artists")
        .primary_key("id")
        .column_def(ColumnDef::new("name", ColumnType::String(Some(100))).not_null())
        .column(
            "rating",
            ColumnType::Decimal {
                precision: 3,
                scale: 1,
            },
        )
        .unique_index(&["name"])
}

#[test]
fn create_table_with_unique_index() {
    let sql = SchemaOp::CreateTable(artists()).to_sql(&GenericDialect::new());
    assert_eq!(sql.len(), 2);
    assert_eq!(
        sql[1],
        "CREATE UNIQUE INDEX artists_name_index ON artists (name)"
    );
    assert!(sql[0].contains("name VARCHAR(100) NOT NULL"));
    assert!(sql[0].contains("rating DECIMAL(3, 1)"));
}

#[test]
fn auto_increment_per_dialect() {
    let pg = SchemaOp::CreateTable(artists()).to_sql(&PostgresDialect::new());
    assert!(pg[0].starts_with("CREATE TABLE \"artists\" (\"id\" SERIAL PRIMARY KEY"));
    let my = SchemaOp::CreateTable(artists()).to_sql(&MysqlDialect::new());
    assert!(my[0].starts_with("CREATE TABLE `artists` (`id` INTEGER PRIMARY KEY AUTO_INCREMENT"));
}

#[test]
fn reversing_an_alter_block() {
    let ops = AlterTable::new("artists")
        .add_column(ColumnDef::new("country", ColumnType::Text))
        .rename_column("rating", "score")
        .into_ops();
    let reversed: Vec<SchemaOp> = ops.iter().rev().filter_map(SchemaOp::reverse).collect();
    let d = GenericDialect::new();
    let sql: Vec<String> = reversed.iter().flat_map(|op| op.to_sql(&d)).collect();
    assert_eq!(
        sql,
        vec![
            "ALTER TABLE artists RENAME COLUMN score TO rating",
            "ALTER TABLE artists DROP COLUMN country",
        ]
    );
}

#[test]
fn drop_table_if_exists() {
    let op = SchemaOp::DropTable {
        name: String::from("artists"),
        if_exists: true,
    };
    assert_eq!(
        op.to_sql(&GenericDialect::new()),
        vec!["DROP TABLE IF EXISTS artists"]
    );
    assert!(op.reverse().is_none());
}
