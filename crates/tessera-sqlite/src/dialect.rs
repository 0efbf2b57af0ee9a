//! SQLite dialect implementation.

use tessera_core::{ColumnType, Dialect};

/// SQLite dialect.
///
/// Booleans are stored as integers, there are no row locks or stored
/// procedures, and `INTERSECT ALL`/`EXCEPT ALL` are missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn identifier_quote(&self) -> char {
        '"' // SQLite also accepts backticks, but double quotes are standard
    }

    fn quotes_identifiers(&self) -> bool {
        true
    }

    fn supports_intersect_except_all(&self) -> bool {
        false
    }

    fn supports_locking(&self) -> bool {
        false
    }

    fn literal_bool(&self, b: bool) -> String {
        String::from(if b { "1" } else { "0" })
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (None, Some(o)) => format!(" LIMIT -1 OFFSET {o}"),
            (Some(l), Some(o)) => format!(" LIMIT {l} OFFSET {o}"),
            (Some(l), None) => format!(" LIMIT {l}"),
            (None, None) => String::new(),
        }
    }

    fn auto_increment_sql(&self, _column_type: &ColumnType) -> String {
        // Only an INTEGER rowid alias may autoincrement.
        String::from("INTEGER PRIMARY KEY AUTOINCREMENT")
    }
}

#[cfg(test)]
mod tests {
    use tessera_core::{col, LockMode, Query, SqlValue};

    use super::*;

    #[test]
    fn test_sqlite_dialect() {
        let dialect = SqliteDialect::new();
        assert_eq!(dialect.name(), "sqlite");
        assert_eq!(dialect.identifier_quote(), '"');
        assert!(dialect.supports_intersect_except());
        assert!(!dialect.supports_intersect_except_all());
        assert!(!dialect.supports_stored_procedures());
        assert_eq!(dialect.literal(&SqlValue::Bool(true)), "1");
    }

    #[test]
    fn test_offset_without_limit() {
        let sql = Query::from("items")
            .offset(5)
            .select_sql(&SqliteDialect::new())
            .unwrap();
        assert_eq!(sql, r#"SELECT * FROM "items" LIMIT -1 OFFSET 5"#);
    }

    #[test]
    fn test_lock_is_dropped() {
        let sql = Query::from("items")
            .filter(col("id").eq(1))
            .lock(LockMode::Update)
            .select_sql(&SqliteDialect::new())
            .unwrap();
        assert_eq!(sql, r#"SELECT * FROM "items" WHERE ("id" = 1)"#);
    }

    #[test]
    fn test_auto_increment_column() {
        let dialect = SqliteDialect::new();
        assert_eq!(
            dialect.auto_increment_sql(&ColumnType::BigInt),
            "INTEGER PRIMARY KEY AUTOINCREMENT"
        );
    }
}
