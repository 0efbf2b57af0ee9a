//! MySQL dialect.

use super::Dialect;
use crate::schema::ColumnType;

/// MySQL dialect.
///
/// MySQL treats backslash as an escape character inside string literals, so
/// the string escaper doubles both quotes and backslashes. It lacks
/// `INTERSECT`/`EXCEPT` and has no boolean literals.
#[derive(Debug, Default, Clone, Copy)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn identifier_quote(&self) -> char {
        '`'
    }

    fn quotes_identifiers(&self) -> bool {
        true
    }

    fn supports_intersect_except(&self) -> bool {
        false
    }

    fn supports_stored_procedures(&self) -> bool {
        true
    }

    fn literal_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn literal_bool(&self, b: bool) -> String {
        String::from(if b { "1" } else { "0" })
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (None, Some(o)) => format!(" LIMIT {} OFFSET {o}", u64::MAX),
            (Some(l), Some(o)) => format!(" LIMIT {l} OFFSET {o}"),
            (Some(l), None) => format!(" LIMIT {l}"),
            (None, None) => String::new(),
        }
    }

    fn column_type_sql(&self, column_type: &ColumnType) -> String {
        match column_type {
            ColumnType::Boolean => String::from("TINYINT(1)"),
            ColumnType::String(None) => String::from("VARCHAR(255)"),
            other => other.to_sql(),
        }
    }

    fn auto_increment_sql(&self, column_type: &ColumnType) -> String {
        format!(
            "{} PRIMARY KEY AUTO_INCREMENT",
            self.column_type_sql(column_type)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::CallKind;
    use crate::value::SqlValue;

    #[test]
    fn test_mysql_escapes_backslashes() {
        let d = MysqlDialect::new();
        assert_eq!(d.literal(&SqlValue::Text(String::from("a\\'b"))), "'a\\\\''b'");
        assert_eq!(d.literal(&SqlValue::Bool(false)), "0");
    }

    #[test]
    fn test_mysql_capabilities() {
        let d = MysqlDialect::new();
        assert!(!d.supports_intersect_except());
        assert!(!d.supports_intersect_except_all());
        assert_eq!(d.literal_identifier("users.id"), "`users`.`id`");
        assert_eq!(
            d.limit_clause(None, Some(3)),
            " LIMIT 18446744073709551615 OFFSET 3"
        );
    }

    #[test]
    fn test_mysql_call() {
        let d = MysqlDialect::new();
        assert_eq!(
            d.call_procedure_sql(CallKind::Select, "find_user", &[SqlValue::Text(String::from("bob"))])
                .unwrap(),
            "CALL `find_user`('bob')"
        );
    }
}
