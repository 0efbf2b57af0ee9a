//! SQL Dialect support.
//!
//! Different databases have slightly different SQL syntax. This module provides
//! a trait for dialect-specific behavior: literal formats, identifier quoting,
//! limit syntax, capability flags and DDL type names.

mod generic;
mod mysql;
mod postgres;

pub use generic::GenericDialect;
pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{CoreError, Result};
use crate::query::CallKind;
use crate::schema::ColumnType;
use crate::value::SqlValue;

/// Trait for SQL dialect-specific behavior.
///
/// Every method has an ANSI-flavoured default; dialects override only what
/// differs. Implementations must be stateless or immutable so a single
/// instance can be shared by every dataset of a database.
pub trait Dialect: fmt::Debug + Send + Sync {
    /// Returns the name of the dialect.
    fn name(&self) -> &'static str;

    /// Returns the identifier quote character.
    fn identifier_quote(&self) -> char {
        '"'
    }

    /// Whether identifiers are quoted when rendered into DML.
    fn quotes_identifiers(&self) -> bool {
        false
    }

    /// Quotes an identifier unconditionally, doubling embedded quotes.
    fn quote_identifier(&self, name: &str) -> String {
        let quote = self.identifier_quote();
        let doubled: String = [quote, quote].iter().collect();
        format!(
            "{quote}{}{quote}",
            name.replace(quote, &doubled)
        )
    }

    /// Renders a possibly qualified identifier (`table.column`), quoting each
    /// part when the dialect quotes identifiers.
    fn literal_identifier(&self, name: &str) -> String {
        if !self.quotes_identifiers() {
            return name.to_string();
        }
        name.split('.')
            .map(|part| {
                if part == "*" {
                    part.to_string()
                } else {
                    self.quote_identifier(part)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Whether `INTERSECT` and `EXCEPT` are available.
    fn supports_intersect_except(&self) -> bool {
        true
    }

    /// Whether `INTERSECT ALL` and `EXCEPT ALL` are available.
    fn supports_intersect_except_all(&self) -> bool {
        self.supports_intersect_except()
    }

    /// Whether `FOR UPDATE` / `FOR SHARE` locking clauses are available.
    fn supports_locking(&self) -> bool {
        true
    }

    /// Whether nested transactions can use `SAVEPOINT`.
    fn supports_savepoints(&self) -> bool {
        true
    }

    /// Whether stored procedures can be called.
    fn supports_stored_procedures(&self) -> bool {
        false
    }

    /// Escapes and quotes a string literal.
    ///
    /// This is the only place string content is turned into SQL text.
    fn literal_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Renders a binary literal.
    fn literal_blob(&self, bytes: &[u8]) -> String {
        let hex: String = bytes.iter().map(|byte| format!("{byte:02X}")).collect();
        format!("X'{hex}'")
    }

    /// Renders a boolean literal.
    fn literal_bool(&self, b: bool) -> String {
        if b {
            String::from("TRUE")
        } else {
            String::from("FALSE")
        }
    }

    /// Renders a floating-point literal.
    ///
    /// Finite values always keep a fractional part or exponent so the driver
    /// reads them back as floats; non-finite values become quoted strings.
    fn literal_float(&self, f: f64) -> String {
        if f.is_nan() {
            self.literal_string("NaN")
        } else if f.is_infinite() {
            self.literal_string(if f > 0.0 { "Infinity" } else { "-Infinity" })
        } else {
            format!("{f:?}")
        }
    }

    /// Renders a date literal.
    fn literal_date(&self, d: NaiveDate) -> String {
        self.literal_string(&d.format("%Y-%m-%d").to_string())
    }

    /// Renders a datetime literal.
    fn literal_datetime(&self, dt: NaiveDateTime) -> String {
        self.literal_string(&dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
    }

    /// Renders a time literal.
    fn literal_time(&self, t: NaiveTime) -> String {
        self.literal_string(&t.format("%H:%M:%S%.f").to_string())
    }

    /// Renders an array literal.
    fn literal_array(&self, items: &[SqlValue]) -> String {
        format!("({})", self.literal_list(items))
    }

    /// Renders a comma-separated list of literals.
    fn literal_list(&self, items: &[SqlValue]) -> String {
        items
            .iter()
            .map(|v| self.literal(v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Renders any value as a SQL literal.
    fn literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => String::from("NULL"),
            SqlValue::Bool(b) => self.literal_bool(*b),
            SqlValue::Int(n) => n.to_string(),
            SqlValue::Float(f) => self.literal_float(*f),
            SqlValue::Decimal(d) => d.to_string(),
            SqlValue::Text(s) => self.literal_string(s),
            SqlValue::Blob(b) => self.literal_blob(b),
            SqlValue::Date(d) => self.literal_date(*d),
            SqlValue::DateTime(dt) => self.literal_datetime(*dt),
            SqlValue::Time(t) => self.literal_time(*t),
            SqlValue::Array(items) => self.literal_array(items),
        }
    }

    /// Renders the LIMIT/OFFSET tail of a SELECT (with a leading space), or
    /// an empty string when neither is set.
    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" LIMIT {l} OFFSET {o}"),
            (Some(l), None) => format!(" LIMIT {l}"),
            (None, Some(o)) => format!(" OFFSET {o}"),
            (None, None) => String::new(),
        }
    }

    /// Renders a stored procedure call.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedOperation`] when the dialect has no
    /// stored procedures.
    fn call_procedure_sql(&self, kind: CallKind, name: &str, args: &[SqlValue]) -> Result<String> {
        let _ = kind;
        if !self.supports_stored_procedures() {
            return Err(CoreError::UnsupportedOperation(format!(
                "stored procedures are not supported by the {} dialect",
                self.name()
            )));
        }
        Ok(format!(
            "CALL {}({})",
            self.literal_identifier(name),
            self.literal_list(args)
        ))
    }

    /// Statement that opens a transaction.
    fn begin_sql(&self) -> &'static str {
        "BEGIN"
    }

    /// Statement that commits a transaction.
    fn commit_sql(&self) -> &'static str {
        "COMMIT"
    }

    /// Statement that rolls back a transaction.
    fn rollback_sql(&self) -> &'static str {
        "ROLLBACK"
    }

    /// Statement that creates a savepoint.
    fn savepoint_sql(&self, depth: usize) -> String {
        format!("SAVEPOINT autopoint_{depth}")
    }

    /// Statement that releases a savepoint.
    fn release_savepoint_sql(&self, depth: usize) -> String {
        format!("RELEASE SAVEPOINT autopoint_{depth}")
    }

    /// Statement that rolls back to a savepoint.
    fn rollback_savepoint_sql(&self, depth: usize) -> String {
        format!("ROLLBACK TO SAVEPOINT autopoint_{depth}")
    }

    /// Maps a schema column type to this dialect's type name.
    fn column_type_sql(&self, column_type: &ColumnType) -> String {
        column_type.to_sql()
    }

    /// Column definition for an auto-incrementing primary key, replacing the
    /// type and `PRIMARY KEY` parts.
    fn auto_increment_sql(&self, column_type: &ColumnType) -> String {
        format!(
            "{} PRIMARY KEY GENERATED BY DEFAULT AS IDENTITY",
            self.column_type_sql(column_type)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Decimal;

    #[test]
    fn test_literal_scalars() {
        let d = GenericDialect::new();
        assert_eq!(d.literal(&SqlValue::Null), "NULL");
        assert_eq!(d.literal(&SqlValue::Bool(true)), "TRUE");
        assert_eq!(d.literal(&SqlValue::Int(-100)), "-100");
        assert_eq!(d.literal(&SqlValue::Float(1.0)), "1.0");
        assert_eq!(d.literal(&SqlValue::Float(0.25)), "0.25");
        assert_eq!(
            d.literal(&SqlValue::Decimal(Decimal::parse("10.20").unwrap())),
            "10.20"
        );
    }

    #[test]
    fn test_literal_string_escaping() {
        let d = GenericDialect::new();
        assert_eq!(d.literal(&SqlValue::Text(String::from("it's"))), "'it''s'");
        assert_eq!(
            d.literal(&SqlValue::Text(String::from("'; DROP TABLE users; --"))),
            "'''; DROP TABLE users; --'"
        );
    }

    #[test]
    fn test_literal_non_finite_floats() {
        let d = GenericDialect::new();
        assert_eq!(d.literal(&SqlValue::Float(f64::NAN)), "'NaN'");
        assert_eq!(d.literal(&SqlValue::Float(f64::INFINITY)), "'Infinity'");
        assert_eq!(d.literal(&SqlValue::Float(f64::NEG_INFINITY)), "'-Infinity'");
    }

    #[test]
    fn test_literal_temporal() {
        let d = GenericDialect::new();
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let time = NaiveTime::from_hms_opt(3, 4, 5).unwrap();
        assert_eq!(d.literal(&SqlValue::Date(date)), "'2024-01-02'");
        assert_eq!(d.literal(&SqlValue::Time(time)), "'03:04:05'");
        assert_eq!(
            d.literal(&SqlValue::DateTime(date.and_time(time))),
            "'2024-01-02 03:04:05'"
        );
        let precise = NaiveTime::from_hms_milli_opt(3, 4, 5, 250).unwrap();
        assert_eq!(
            d.literal(&SqlValue::DateTime(date.and_time(precise))),
            "'2024-01-02 03:04:05.250'"
        );
    }

    #[test]
    fn test_literal_blob_and_array() {
        let d = GenericDialect::new();
        assert_eq!(
            d.literal(&SqlValue::Blob(vec![0x48, 0x45, 0x4C, 0x4C, 0x4F])),
            "X'48454C4C4F'"
        );
        assert_eq!(
            d.literal(&SqlValue::Array(vec![
                SqlValue::Int(1),
                SqlValue::Text(String::from("a'b"))
            ])),
            "(1, 'a''b')"
        );
    }

    #[test]
    fn test_quote_identifier_doubles_quotes() {
        let d = PostgresDialect::new();
        assert_eq!(d.quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(d.literal_identifier("users.*"), "\"users\".*");
    }

    #[test]
    fn test_limit_clause() {
        let d = GenericDialect::new();
        assert_eq!(d.limit_clause(Some(10), Some(20)), " LIMIT 10 OFFSET 20");
        assert_eq!(d.limit_clause(None, Some(5)), " OFFSET 5");
        assert_eq!(d.limit_clause(None, None), "");
    }

    #[test]
    fn test_transaction_statements() {
        let d = GenericDialect::new();
        assert_eq!(d.begin_sql(), "BEGIN");
        assert_eq!(d.commit_sql(), "COMMIT");
        assert_eq!(d.rollback_sql(), "ROLLBACK");
        assert_eq!(d.savepoint_sql(2), "SAVEPOINT autopoint_2");
    }

    #[test]
    fn test_procedures_unsupported_by_default() {
        let d = GenericDialect::new();
        let err = d.call_procedure_sql(CallKind::Select, "p", &[]).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedOperation(_)));
    }
}
