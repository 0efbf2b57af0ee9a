//! PostgreSQL dialect.

use super::Dialect;
use crate::error::Result;
use crate::query::CallKind;
use crate::schema::ColumnType;
use crate::value::SqlValue;

/// PostgreSQL dialect.
///
/// Quotes identifiers, renders arrays as `ARRAY[...]` and binary data as
/// `bytea` escapes. Set-returning procedures are called through
/// `SELECT * FROM name(...)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quotes_identifiers(&self) -> bool {
        true
    }

    fn supports_stored_procedures(&self) -> bool {
        true
    }

    fn literal_blob(&self, bytes: &[u8]) -> String {
        let hex: String = bytes.iter().map(|byte| format!("{byte:02x}")).collect();
        format!("'\\x{hex}'::bytea")
    }

    fn literal_array(&self, items: &[SqlValue]) -> String {
        format!("ARRAY[{}]", self.literal_list(items))
    }

    fn call_procedure_sql(&self, kind: CallKind, name: &str, args: &[SqlValue]) -> Result<String> {
        let call = format!("{}({})", self.literal_identifier(name), self.literal_list(args));
        Ok(match kind {
            CallKind::Select | CallKind::First => format!("SELECT * FROM {call}"),
            CallKind::Insert | CallKind::Update | CallKind::Delete => format!("CALL {call}"),
        })
    }

    fn column_type_sql(&self, column_type: &ColumnType) -> String {
        match column_type {
            ColumnType::Double => String::from("DOUBLE PRECISION"),
            ColumnType::Blob => String::from("BYTEA"),
            ColumnType::DateTime => String::from("TIMESTAMP"),
            other => other.to_sql(),
        }
    }

    fn auto_increment_sql(&self, column_type: &ColumnType) -> String {
        match column_type {
            ColumnType::BigInt => String::from("BIGSERIAL PRIMARY KEY"),
            ColumnType::SmallInt => String::from("SMALLSERIAL PRIMARY KEY"),
            _ => String::from("SERIAL PRIMARY KEY"),
        }
    }
}
