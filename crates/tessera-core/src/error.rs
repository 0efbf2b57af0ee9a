//! Errors raised while building or rendering SQL.

use thiserror::Error;

/// Errors produced by the pure SQL layer.
///
/// None of these involve a database round trip: they are detected while a
/// dataset is composed or rendered, before any SQL is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The dialect cannot express the requested operation.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A positional insert does not match the table's column count.
    #[error("column count mismatch: table has {expected} columns, {actual} values given")]
    ColumnCount {
        /// Number of columns known for the table.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// The operation is not valid for this dataset's shape.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A string could not be parsed as a fixed-point decimal.
    #[error("invalid decimal literal: {0:?}")]
    InvalidDecimal(String),

    /// A value could not be converted to the requested Rust type.
    #[error("cannot decode {found} as {expected}")]
    Decode {
        /// The Rust type that was requested.
        expected: &'static str,
        /// A short description of the value that was found.
        found: String,
    },
}

/// Result type alias for the SQL layer.
pub type Result<T> = std::result::Result<T, CoreError>;
