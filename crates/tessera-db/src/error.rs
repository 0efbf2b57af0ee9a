//! Error types for database access.

use std::time::Duration;

use tessera_core::CoreError;
use thiserror::Error;

/// Broad classification of errors reported by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    /// The statement could not be parsed or planned.
    Syntax,
    /// A constraint (unique, foreign key, not null, check) was violated.
    Constraint,
    /// Anything else.
    Other,
}

fn sql_suffix(sql: &Option<String>) -> String {
    sql.as_ref().map(|s| format!(" [sql: {s}]")).unwrap_or_default()
}

/// Errors raised by pools, datasets and drivers.
#[derive(Debug, Error)]
pub enum Error {
    /// A physical connection could not be established.
    #[error("connection error: {0}")]
    Connection(String),

    /// No connection became available before the pool timeout.
    #[error("timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),

    /// The pool was disconnected.
    #[error("connection pool is closed")]
    PoolClosed,

    /// The dialect or driver cannot perform the operation.
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

    /// The database rejected a statement.
    #[error("database error ({kind:?}): {message}{}", sql_suffix(.sql))]
    Database {
        /// Error classification.
        kind: DatabaseErrorKind,
        /// Driver message.
        message: String,
        /// The statement that failed, when known.
        sql: Option<String>,
    },

    /// A value could not be decoded into the requested type.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid connection string or options.
    #[error("configuration error: {0}")]
    Config(String),

    /// Raised inside a transaction block to roll back without failing.
    #[error("transaction rollback requested")]
    Rollback,
}

impl Error {
    /// Creates a driver error without SQL context.
    #[must_use]
    pub fn database(kind: DatabaseErrorKind, message: impl Into<String>) -> Self {
        Self::Database {
            kind,
            message: message.into(),
            sql: None,
        }
    }

    /// Attaches the failing statement to a driver error. Other variants are
    /// returned unchanged.
    #[must_use]
    pub fn with_sql(self, statement: &str) -> Self {
        match self {
            Self::Database { kind, message, sql } => Self::Database {
                kind,
                message,
                sql: sql.or_else(|| Some(String::from(statement))),
            },
            other => other,
        }
    }

    /// Whether this is the rollback sentinel.
    #[must_use]
    pub const fn is_rollback(&self) -> bool {
        matches!(self, Self::Rollback)
    }
}

impl From<CoreError> for Error {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnsupportedOperation(msg) => Self::UnsupportedOperation(msg),
            CoreError::ColumnCount { expected, actual } => Self::ColumnCount { expected, actual },
            CoreError::InvalidOperation(msg) => Self::InvalidOperation(msg),
            CoreError::InvalidDecimal(_) | CoreError::Decode { .. } => Self::Decode(err.to_string()),
        }
    }
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, Error>;
