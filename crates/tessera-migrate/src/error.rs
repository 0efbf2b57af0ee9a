//! Error types for the migration system.

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// A migration is declared inconsistently. Raised before any SQL runs.
    #[error("Invalid migration {version}: {message}")]
    Config {
        /// Version of the offending migration.
        version: i64,
        /// What is wrong with it.
        message: String,
    },

    /// Two migrations share a version.
    #[error("Duplicate migration version {0}")]
    DuplicateVersion(i64),

    /// A migration cannot be rolled back.
    #[error("Migration {version} is not reversible: cannot undo {operation}")]
    Irreversible {
        /// Version of the migration.
        version: i64,
        /// The operation with no inverse.
        operation: String,
    },

    /// The version table holds something unexpected.
    #[error("Invalid migration state: {0}")]
    InvalidState(String),

    /// Database error during migration execution.
    #[error("Database error: {0}")]
    Database(#[from] tessera_db::Error),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
