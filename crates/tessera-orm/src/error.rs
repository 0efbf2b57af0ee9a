//! Error types for the ORM.

use thiserror::Error;

use crate::hooks::LifecycleEvent;

/// ORM-specific errors.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Error from the dataset layer.
    #[error(transparent)]
    Database(#[from] tessera_db::Error),

    /// No row with the requested primary key.
    #[error("{table}: no row with primary key {pk}")]
    NotFound {
        /// Model table.
        table: &'static str,
        /// Requested key.
        pk: i64,
    },

    /// A hook returned [`crate::HookAction::Stop`]; the change was rolled
    /// back.
    #[error("{0} hook stopped the operation")]
    HookStopped(LifecycleEvent),

    /// The operation needs a saved instance.
    #[error("{0}: instance has no primary key")]
    MissingPrimaryKey(&'static str),

    /// No plugin registered under the name.
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    /// A plugin rejected its configuration.
    #[error("plugin {name}: {message}")]
    Plugin {
        /// Plugin name.
        name: String,
        /// What was wrong.
        message: String,
    },

    /// No association defined under the name.
    #[error("unknown association: {0}")]
    UnknownAssociation(String),
}

/// Result type alias for ORM operations.
pub type Result<T> = std::result::Result<T, OrmError>;
