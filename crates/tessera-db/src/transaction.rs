//! Transaction handles.

use tessera_core::Query;

use crate::database::Database;
use crate::dataset::Dataset;
use crate::driver::RawResult;
use crate::error::{Error, Result};

/// Options for [`Database::transaction_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Open a savepoint when already inside a transaction.
    pub savepoint: bool,
}

/// Handle passed to a transaction block.
///
/// Everything run through it (or through the database from the same task)
/// uses the connection the transaction was opened on.
#[derive(Debug, Clone)]
pub struct Transaction {
    db: Database,
    savepoint: usize,
}

impl Transaction {
    pub(crate) const fn new(db: Database, savepoint: usize) -> Self {
        Self { db, savepoint }
    }

    /// The database the transaction runs on.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Savepoint depth, `0` for the outermost transaction.
    #[must_use]
    pub const fn savepoint_depth(&self) -> usize {
        self.savepoint
    }

    /// A dataset reading from `table` inside this transaction.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from(&self, table: &str) -> Dataset {
        self.db.from(table)
    }

    /// A dataset over an arbitrary query inside this transaction.
    #[must_use]
    pub fn dataset(&self, query: Query) -> Dataset {
        self.db.dataset(query)
    }

    /// Executes one statement inside this transaction.
    ///
    /// # Errors
    ///
    /// See [`Database::execute`].
    pub async fn execute(&self, sql: &str) -> Result<RawResult> {
        self.db.execute(sql).await
    }

    /// The error a block returns to roll back without failing.
    ///
    /// ```ignore
    /// db.transaction(|tx| async move {
    ///     tx.from("items").delete().await?;
    ///     tx.rollback()
    /// })
    /// ```
    ///
    /// # Errors
    ///
    /// Always returns [`Error::Rollback`].
    pub fn rollback<T>(&self) -> Result<T> {
        Err(Error::Rollback)
    }
}
