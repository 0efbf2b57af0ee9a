//! The driver interface.
//!
//! A driver knows how to open physical connections for a connection string's
//! scheme and which [`Dialect`] renders SQL for it. Connections execute
//! already-literalized SQL text and hand back raw rows; everything above this
//! layer is database independent.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_core::{Dialect, SqlValue};

use crate::config::ConnectOptions;
use crate::error::{Error, Result};

/// Result of executing one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// Rows, each with one value per column.
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows changed by a mutation.
    pub rows_affected: u64,
    /// Key generated by an insert, when the database reports one.
    pub last_insert_id: Option<i64>,
}

impl RawResult {
    /// A result carrying rows.
    #[must_use]
    pub fn rows(columns: &[&str], rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns: columns.iter().map(|c| String::from(*c)).collect(),
            rows,
            ..Self::default()
        }
    }

    /// A result for a mutation.
    #[must_use]
    pub fn affected(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
            ..Self::default()
        }
    }
}

/// An open physical connection.
#[async_trait]
pub trait DriverConnection: Send + fmt::Debug {
    /// Executes one SQL statement.
    async fn execute(&mut self, sql: &str) -> Result<RawResult>;

    /// Cheap liveness check.
    async fn ping(&mut self) -> Result<()> {
        self.execute("SELECT 1").await.map(|_| ())
    }

    /// Column names of a table, given its already-quoted name.
    async fn table_columns(&mut self, quoted_table: &str) -> Result<Vec<String>> {
        let sql = format!("SELECT * FROM {quoted_table} LIMIT 0");
        self.execute(&sql).await.map(|r| r.columns)
    }

    /// Closes the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A database driver.
#[async_trait]
pub trait Driver: Send + Sync + fmt::Debug {
    /// The scheme this driver serves (`sqlite`, `postgres`, ...).
    fn name(&self) -> &'static str;

    /// The dialect used to render SQL for this driver.
    fn dialect(&self) -> Arc<dyn Dialect>;

    /// Opens a new physical connection.
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn DriverConnection>>;
}

/// Maps adapter names to drivers.
#[derive(Debug, Default, Clone)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a driver under its name, replacing any previous one.
    #[must_use]
    pub fn with(mut self, driver: Arc<dyn Driver>) -> Self {
        self.register(driver);
        self
    }

    /// Registers a driver under its name.
    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        self.drivers.insert(String::from(driver.name()), driver);
    }

    /// Looks up the driver for an adapter name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no driver is registered under `adapter`.
    pub fn get(&self, adapter: &str) -> Result<Arc<dyn Driver>> {
        self.drivers
            .get(adapter)
            .cloned()
            .ok_or_else(|| Error::Config(format!("no driver registered for adapter {adapter:?}")))
    }
}
