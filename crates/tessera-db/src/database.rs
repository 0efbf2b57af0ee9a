//! The database handle.
//!
//! A [`Database`] ties a driver's dialect to a connection pool and caches
//! table column lists. It is cheap to clone and every dataset created from
//! it shares the same pool.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tessera_core::{AlterTable, Dialect, Query, SchemaOp, TableDefinition};
use tracing::{debug, info, warn};

use crate::caller::in_caller_scope;
use crate::config::ConnectOptions;
use crate::dataset::Dataset;
use crate::driver::{Driver, DriverRegistry, RawResult};
use crate::error::{Error, Result};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::row::Row;
use crate::transaction::{Transaction, TransactionOptions};

struct DatabaseInner {
    adapter: &'static str,
    dialect: Arc<dyn Dialect>,
    pool: ConnectionPool,
    schema: RwLock<HashMap<String, Arc<[String]>>>,
}

/// A database: dialect, pool and schema cache.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("adapter", &self.inner.adapter)
            .field("dialect", &self.inner.dialect.name())
            .field("pool", &self.inner.pool.stats())
            .finish()
    }
}

impl Database {
    /// Opens a database from a connection string. Connections are created
    /// lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed strings or unknown adapters.
    pub fn connect(url: &str, registry: &DriverRegistry) -> Result<Self> {
        Self::connect_with(ConnectOptions::parse(url)?, registry)
    }

    /// Opens a database from parsed options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no driver serves `options.adapter`.
    pub fn connect_with(options: ConnectOptions, registry: &DriverRegistry) -> Result<Self> {
        let driver = registry.get(&options.adapter)?;
        Ok(Self::with_driver(driver, options))
    }

    /// Opens a database over an explicit driver.
    #[must_use]
    pub fn with_driver(driver: Arc<dyn Driver>, options: ConnectOptions) -> Self {
        info!(
            adapter = driver.name(),
            max_connections = options.max_connections,
            single_threaded = options.single_threaded,
            "opening database"
        );
        Self {
            inner: Arc::new(DatabaseInner {
                adapter: driver.name(),
                dialect: driver.dialect(),
                pool: ConnectionPool::new(driver, options),
                schema: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The dialect rendering this database's SQL.
    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect.as_ref()
    }

    /// The connection pool.
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// A dataset reading from `table`.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from(&self, table: &str) -> Dataset {
        Dataset::new(self.clone(), Query::from(table))
    }

    /// A dataset over an arbitrary query.
    #[must_use]
    pub fn dataset(&self, query: Query) -> Dataset {
        Dataset::new(self.clone(), query)
    }

    /// Executes one statement.
    ///
    /// # Errors
    ///
    /// Returns pool errors and driver errors enriched with the SQL.
    pub async fn execute(&self, sql: &str) -> Result<RawResult> {
        let conn = self.inner.pool.acquire().await?;
        conn.execute(sql).await
    }

    /// Runs a query and returns its rows.
    ///
    /// # Errors
    ///
    /// See [`Database::execute`].
    pub async fn fetch(&self, sql: &str) -> Result<Vec<Row>> {
        Ok(Row::from_raw(self.execute(sql).await?))
    }

    /// Runs `f` with one connection held for its whole duration.
    ///
    /// # Errors
    ///
    /// Returns acquisition errors and whatever `f` returns.
    pub async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c PooledConnection) -> BoxFuture<'c, Result<T>>,
    {
        self.inner.pool.with_connection(f).await
    }

    /// Runs `f` in a transaction.
    ///
    /// Commits and returns `Some` when `f` succeeds. Returning
    /// [`Error::Rollback`] rolls back and yields `None`; any other error rolls
    /// back and is returned. Called while the current caller already has a
    /// transaction open, the block joins it.
    ///
    /// # Errors
    ///
    /// Returns pool errors, errors from `f`, and `COMMIT` failures.
    pub async fn transaction<T, F, Fut>(&self, f: F) -> Result<Option<T>>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.transaction_with(TransactionOptions::default(), f)
            .await
    }

    /// Runs `f` in a transaction with explicit options.
    ///
    /// With `savepoint` set, a nested call opens a `SAVEPOINT` (when the
    /// dialect supports them) so it can roll back on its own.
    ///
    /// # Errors
    ///
    /// See [`Database::transaction`].
    pub async fn transaction_with<T, F, Fut>(
        &self,
        options: TransactionOptions,
        f: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        in_caller_scope(async move {
            let conn = self.inner.pool.acquire().await?;
            if conn.in_transaction() {
                if options.savepoint && self.dialect().supports_savepoints() {
                    return self.run_savepoint(&conn, f).await;
                }
                let tx = Transaction::new(self.clone(), conn.savepoint_depth());
                return f(tx).await.map(Some);
            }
            self.run_transaction(&conn, f).await
        })
        .await
    }

    async fn run_transaction<T, F, Fut>(&self, conn: &PooledConnection, f: F) -> Result<Option<T>>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let dialect = self.dialect();
        conn.execute(dialect.begin_sql()).await?;
        conn.set_in_transaction(true);
        let _scope = TransactionScope(conn);
        debug!(caller = %conn.caller(), "transaction started");

        match f(Transaction::new(self.clone(), 0)).await {
            Ok(value) => {
                if let Err(e) = conn.execute(dialect.commit_sql()).await {
                    rollback_after_failure(conn, dialect.rollback_sql()).await;
                    return Err(e);
                }
                conn.set_in_transaction(false);
                Ok(Some(value))
            }
            Err(Error::Rollback) => {
                conn.execute(dialect.rollback_sql()).await?;
                conn.set_in_transaction(false);
                debug!(caller = %conn.caller(), "transaction rolled back on request");
                Ok(None)
            }
            Err(e) => {
                rollback_after_failure(conn, dialect.rollback_sql()).await;
                Err(e)
            }
        }
    }

    async fn run_savepoint<T, F, Fut>(&self, conn: &PooledConnection, f: F) -> Result<Option<T>>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let depth = conn.enter_savepoint();
        let dialect = self.dialect();
        if let Err(e) = conn.execute(&dialect.savepoint_sql(depth)).await {
            conn.leave_savepoint();
            return Err(e);
        }
        let outcome = match f(Transaction::new(self.clone(), depth)).await {
            Ok(value) => conn
                .execute(&dialect.release_savepoint_sql(depth))
                .await
                .map(|_| Some(value)),
            Err(Error::Rollback) => conn
                .execute(&dialect.rollback_savepoint_sql(depth))
                .await
                .map(|_| None),
            Err(e) => {
                if let Err(rollback) = conn.execute(&dialect.rollback_savepoint_sql(depth)).await {
                    warn!(error = %rollback, depth, "savepoint rollback failed");
                }
                Err(e)
            }
        };
        conn.leave_savepoint();
        outcome
    }

    /// Whether the current caller has a transaction open.
    ///
    /// # Errors
    ///
    /// Returns pool errors.
    pub async fn in_transaction(&self) -> Result<bool> {
        match crate::caller::CallerId::current() {
            Some(_) => Ok(self.inner.pool.acquire().await?.in_transaction()),
            None => Ok(false),
        }
    }

    /// Column names of `table`, cached after the first lookup.
    ///
    /// # Errors
    ///
    /// Returns the driver error when the table cannot be inspected.
    pub async fn schema(&self, table: &str) -> Result<Arc<[String]>> {
        if let Some(columns) = self.inner.schema.read().get(table) {
            return Ok(Arc::clone(columns));
        }
        let quoted = self.dialect().literal_identifier(table);
        let conn = self.inner.pool.acquire().await?;
        let columns: Arc<[String]> = Arc::from(conn.table_columns(&quoted).await?);
        self.inner
            .schema
            .write()
            .insert(String::from(table), Arc::clone(&columns));
        Ok(columns)
    }

    /// Forgets cached columns for `table`.
    pub fn invalidate_schema(&self, table: &str) {
        self.inner.schema.write().remove(table);
    }

    /// Whether `table` exists, checked with a cheap select. Inside a
    /// transaction the check runs in a savepoint where supported so a
    /// failure does not abort the transaction.
    ///
    /// # Errors
    ///
    /// Returns pool errors; driver errors mean the table is missing.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let check_sql = Query::from(table)
            .select([tessera_core::raw("NULL")])
            .limit(1)
            .select_sql(self.dialect())?;
        let savepoint = self.dialect().supports_savepoints() && self.in_transaction().await?;
        if !savepoint {
            return match self.execute(&check_sql).await {
                Ok(_) => Ok(true),
                Err(Error::Database { .. }) => Ok(false),
                Err(e) => Err(e),
            };
        }
        let result = self
            .transaction_with(TransactionOptions { savepoint: true }, |tx| async move {
                tx.execute(&check_sql).await
            })
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(Error::Database { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Applies one schema operation.
    ///
    /// # Errors
    ///
    /// Returns the first failing statement's error.
    pub async fn apply(&self, op: &SchemaOp) -> Result<()> {
        info!(operation = %op.describe(), "applying schema change");
        for sql in op.to_sql(self.dialect()) {
            self.execute(&sql).await?;
        }
        match op {
            SchemaOp::CreateTable(def) => self.invalidate_schema(&def.name),
            SchemaOp::DropTable { name, .. } => self.invalidate_schema(name),
            SchemaOp::RenameTable { from, to } => {
                self.invalidate_schema(from);
                self.invalidate_schema(to);
            }
            SchemaOp::AddColumn { table, .. }
            | SchemaOp::DropColumn { table, .. }
            | SchemaOp::RenameColumn { table, .. } => self.invalidate_schema(table),
            SchemaOp::AddIndex(_) | SchemaOp::DropIndex { .. } | SchemaOp::Raw { .. } => {}
        }
        Ok(())
    }

    /// `CREATE TABLE` with its indexes.
    ///
    /// # Errors
    ///
    /// See [`Database::apply`].
    pub async fn create_table(&self, definition: TableDefinition) -> Result<()> {
        self.apply(&SchemaOp::CreateTable(definition)).await
    }

    /// `DROP TABLE`.
    ///
    /// # Errors
    ///
    /// See [`Database::apply`].
    pub async fn drop_table(&self, table: &str) -> Result<()> {
        self.apply(&SchemaOp::drop_table(table)).await
    }

    /// Applies every change collected by an [`AlterTable`].
    ///
    /// # Errors
    ///
    /// See [`Database::apply`].
    pub async fn alter(&self, alter: AlterTable) -> Result<()> {
        for op in alter.into_ops() {
            self.apply(&op).await?;
        }
        Ok(())
    }

    /// Closes idle connections and refuses new acquisitions.
    pub async fn disconnect(&self) {
        self.inner.pool.disconnect().await;
    }
}

/// Discards the connection when a transaction ends without COMMIT or
/// ROLLBACK reaching the server, including when the future is dropped.
struct TransactionScope<'a>(&'a PooledConnection);

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.0.in_transaction() {
            warn!(caller = %self.0.caller(), "transaction left open; discarding connection");
            self.0.discard();
        }
    }
}

async fn rollback_after_failure(conn: &PooledConnection, sql: &str) {
    match conn.execute(sql).await {
        Ok(_) => conn.set_in_transaction(false),
        // The flag stays set so the pool discards this connection.
        Err(e) => warn!(error = %e, caller = %conn.caller(), "rollback failed"),
    }
}
