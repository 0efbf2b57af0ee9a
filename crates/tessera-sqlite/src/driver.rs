//! sqlx-backed SQLite driver.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::error::ErrorKind;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions as _, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use tessera_core::{Dialect, SqlValue};
use tessera_db::{
    ConnectOptions, DatabaseErrorKind, Driver, DriverConnection, DriverRegistry, Error, RawResult,
    Result,
};
use tracing::debug;

use crate::dialect::SqliteDialect;

const MEMORY: &str = ":memory:";

/// Opens SQLite connections through sqlx.
///
/// A missing database or `:memory:` opens a private in-memory database per
/// connection, so in-memory databases are normally used with
/// `max_connections=1` or the single-threaded pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

impl SqliteDriver {
    /// Creates the driver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// A registry serving the `sqlite` scheme.
    #[must_use]
    pub fn registry() -> DriverRegistry {
        DriverRegistry::new().with(Arc::new(Self::new()))
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(SqliteDialect::new())
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn DriverConnection>> {
        let path = options.database.as_deref().unwrap_or(MEMORY);
        let sqlx_options = if path == MEMORY {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(map_error)?
        } else {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        };
        let conn = sqlx_options
            .disable_statement_logging()
            .connect()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        debug!(database = path, "opened sqlite connection");
        Ok(Box::new(SqliteDriverConnection { conn }))
    }
}

/// One sqlx SQLite connection.
#[derive(Debug)]
pub struct SqliteDriverConnection {
    conn: SqliteConnection,
}

impl SqliteDriverConnection {
    async fn fetch(&mut self, sql: &str) -> Result<RawResult> {
        let rows = self
            .conn
            .fetch_all(sqlx::raw_sql(sql))
            .await
            .map_err(map_error)?;
        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => self.describe_columns(sql).await?,
        };
        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|i| decode_value(row, i)).collect())
            .collect::<Result<Vec<_>>>()?;
        Ok(RawResult {
            columns,
            rows,
            rows_affected: 0,
            last_insert_id: None,
        })
    }

    async fn describe_columns(&mut self, sql: &str) -> Result<Vec<String>> {
        let statement = self.conn.prepare(sql).await.map_err(map_error)?;
        Ok(statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }
}

#[async_trait]
impl DriverConnection for SqliteDriverConnection {
    async fn execute(&mut self, sql: &str) -> Result<RawResult> {
        let verb = leading_keyword(sql);
        if returns_rows(&verb, sql) {
            return self.fetch(sql).await;
        }
        let done = self
            .conn
            .execute(sqlx::raw_sql(sql))
            .await
            .map_err(map_error)?;
        let inserted = matches!(verb.as_str(), "INSERT" | "REPLACE");
        Ok(RawResult::affected(
            done.rows_affected(),
            inserted.then(|| done.last_insert_rowid()),
        ))
    }

    async fn ping(&mut self) -> Result<()> {
        self.conn.ping().await.map_err(map_error)
    }

    async fn table_columns(&mut self, quoted_table: &str) -> Result<Vec<String>> {
        let info = self
            .fetch(&format!("PRAGMA table_info({quoted_table})"))
            .await?;
        let position = info
            .columns
            .iter()
            .position(|c| c == "name")
            .unwrap_or(1);
        let names: Vec<String> = info
            .rows
            .iter()
            .filter_map(|row| match row.get(position) {
                Some(SqlValue::Text(name)) => Some(name.clone()),
                _ => None,
            })
            .collect();
        if names.is_empty() {
            return Err(Error::database(
                DatabaseErrorKind::Other,
                format!("no such table: {quoted_table}"),
            ));
        }
        Ok(names)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().await.map_err(map_error)
    }
}

fn leading_keyword(sql: &str) -> String {
    sql.trim_start()
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

fn returns_rows(verb: &str, sql: &str) -> bool {
    matches!(verb, "SELECT" | "WITH" | "PRAGMA" | "VALUES" | "EXPLAIN")
        || sql.to_ascii_uppercase().contains(" RETURNING ")
}

/// Decodes by storage class, using the declared column type to recover
/// booleans.
fn decode_value(row: &SqliteRow, index: usize) -> Result<SqlValue> {
    let storage = {
        let raw = row.try_get_raw(index).map_err(map_error)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        raw.type_info().name().to_ascii_uppercase()
    };
    let declared = row.column(index).type_info().name().to_ascii_uppercase();

    let value = match storage.as_str() {
        "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => {
            let n: i64 = row.try_get_unchecked(index).map_err(map_error)?;
            if declared == "BOOLEAN" {
                SqlValue::Bool(n != 0)
            } else {
                SqlValue::Int(n)
            }
        }
        "REAL" | "FLOAT" | "DOUBLE" => SqlValue::Float(row.try_get_unchecked(index).map_err(map_error)?),
        "BLOB" => SqlValue::Blob(row.try_get_unchecked(index).map_err(map_error)?),
        _ => SqlValue::Text(row.try_get_unchecked(index).map_err(map_error)?),
    };
    Ok(value)
}

fn map_error(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db) => {
            let kind = match db.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => DatabaseErrorKind::Constraint,
                _ if db.message().contains("syntax error") => DatabaseErrorKind::Syntax,
                _ => DatabaseErrorKind::Other,
            };
            Error::database(kind, db.message())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => Error::Connection(err.to_string()),
        other => Error::database(DatabaseErrorKind::Other, other.to_string()),
    }
}
