//! # tessera-core
//!
//! Immutable datasets described as data, rendered to SQL by a dialect.
//!
//! This crate provides:
//! - A literalizer that turns [`SqlValue`]s into SQL text through a single
//!   escaping function per dialect
//! - An expression model ([`Expr`]) with column references, operators,
//!   functions and sub-selects
//! - The [`Query`] options record with refinement methods that never mutate
//!   their receiver
//! - A schema DSL ([`TableDefinition`], [`SchemaOp`]) rendering DDL
//!
//! Nothing here performs I/O; execution lives in `tessera-db`.
//!
//! ## Building a query
//!
//! ```rust
//! use tessera_core::{col, GenericDialect, Query};
//!
//! let query = Query::from("countries")
//!     .select([col("name"), col("population") / 1_000_000])
//!     .filter(col("region").eq("Asia"));
//!
//! assert_eq!(
//!     query.select_sql(&GenericDialect::new()).unwrap(),
//!     "SELECT name, (population / 1000000) FROM countries WHERE (region = 'Asia')"
//! );
//! ```
//!
//! ## SQL injection
//!
//! Values are literalized, never concatenated:
//!
//! ```rust
//! use tessera_core::{col, GenericDialect, Query};
//!
//! let input = "'; DROP TABLE users; --";
//! let sql = Query::from("users")
//!     .filter(col("name").eq(input))
//!     .select_sql(&GenericDialect::new())
//!     .unwrap();
//! assert_eq!(sql, "SELECT * FROM users WHERE (name = '''; DROP TABLE users; --')");
//! ```

pub mod dialect;
pub mod error;
pub mod expr;
pub mod query;
pub mod schema;
pub mod value;

pub use dialect::{Dialect, GenericDialect, MysqlDialect, PostgresDialect};
pub use error::{CoreError, Result};
pub use expr::{col, count_all, func, lit, raw, star, BinaryOp, ColumnRef, Expr, UnaryOp};
pub use query::{
    CallKind, CompoundOp, InsertValues, JoinKind, LockMode, OrderDirection, Ordering, Query,
    Source,
};
pub use schema::{AlterTable, ColumnDef, ColumnOptions, ColumnType, IndexDef, SchemaOp, TableDefinition};
pub use value::{Decimal, FromSqlValue, SqlValue, ToSqlValue};
