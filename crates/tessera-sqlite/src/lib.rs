//! # tessera-sqlite
//!
//! SQLite support for tessera: the [`SqliteDialect`] and an sqlx-backed
//! [`SqliteDriver`].
//!
//! ```rust,no_run
//! use tessera_db::Database;
//! use tessera_sqlite::SqliteDriver;
//!
//! # async fn run() -> tessera_db::Result<()> {
//! let db = Database::connect("sqlite:///tmp/app.db", &SqliteDriver::registry())?;
//! let names: Vec<String> = db.from("artists").map("name").await?;
//! # Ok(())
//! # }
//! ```

pub mod dialect;
pub mod driver;

pub use dialect::SqliteDialect;
pub use driver::{SqliteDriver, SqliteDriverConnection};
