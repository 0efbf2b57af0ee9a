//! Versioned schema migrations.
//!
//! `tessera-migrate` applies [`Migration`]s in version order against a
//! [`tessera_db::Database`] and records the reached version in a single-row
//! `schema_info` table.
//!
//! - **Migrations** declare either reversible `change` operations or an
//!   explicit `up`/`down` pair
//! - **Migrator** moves the schema up or down, one transaction per migration
//!
//! # Example
//!
//! ```rust,no_run
//! use tessera_core::TableDefinition;
//! use tessera_db::Database;
//! use tessera_migrate::{Migration, Migrator};
//!
//! # async fn run(db: Database) -> tessera_migrate::Result<()> {
//! let migrator = Migrator::new(
//!     db,
//!     [Migration::new(1, "create artists")
//!         .create_table(TableDefinition::new("artists").primary_key("id").string("name"))],
//! )?;
//! migrator.run().await?;
//! migrator.run_to(0).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod migration;
pub mod migrator;

pub use error::{MigrateError, Result};
pub use migration::Migration;
pub use migrator::{Migrator, SCHEMA_INFO_TABLE};
