//! Migration executor.
//!
//! The [`Migrator`] keeps the current schema version in a single-row table
//! (`schema_info` by default) and moves it up or down one migration at a
//! time. Each migration runs in its own transaction together with the
//! version update, so a failure leaves the version at the last migration
//! that completed.

use std::collections::BTreeMap;

use tessera_core::{ColumnDef, ColumnType, InsertValues, SchemaOp, TableDefinition};
use tessera_db::Database;
use tracing::{debug, info};

use crate::error::{MigrateError, Result};
use crate::migration::Migration;

/// Default name of the version table.
pub const SCHEMA_INFO_TABLE: &str = "schema_info";

/// Applies and reverts a set of migrations.
#[derive(Debug)]
pub struct Migrator {
    db: Database,
    migrations: BTreeMap<i64, Migration>,
    table: String,
}

impl Migrator {
    /// Validates `migrations` and prepares a migrator. Nothing is sent to the
    /// database.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Config`] for an invalid migration and
    /// [`MigrateError::DuplicateVersion`] when two share a version.
    pub fn new(db: Database, migrations: impl IntoIterator<Item = Migration>) -> Result<Self> {
        let mut by_version = BTreeMap::new();
        for migration in migrations {
            migration.validate()?;
            let version = migration.version();
            if by_version.insert(version, migration).is_some() {
                return Err(MigrateError::DuplicateVersion(version));
            }
        }
        Ok(Self {
            db,
            migrations: by_version,
            table: String::from(SCHEMA_INFO_TABLE),
        })
    }

    /// Uses another version table.
    #[must_use]
    pub fn with_table(mut self, table: &str) -> Self {
        self.table = String::from(table);
        self
    }

    /// Highest known version, `0` without migrations.
    #[must_use]
    pub fn latest_version(&self) -> i64 {
        self.migrations.keys().next_back().copied().unwrap_or(0)
    }

    /// Known migrations in version order.
    pub fn migrations(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values()
    }

    async fn ensure_table(&self) -> Result<i64> {
        if !self.db.table_exists(&self.table).await? {
            debug!(table = %self.table, "creating version table");
            self.db
                .create_table(TableDefinition::new(&self.table).column_def(
                    ColumnDef::new("version", ColumnType::Integer)
                        .not_null()
                        .default_value(0),
                ))
                .await?;
        }
        let version = self
            .db
            .from(&self.table)
            .select_columns(&["version"])
            .single_value::<i64>()
            .await?;
        match version {
            Some(v) if v >= 0 => Ok(v),
            Some(v) => Err(MigrateError::InvalidState(format!(
                "{} holds negative version {v}",
                self.table
            ))),
            None => {
                self.db
                    .from(&self.table)
                    .insert(InsertValues::named([("version", 0)]))
                    .await?;
                Ok(0)
            }
        }
    }

    /// The recorded schema version, creating the version table on demand.
    ///
    /// # Errors
    ///
    /// Returns database errors.
    pub async fn current_version(&self) -> Result<i64> {
        self.ensure_table().await
    }

    /// Migrations above the current version.
    ///
    /// # Errors
    ///
    /// Returns database errors.
    pub async fn pending(&self) -> Result<Vec<&Migration>> {
        let current = self.ensure_table().await?;
        Ok(self
            .migrations
            .range(current + 1..)
            .map(|(_, m)| m)
            .collect())
    }

    /// Migrates to the latest version and returns it.
    ///
    /// # Errors
    ///
    /// See [`Migrator::run_to`].
    pub async fn run(&self) -> Result<i64> {
        self.run_to(self.latest_version()).await
    }

    /// Migrates up or down to `target` and returns the new version.
    ///
    /// Migrating down reverts every migration above `target`, newest first.
    /// Migrations at or below the current version are never re-applied.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Irreversible`] before touching the database
    /// when a migration to revert has no inverse, and the first database
    /// error otherwise.
    pub async fn run_to(&self, target: i64) -> Result<i64> {
        let current = self.ensure_table().await?;
        if target > current {
            for migration in self.migrations.range(current + 1..=target).map(|(_, m)| m) {
                info!(version = migration.version(), name = migration.name(), "applying migration");
                self.step(migration.up_ops().to_vec(), migration.version())
                    .await?;
            }
        } else if target < current {
            let reverting: Vec<&Migration> = self
                .migrations
                .range(target + 1..=current)
                .rev()
                .map(|(_, m)| m)
                .collect();
            let plans = reverting
                .iter()
                .map(|m| m.down_ops())
                .collect::<Result<Vec<_>>>()?;
            for (migration, ops) in reverting.into_iter().zip(plans) {
                let below = self
                    .migrations
                    .range(target + 1..migration.version())
                    .next_back()
                    .map_or(target, |(v, _)| *v);
                info!(version = migration.version(), name = migration.name(), "reverting migration");
                self.step(ops, below).await?;
            }
        }
        let version = self.ensure_table().await?;
        info!(version, "schema is current");
        Ok(version)
    }

    async fn step(&self, ops: Vec<SchemaOp>, version: i64) -> Result<()> {
        let table = self.table.clone();
        self.db
            .transaction(|tx| async move {
                for op in &ops {
                    tx.database().apply(op).await?;
                }
                tx.from(&table).update([("version", version)]).await?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
