//! Migration definitions.
//!
//! A migration is either a single reversible `change` list, whose inverse is
//! synthesized when rolling back, or an explicit `up`/`down` pair. Mixing
//! the two styles is rejected by [`Migration::validate`].

use tessera_core::{AlterTable, SchemaOp, TableDefinition};

use crate::error::{MigrateError, Result};

/// A versioned set of schema operations.
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    version: i64,
    name: String,
    change: Vec<SchemaOp>,
    up: Vec<SchemaOp>,
    down: Vec<SchemaOp>,
}

impl Migration {
    /// Creates an empty migration.
    #[must_use]
    pub fn new(version: i64, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            change: Vec::new(),
            up: Vec::new(),
            down: Vec::new(),
        }
    }

    /// Adds a reversible operation.
    #[must_use]
    pub fn change(mut self, op: SchemaOp) -> Self {
        self.change.push(op);
        self
    }

    /// Adds a forward operation.
    #[must_use]
    pub fn up(mut self, op: SchemaOp) -> Self {
        self.up.push(op);
        self
    }

    /// Adds a rollback operation.
    #[must_use]
    pub fn down(mut self, op: SchemaOp) -> Self {
        self.down.push(op);
        self
    }

    /// Reversible `CREATE TABLE`.
    #[must_use]
    pub fn create_table(self, definition: TableDefinition) -> Self {
        self.change(SchemaOp::CreateTable(definition))
    }

    /// Reversible `ALTER TABLE` changes.
    #[must_use]
    pub fn alter_table(self, alter: AlterTable) -> Self {
        alter.into_ops().into_iter().fold(self, Self::change)
    }

    /// The version number.
    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }

    /// The descriptive name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this migration uses the `change` style.
    #[must_use]
    pub fn is_change(&self) -> bool {
        !self.change.is_empty()
    }

    /// Checks the declaration.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Config`] for a non-positive version, for
    /// `change` mixed with `up`/`down`, and for a migration without
    /// operations.
    pub fn validate(&self) -> Result<()> {
        let config = |message: &str| {
            Err(MigrateError::Config {
                version: self.version,
                message: String::from(message),
            })
        };
        if self.version <= 0 {
            return config("versions must be positive");
        }
        if self.is_change() && !(self.up.is_empty() && self.down.is_empty()) {
            return config("change cannot be combined with up/down");
        }
        if !self.is_change() && self.up.is_empty() {
            return config("no operations declared");
        }
        Ok(())
    }

    /// Operations applied when migrating up.
    #[must_use]
    pub fn up_ops(&self) -> &[SchemaOp] {
        if self.is_change() {
            &self.change
        } else {
            &self.up
        }
    }

    /// Operations applied when migrating down: the explicit `down` list, or
    /// the inverse of `change` in reverse order.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Irreversible`] when a `change` operation has
    /// no inverse or an `up`/`down` migration declares no `down`.
    pub fn down_ops(&self) -> Result<Vec<SchemaOp>> {
        if !self.is_change() {
            if self.down.is_empty() {
                return Err(MigrateError::Irreversible {
                    version: self.version,
                    operation: String::from("up without down"),
                });
            }
            return Ok(self.down.clone());
        }
        self.change
            .iter()
            .rev()
            .map(|op| {
                op.reverse().ok_or_else(|| MigrateError::Irreversible {
                    version: self.version,
                    operation: op.describe(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use tessera_core::{ColumnDef, ColumnType};

    use super::*;

    fn artists() -> TableDefinition {
        TableDefinition::new("artists").primary_key("id").string("name")
    }

    #[test]
    fn test_change_is_reversed_in_reverse_order() {
        let migration = Migration::new(1, "artists")
            .create_table(artists())
            .alter_table(
                AlterTable::new("artists")
                    .add_column(ColumnDef::new("born", ColumnType::Date))
                    .rename_column("name", "full_name"),
            );
        migration.validate().unwrap();

        let down = migration.down_ops().unwrap();
        assert_eq!(down.len(), 3);
        assert_eq!(down[0].describe(), "rename_column artists.full_name -> name");
        assert_eq!(down[1].describe(), "drop_column artists.born");
        assert_eq!(down[2].describe(), "drop_table artists");
    }

    #[test]
    fn test_irreversible_change() {
        let migration = Migration::new(2, "cleanup").change(SchemaOp::drop_table("legacy"));
        assert!(matches!(
            migration.down_ops().unwrap_err(),
            MigrateError::Irreversible { version: 2, .. }
        ));
    }

    #[test]
    fn test_mixing_styles_is_rejected() {
        let migration = Migration::new(3, "mixed")
            .create_table(artists())
            .down(SchemaOp::drop_table("artists"));
        assert!(matches!(
            migration.validate().unwrap_err(),
            MigrateError::Config { version: 3, .. }
        ));
    }

    #[test]
    fn test_up_down_pair() {
        let migration = Migration::new(4, "raw")
            .up(SchemaOp::raw("UPDATE artists SET name = upper(name)", None))
            .down(SchemaOp::raw("UPDATE artists SET name = lower(name)", None));
        migration.validate().unwrap();
        assert!(!migration.is_change());
        assert_eq!(migration.up_ops().len(), 1);
        assert_eq!(migration.down_ops().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_or_unversioned_migrations_are_rejected() {
        assert!(Migration::new(5, "empty").validate().is_err());
        assert!(Migration::new(0, "zero")
            .create_table(artists())
            .validate()
            .is_err());
        assert!(matches!(
            Migration::new(6, "up only")
                .up(SchemaOp::drop_table("t"))
                .down_ops()
                .unwrap_err(),
            MigrateError::Irreversible { .. }
        ));
    }
}
