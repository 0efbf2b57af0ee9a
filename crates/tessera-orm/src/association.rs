//! Associations between model tables.
//!
//! An association only names tables and key columns. Related rows are found
//! through the owner's key values when loaded, never through stored object
//! references, so self-referential graphs need no special handling.

use tessera_core::col;
use tessera_db::{Database, Dataset};

use crate::error::{OrmError, Result};
use crate::model::Model;

/// How the owner relates to the associated table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationKind {
    /// The owner's `key` column holds the associated row's key.
    ManyToOne {
        /// Foreign key column on the owner.
        key: String,
    },
    /// Associated rows carry the owner's key in `key`.
    OneToMany {
        /// Foreign key column on the associated table.
        key: String,
    },
    /// Rows linked through a join table.
    ManyToMany {
        /// Join table name.
        join_table: String,
        /// Join table column referencing the owner.
        left_key: String,
        /// Join table column referencing the associated row.
        right_key: String,
    },
}

/// A named association from one model to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    name: String,
    table: String,
    target_key: String,
    kind: AssociationKind,
}

impl Association {
    fn new(name: &str, table: &str, kind: AssociationKind) -> Self {
        Self {
            name: String::from(name),
            table: String::from(table),
            target_key: String::from("id"),
            kind,
        }
    }

    /// The owner's `key` column points at a row of `table`.
    #[must_use]
    pub fn many_to_one(name: &str, table: &str, key: &str) -> Self {
        Self::new(
            name,
            table,
            AssociationKind::ManyToOne {
                key: String::from(key),
            },
        )
    }

    /// Rows of `table` whose `key` column holds the owner's key.
    #[must_use]
    pub fn one_to_many(name: &str, table: &str, key: &str) -> Self {
        Self::new(
            name,
            table,
            AssociationKind::OneToMany {
                key: String::from(key),
            },
        )
    }

    /// Rows of `table` linked through `join_table`.
    #[must_use]
    pub fn many_to_many(
        name: &str,
        table: &str,
        join_table: &str,
        left_key: &str,
        right_key: &str,
    ) -> Self {
        Self::new(
            name,
            table,
            AssociationKind::ManyToMany {
                join_table: String::from(join_table),
                left_key: String::from(left_key),
                right_key: String::from(right_key),
            },
        )
    }

    /// Uses a key column other than `id` on the associated table.
    #[must_use]
    pub fn with_target_key(mut self, key: &str) -> Self {
        self.target_key = String::from(key);
        self
    }

    /// Association name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Associated table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Relationship shape.
    #[must_use]
    pub const fn kind(&self) -> &AssociationKind {
        &self.kind
    }

    /// Dataset of the rows associated with `owner`, or `None` when the
    /// owner's foreign key is NULL and nothing can match.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::MissingPrimaryKey`] for an unsaved owner of a
    /// `one_to_many` or `many_to_many` association, and an invalid
    /// operation when the owner lacks the foreign key column.
    pub fn dataset<M: Model>(&self, db: &Database, owner: &M) -> Result<Option<Dataset>> {
        let target = db.from(&self.table);
        let target_key = col(&self.target_key);
        match &self.kind {
            AssociationKind::ManyToOne { key } => {
                let value = owner.value_of(key).ok_or_else(|| {
                    tessera_db::Error::InvalidOperation(format!(
                        "{} has no column {key} for association {}",
                        M::TABLE,
                        self.name
                    ))
                })?;
                if value.is_null() {
                    return Ok(None);
                }
                Ok(Some(target.filter(target_key.eq(value))))
            }
            AssociationKind::OneToMany { key } => {
                let pk = owner.pk().ok_or(OrmError::MissingPrimaryKey(M::TABLE))?;
                Ok(Some(target.filter(col(key).eq(pk))))
            }
            AssociationKind::ManyToMany {
                join_table,
                left_key,
                right_key,
            } => {
                let pk = owner.pk().ok_or(OrmError::MissingPrimaryKey(M::TABLE))?;
                let linked = db
                    .from(join_table)
                    .select_columns(&[right_key.as_str()])
                    .filter(col(left_key).eq(pk));
                Ok(Some(
                    target.filter(target_key.in_query(linked.query().clone())),
                ))
            }
        }
    }
}
