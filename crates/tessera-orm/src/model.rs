//! The model trait.

use tessera_core::SqlValue;
use tessera_db::Row;

/// A row type mapped to one table with an integer primary key.
///
/// # Example
///
/// ```
/// use tessera_core::SqlValue;
/// use tessera_db::Row;
/// use tessera_orm::Model;
///
/// struct Artist {
///     id: Option<i64>,
///     name: String,
/// }
///
/// impl Model for Artist {
///     const TABLE: &'static str = "artists";
///
///     fn from_row(row: &Row) -> tessera_db::Result<Self> {
///         Ok(Self {
///             id: row.get("id")?,
///             name: row.get("name")?,
///         })
///     }
///
///     fn to_values(&self) -> Vec<(&'static str, SqlValue)> {
///         vec![("name", SqlValue::Text(self.name.clone()))]
///     }
///
///     fn pk(&self) -> Option<i64> {
///         self.id
///     }
///
///     fn set_pk(&mut self, pk: i64) {
///         self.id = Some(pk);
///     }
/// }
/// ```
pub trait Model: Sized + Send + Sync + 'static {
    /// Table name.
    const TABLE: &'static str;

    /// Primary key column.
    const PRIMARY_KEY: &'static str = "id";

    /// Builds an instance from a result row.
    ///
    /// # Errors
    ///
    /// Returns decode errors for missing or mistyped columns.
    fn from_row(row: &Row) -> tessera_db::Result<Self>;

    /// Column values to persist, without the primary key.
    fn to_values(&self) -> Vec<(&'static str, SqlValue)>;

    /// The primary key, `None` until saved.
    fn pk(&self) -> Option<i64>;

    /// Records the key assigned on insert.
    fn set_pk(&mut self, pk: i64);

    /// Whether this instance has been saved.
    fn is_saved(&self) -> bool {
        self.pk().is_some()
    }

    /// Value of one persisted column, `None` when the model does not carry
    /// it.
    fn value_of(&self, column: &str) -> Option<SqlValue> {
        if column == Self::PRIMARY_KEY {
            return Some(self.pk().map_or(SqlValue::Null, SqlValue::Int));
        }
        self.to_values()
            .into_iter()
            .find_map(|(name, value)| (name == column).then_some(value))
    }
}
