//! Result rows.

use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tessera_core::{FromSqlValue, SqlValue};

use crate::driver::RawResult;
use crate::error::{Error, Result};

/// One result row: ordered column names shared across the result set, and
/// the row's values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Creates a row. `values` must line up with `columns`.
    #[must_use]
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Converts a driver result into rows sharing one column list.
    #[must_use]
    pub fn from_raw(raw: RawResult) -> Vec<Self> {
        let columns: Arc<[String]> = Arc::from(raw.columns);
        raw.rows
            .into_iter()
            .map(|values| Self::new(Arc::clone(&columns), values))
            .collect()
    }

    /// Column names in result order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in result order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Consumes the row, returning its values.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The raw value of a column.
    #[must_use]
    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Decodes a column.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for a missing column or a value that does
    /// not convert to `T`.
    pub fn get<T: FromSqlValue>(&self, column: &str) -> Result<T> {
        let value = self
            .value(column)
            .ok_or_else(|| Error::Decode(format!("no column named {column:?}")))?;
        Ok(value.decode()?)
    }

    /// Decodes a column by position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for an out-of-range index or a value that
    /// does not convert to `T`.
    pub fn get_index<T: FromSqlValue>(&self, index: usize) -> Result<T> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| Error::Decode(format!("no column at index {index}")))?;
        Ok(value.decode()?)
    }

    /// `(column, value)` pairs in result order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Row {
        let raw = RawResult::rows(
            &["id", "name", "score"],
            vec![vec![
                SqlValue::Int(7),
                SqlValue::Text(String::from("ada")),
                SqlValue::Null,
            ]],
        );
        Row::from_raw(raw).remove(0)
    }

    #[test]
    fn test_typed_access() {
        let row = sample();
        assert_eq!(row.get::<i64>("id").unwrap(), 7);
        assert_eq!(row.get::<String>("name").unwrap(), "ada");
        assert_eq!(row.get::<Option<f64>>("score").unwrap(), None);
        assert_eq!(row.get_index::<String>(1).unwrap(), "ada");
    }

    #[test]
    fn test_missing_column() {
        assert!(matches!(sample().get::<i64>("nope"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_preserves_column_order() {
        let row = sample();
        let names: Vec<&str> = row.iter().map(|(c, _)| c).collect();
        assert_eq!(names, vec!["id", "name", "score"]);
    }

    #[test]
    fn test_serializes_as_ordered_map() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, r#"{"id":7,"name":"ada","score":null}"#);
    }
}
