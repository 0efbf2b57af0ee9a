//! SQL values and typed conversions.
//!
//! `SqlValue` is the closed set of scalar kinds the literalizer knows how to
//! render. Values only become SQL text through [`Dialect::literal`], which
//! routes every string through a single escaping function.
//!
//! [`Dialect::literal`]: crate::dialect::Dialect::literal

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::error::{CoreError, Result};

/// A fixed-point decimal number kept in its exact textual form.
///
/// The text is validated on construction (optional sign, digits, optional
/// fractional part), so it can be emitted into SQL without quoting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Decimal(String);

impl Decimal {
    /// Parses a decimal literal such as `-12.50`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDecimal`] if `text` is not a plain decimal.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let unsigned = trimmed
            .strip_prefix('-')
            .or_else(|| trimmed.strip_prefix('+'))
            .unwrap_or(trimmed);
        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (unsigned, None),
        };
        let digits_ok = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        let valid = digits_ok(int_part)
            && frac_part.map_or(true, digits_ok)
            && !(int_part.is_empty() && frac_part.map_or(true, str::is_empty));
        if valid {
            Ok(Self(trimmed.trim_start_matches('+').to_string()))
        } else {
            Err(CoreError::InvalidDecimal(text.to_string()))
        }
    }

    /// Returns the decimal's textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed SQL value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Fixed-point decimal value.
    Decimal(Decimal),
    /// Text value.
    Text(String),
    /// Binary value.
    Blob(Vec<u8>),
    /// Calendar date.
    Date(NaiveDate),
    /// Date and time without zone.
    DateTime(NaiveDateTime),
    /// Time of day.
    Time(NaiveTime),
    /// Ordered list of values.
    Array(Vec<SqlValue>),
}

impl SqlValue {
    /// Returns true for `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the value's kind, used in decode errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Time(_) => "time",
            Self::Array(_) => "array",
        }
    }

    /// Decodes this value into a Rust type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Decode`] when the value has no sensible
    /// conversion to `T`.
    pub fn decode<T: FromSqlValue>(&self) -> Result<T> {
        T::from_sql_value(self)
    }
}

/// Trait for types that can be converted to SQL values.
pub trait ToSqlValue {
    /// Converts the value to a `SqlValue`.
    fn to_sql_value(self) -> SqlValue;
}

impl ToSqlValue for SqlValue {
    fn to_sql_value(self) -> SqlValue {
        self
    }
}

impl ToSqlValue for bool {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Bool(self)
    }
}

macro_rules! int_to_sql_value {
    ($($ty:ty),*) => {
        $(
            impl ToSqlValue for $ty {
                fn to_sql_value(self) -> SqlValue {
                    SqlValue::Int(i64::from(self))
                }
            }
        )*
    };
}

int_to_sql_value!(i64, i32, i16, i8, u32, u16, u8);

impl ToSqlValue for f64 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(self)
    }
}

impl ToSqlValue for f32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(f64::from(self))
    }
}

impl ToSqlValue for Decimal {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Decimal(self)
    }
}

impl ToSqlValue for String {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self)
    }
}

impl ToSqlValue for &str {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(String::from(self))
    }
}

impl ToSqlValue for &String {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self.clone())
    }
}

impl ToSqlValue for Vec<u8> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self)
    }
}

impl ToSqlValue for &[u8] {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self.to_vec())
    }
}

impl ToSqlValue for NaiveDate {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Date(self)
    }
}

impl ToSqlValue for NaiveDateTime {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::DateTime(self)
    }
}

impl ToSqlValue for NaiveTime {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Time(self)
    }
}

impl<T: ToSqlValue> ToSqlValue for Option<T> {
    fn to_sql_value(self) -> SqlValue {
        match self {
            Some(v) => v.to_sql_value(),
            None => SqlValue::Null,
        }
    }
}

/// Builds an array value from anything convertible.
#[must_use]
pub fn array<T: ToSqlValue>(values: impl IntoIterator<Item = T>) -> SqlValue {
    SqlValue::Array(values.into_iter().map(ToSqlValue::to_sql_value).collect())
}

/// Trait for types that can be decoded from SQL values.
///
/// Conversions are lenient about the forms drivers commonly return: integers
/// and text stand in for booleans, text stands in for dates and numbers.
pub trait FromSqlValue: Sized {
    /// Converts a `SqlValue` into `Self`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Decode`] if no conversion applies.
    fn from_sql_value(value: &SqlValue) -> Result<Self>;
}

fn mismatch<T>(expected: &'static str, value: &SqlValue) -> Result<T> {
    Err(CoreError::Decode {
        expected,
        found: value.kind().to_string(),
    })
}

impl FromSqlValue for SqlValue {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Int(n) => Ok(*n),
            SqlValue::Bool(b) => Ok(Self::from(*b)),
            SqlValue::Decimal(d) if !d.as_str().contains('.') => d
                .as_str()
                .parse()
                .or_else(|_| mismatch("i64", value)),
            SqlValue::Text(s) => s.trim().parse().or_else(|_| mismatch("i64", value)),
            _ => mismatch("i64", value),
        }
    }
}

impl FromSqlValue for i32 {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        let wide = i64::from_sql_value(value)?;
        Self::try_from(wide).or_else(|_| mismatch("i32", value))
    }
}

impl FromSqlValue for u64 {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        let wide = i64::from_sql_value(value)?;
        Self::try_from(wide).or_else(|_| mismatch("u64", value))
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Float(f) => Ok(*f),
            #[allow(clippy::cast_precision_loss)]
            SqlValue::Int(n) => Ok(*n as Self),
            SqlValue::Decimal(d) => d.as_str().parse().or_else(|_| mismatch("f64", value)),
            SqlValue::Text(s) => match s.trim() {
                "NaN" => Ok(Self::NAN),
                "Infinity" => Ok(Self::INFINITY),
                "-Infinity" => Ok(Self::NEG_INFINITY),
                other => other.parse().or_else(|_| mismatch("f64", value)),
            },
            _ => mismatch("f64", value),
        }
    }
}

impl FromSqlValue for Decimal {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Decimal(d) => Ok(d.clone()),
            SqlValue::Int(n) => Self::parse(&n.to_string()),
            SqlValue::Text(s) => Self::parse(s),
            _ => mismatch("Decimal", value),
        }
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Bool(b) => Ok(*b),
            SqlValue::Int(0) => Ok(false),
            SqlValue::Int(1) => Ok(true),
            SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "1" | "y" | "yes" => Ok(true),
                "f" | "false" | "0" | "n" | "no" => Ok(false),
                _ => mismatch("bool", value),
            },
            _ => mismatch("bool", value),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Text(s) => Ok(s.clone()),
            SqlValue::Decimal(d) => Ok(d.to_string()),
            SqlValue::Blob(b) => Self::from_utf8(b.clone()).or_else(|_| mismatch("String", value)),
            _ => mismatch("String", value),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Blob(b) => Ok(b.clone()),
            SqlValue::Text(s) => Ok(s.clone().into_bytes()),
            _ => mismatch("Vec<u8>", value),
        }
    }
}

impl FromSqlValue for NaiveDate {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Date(d) => Ok(*d),
            SqlValue::DateTime(dt) => Ok(dt.date()),
            SqlValue::Text(s) => {
                Self::parse_from_str(s.trim(), "%Y-%m-%d").or_else(|_| mismatch("NaiveDate", value))
            }
            _ => mismatch("NaiveDate", value),
        }
    }
}

impl FromSqlValue for NaiveDateTime {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::DateTime(dt) => Ok(*dt),
            SqlValue::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            SqlValue::Text(s) => {
                let s = s.trim();
                Self::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .or_else(|_| Self::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                    .or_else(|_| mismatch("NaiveDateTime", value))
            }
            _ => mismatch("NaiveDateTime", value),
        }
    }
}

impl FromSqlValue for NaiveTime {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Time(t) => Ok(*t),
            SqlValue::DateTime(dt) => Ok(dt.time()),
            SqlValue::Text(s) => {
                Self::parse_from_str(s.trim(), "%H:%M:%S%.f").or_else(|_| mismatch("NaiveTime", value))
            }
            _ => mismatch("NaiveTime", value),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_sql_value(value).map(Some)
        }
    }
}
