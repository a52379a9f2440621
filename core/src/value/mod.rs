//! Dynamically typed column values and the conversion traits between them and Rust types.

mod conversions;
mod pg;
pub mod text;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::error::Result;

/// A single PostgreSQL value, as bound into a statement or read from a row.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    /// NUMERIC in its exact decimal text form
    Numeric(String),
    Text(String),
    Bytea(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value equals the zero value of its type.
    ///
    /// Zero primary keys and zero `use_default` columns are rendered as `DEFAULT` on insert.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::SmallInt(n) => *n == 0,
            Value::Integer(n) => *n == 0,
            Value::BigInt(n) => *n == 0,
            Value::Real(f) => *f == 0.0,
            Value::Double(f) => *f == 0.0,
            Value::Numeric(s) => s.trim_start_matches(['-', '+']).chars().all(|c| c == '0' || c == '.'),
            Value::Text(s) => s.is_empty(),
            Value::Bytea(b) => b.is_empty(),
            Value::Date(d) => *d == NaiveDate::default(),
            Value::Time(t) => *t == NaiveTime::default(),
            Value::Timestamp(ts) => *ts == NaiveDateTime::default(),
            Value::TimestampTz(ts) => *ts == DateTime::<Utc>::default(),
            Value::Uuid(u) => u.is_nil(),
            Value::Json(j) => j.is_null(),
            Value::Array(items) => items.is_empty(),
        }
    }

    /// Name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::SmallInt(_) => "smallint",
            Value::Integer(_) => "integer",
            Value::BigInt(_) => "bigint",
            Value::Real(_) => "real",
            Value::Double(_) => "double precision",
            Value::Numeric(_) => "numeric",
            Value::Text(_) => "text",
            Value::Bytea(_) => "bytea",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "jsonb",
            Value::Array(_) => "array",
        }
    }

    /// Cast appended to a quoted literal so the server reads it with the right type.
    pub(crate) fn cast_suffix(&self) -> Option<&'static str> {
        match self {
            Value::Text(_) | Value::Null | Value::Array(_) => None,
            Value::Bool(_) | Value::SmallInt(_) | Value::Integer(_) | Value::BigInt(_) => None,
            other => Some(other.kind()),
        }
    }

    /// Encodes the value in the PostgreSQL text format. `None` for NULL.
    pub fn encode_text(&self) -> Option<String> {
        if self.is_null() {
            return None;
        }
        let mut out = String::new();
        text::encode(self, &mut out);
        Some(out)
    }

    /// Stable textual key used to match related records during eager loading.
    pub(crate) fn key_text(&self) -> String {
        match self {
            Value::SmallInt(n) => n.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::BigInt(n) => n.to_string(),
            other => other.encode_text().unwrap_or_else(|| "\u{0}NULL".to_owned()),
        }
    }
}

/// Conversion of a Rust value into a bound [`Value`]. Lossless representations are chosen
/// (for example `u64` beyond `i64::MAX` becomes NUMERIC).
pub trait ToValue {
    fn to_value(&self) -> Value;

    /// Like [`to_value`](Self::to_value), but reports values that cannot be represented.
    /// Record columns and query arguments are converted through this method.
    fn try_to_value(&self) -> Result<Value> {
        Ok(self.to_value())
    }
}

/// Lossless conversion of a decoded [`Value`] into a Rust destination.
///
/// Implementations return [`RelataError::Conversion`](crate::RelataError::Conversion) when the
/// value cannot be represented exactly and
/// [`RelataError::Nullability`](crate::RelataError::Nullability) for NULL into a non-`Option`.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

/// A Rust type usable as a model column.
pub trait ColumnType: ToValue + FromValue + Send + Sync + 'static {
    /// SQL type name used in DDL and casts
    const SQL_TYPE: &'static str;
    /// Whether NULL is a legal value
    const NULLABLE: bool = false;
}

/// A JSON document column decoded through `serde`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize> ToValue for Json<T> {
    /// A document that fails to serialize becomes NULL here; use
    /// [`try_to_value`](ToValue::try_to_value) to see the error.
    fn to_value(&self) -> Value {
        self.try_to_value().unwrap_or(Value::Null)
    }

    fn try_to_value(&self) -> Result<Value> {
        serde_json::to_value(&self.0)
            .map(Value::Json)
            .map_err(|e| crate::RelataError::conversion(format!("cannot serialize json: {e}")))
    }
}

impl<T: DeserializeOwned> FromValue for Json<T> {
    fn from_value(value: Value) -> Result<Self> {
        let doc = serde_json::Value::from_value(value)?;
        serde_json::from_value(doc)
            .map(Json)
            .map_err(|e| crate::RelataError::conversion(format!("invalid json document: {e}")))
    }
}

impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> ColumnType for Json<T> {
    const SQL_TYPE: &'static str = "jsonb";
}
