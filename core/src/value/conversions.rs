//! `ToValue` / `FromValue` / `ColumnType` implementations for the supported Rust types.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{ColumnType, FromValue, ToValue, Value, text};
use crate::error::{RelataError, Result};

fn unexpected(value: &Value, target: &str) -> RelataError {
    RelataError::conversion(format!("cannot convert {} into {target}", value.kind()))
}

fn null_into(value: &Value) -> Result<()> {
    if value.is_null() {
        return Err(RelataError::Nullability {
            column: String::new(),
        });
    }
    Ok(())
}

/// Parses an integer written in decimal, allowing a fractional part made only of zeros.
fn parse_exact_integer(text: &str, target: &str) -> Result<i128> {
    let text = text.trim();
    let (int, frac) = text.split_once('.').unwrap_or((text, ""));
    if !frac.bytes().all(|b| b == b'0') {
        return Err(RelataError::conversion(format!(
            "{text:?} has a fractional part and cannot be stored in {target}"
        )));
    }
    int.parse::<i128>()
        .map_err(|e| RelataError::conversion(format!("invalid integer {text:?} for {target}: {e}")))
}

fn exact_integer(value: &Value, target: &str) -> Result<i128> {
    null_into(value)?;
    match value {
        Value::SmallInt(n) => Ok(i128::from(*n)),
        Value::Integer(n) => Ok(i128::from(*n)),
        Value::BigInt(n) => Ok(i128::from(*n)),
        Value::Real(f) => float_to_integer(f64::from(*f), target),
        Value::Double(f) => float_to_integer(*f, target),
        Value::Numeric(s) | Value::Text(s) => parse_exact_integer(s, target),
        other => Err(unexpected(other, target)),
    }
}

fn float_to_integer(f: f64, target: &str) -> Result<i128> {
    if !f.is_finite() || f.fract() != 0.0 {
        return Err(RelataError::conversion(format!(
            "{f} cannot be stored in {target} without loss"
        )));
    }
    if f.abs() >= 2f64.powi(127) {
        return Err(RelataError::conversion(format!("{f} overflows {target}")));
    }
    Ok(f as i128)
}

macro_rules! impl_integer {
    ($($ty:ty => $variant:ident, $sql:literal;)*) => {
        $(
            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    match TryFrom::try_from(*self) {
                        Ok(n) => Value::$variant(n),
                        Err(_) => Value::Numeric(self.to_string()),
                    }
                }
            }

            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    let wide = exact_integer(&value, stringify!($ty))?;
                    <$ty>::try_from(wide).map_err(|_| {
                        RelataError::conversion(format!(
                            "{wide} overflows {}",
                            stringify!($ty)
                        ))
                    })
                }
            }

            impl ColumnType for $ty {
                const SQL_TYPE: &'static str = $sql;
            }
        )*
    };
}

impl_integer! {
    i8 => SmallInt, "smallint";
    i16 => SmallInt, "smallint";
    i32 => Integer, "integer";
    i64 => BigInt, "bigint";
    isize => BigInt, "bigint";
    u8 => SmallInt, "smallint";
    u16 => Integer, "integer";
    u32 => BigInt, "bigint";
    u64 => BigInt, "bigint";
    usize => BigInt, "bigint";
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Double(*self)
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        null_into(&value)?;
        match value {
            Value::Double(f) => Ok(f),
            Value::Real(f) => Ok(f64::from(f)),
            Value::SmallInt(n) => Ok(f64::from(n)),
            Value::Integer(n) => Ok(f64::from(n)),
            Value::BigInt(n) if n.unsigned_abs() <= 1 << 53 => Ok(n as f64),
            Value::BigInt(n) => Err(RelataError::conversion(format!(
                "{n} cannot be represented exactly as f64"
            ))),
            Value::Numeric(s) | Value::Text(s) => parse_float(&s),
            other => Err(unexpected(&other, "f64")),
        }
    }
}

impl ColumnType for f64 {
    const SQL_TYPE: &'static str = "double precision";
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Real(*self)
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        null_into(&value)?;
        let wide = match value {
            Value::Real(f) => return Ok(f),
            Value::SmallInt(n) => return Ok(f32::from(n)),
            Value::Integer(n) if n.unsigned_abs() <= 1 << 24 => return Ok(n as f32),
            Value::BigInt(n) if n.unsigned_abs() <= 1 << 24 => return Ok(n as f32),
            Value::Integer(_) | Value::BigInt(_) => {
                return Err(RelataError::conversion(format!(
                    "{} cannot be represented exactly as f32",
                    value.encode_text().unwrap_or_default()
                )));
            }
            Value::Double(f) => f,
            Value::Numeric(s) | Value::Text(s) => parse_float(&s)?,
            other => return Err(unexpected(&other, "f32")),
        };
        let narrow = wide as f32;
        if wide.is_finite() && f64::from(narrow) != wide {
            return Err(RelataError::conversion(format!(
                "{wide} loses precision as f32"
            )));
        }
        Ok(narrow)
    }
}

impl ColumnType for f32 {
    const SQL_TYPE: &'static str = "real";
}

fn parse_float(text: &str) -> Result<f64> {
    match text.trim() {
        "Infinity" => Ok(f64::INFINITY),
        "-Infinity" => Ok(f64::NEG_INFINITY),
        other => other
            .parse()
            .map_err(|e| RelataError::conversion(format!("invalid float {other:?}: {e}"))),
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        null_into(&value)?;
        match value {
            Value::Bool(b) => Ok(b),
            Value::Text(s) => match s.as_str() {
                "t" | "true" | "TRUE" => Ok(true),
                "f" | "false" | "FALSE" => Ok(false),
                _ => Err(RelataError::conversion(format!("invalid boolean {s:?}"))),
            },
            other => Err(unexpected(&other, "bool")),
        }
    }
}

impl ColumnType for bool {
    const SQL_TYPE: &'static str = "boolean";
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_owned())
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        null_into(&value)?;
        match value {
            Value::Text(s) | Value::Numeric(s) => Ok(s),
            Value::Json(doc) => Ok(doc.to_string()),
            Value::Bytea(bytes) => String::from_utf8(bytes)
                .map_err(|e| RelataError::conversion(format!("bytea is not valid utf-8: {e}"))),
            other => Ok(other.encode_text().unwrap_or_default()),
        }
    }
}

impl ColumnType for String {
    const SQL_TYPE: &'static str = "text";
}

impl ToValue for [u8] {
    fn to_value(&self) -> Value {
        Value::Bytea(self.to_vec())
    }
}

impl ToValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Bytea(self.clone())
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        null_into(&value)?;
        match value {
            Value::Bytea(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            other => Err(unexpected(&other, "Vec<u8>")),
        }
    }
}

impl ColumnType for Vec<u8> {
    const SQL_TYPE: &'static str = "bytea";
}

impl ToValue for NaiveDate {
    fn to_value(&self) -> Value {
        Value::Date(*self)
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self> {
        null_into(&value)?;
        match value {
            Value::Date(d) => Ok(d),
            Value::Timestamp(ts) if ts.time() == NaiveTime::MIN => Ok(ts.date()),
            Value::Timestamp(ts) => Err(RelataError::conversion(format!(
                "timestamp {ts} has a time of day and cannot be stored as a date"
            ))),
            Value::Text(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| RelataError::conversion(format!("invalid date {s:?}: {e}"))),
            other => Err(unexpected(&other, "NaiveDate")),
        }
    }
}

impl ColumnType for NaiveDate {
    const SQL_TYPE: &'static str = "date";
}

impl ToValue for NaiveTime {
    fn to_value(&self) -> Value {
        Value::Time(*self)
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> Result<Self> {
        null_into(&value)?;
        match value {
            Value::Time(t) => Ok(t),
            Value::Text(s) => NaiveTime::parse_from_str(&s, "%H:%M:%S%.f")
                .map_err(|e| RelataError::conversion(format!("invalid time {s:?}: {e}"))),
            other => Err(unexpected(&other, "NaiveTime")),
        }
    }
}

impl ColumnType for NaiveTime {
    const SQL_TYPE: &'static str = "time";
}

impl ToValue for NaiveDateTime {
    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self> {
        null_into(&value)?;
        match value {
            Value::Timestamp(ts) => Ok(ts),
            Value::TimestampTz(ts) => Ok(ts.naive_utc()),
            Value::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            Value::Text(s) => text::parse_timestamp(&s)
                .map_err(|e| RelataError::conversion(format!("invalid timestamp {s:?}: {e}"))),
            other => Err(unexpected(&other, "NaiveDateTime")),
        }
    }
}

impl ColumnType for NaiveDateTime {
    const SQL_TYPE: &'static str = "timestamp";
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::TimestampTz(*self)
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self> {
        null_into(&value)?;
        match value {
            Value::TimestampTz(ts) => Ok(ts),
            Value::Timestamp(ts) => Ok(ts.and_utc()),
            Value::Date(d) => Ok(d.and_time(NaiveTime::MIN).and_utc()),
            Value::Text(s) => text::parse_timestamptz(&s)
                .map_err(|e| RelataError::conversion(format!("invalid timestamptz {s:?}: {e}"))),
            other => Err(unexpected(&other, "DateTime<Utc>")),
        }
    }
}

impl ColumnType for DateTime<Utc> {
    const SQL_TYPE: &'static str = "timestamptz";
}

impl ToValue for Uuid {
    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self> {
        null_into(&value)?;
        match value {
            Value::Uuid(u) => Ok(u),
            Value::Text(s) => s
                .parse()
                .map_err(|e| RelataError::conversion(format!("invalid uuid {s:?}: {e}"))),
            Value::Bytea(b) => Uuid::from_slice(&b)
                .map_err(|e| RelataError::conversion(format!("invalid uuid bytes: {e}"))),
            other => Err(unexpected(&other, "Uuid")),
        }
    }
}

impl ColumnType for Uuid {
    const SQL_TYPE: &'static str = "uuid";
}

impl ToValue for Decimal {
    fn to_value(&self) -> Value {
        Value::Numeric(self.to_string())
    }
}

impl FromValue for Decimal {
    fn from_value(value: Value) -> Result<Self> {
        null_into(&value)?;
        match value {
            Value::SmallInt(n) => Ok(Decimal::from(n)),
            Value::Integer(n) => Ok(Decimal::from(n)),
            Value::BigInt(n) => Ok(Decimal::from(n)),
            Value::Numeric(s) | Value::Text(s) => Decimal::from_str_exact(s.trim())
                .map_err(|e| RelataError::conversion(format!("invalid decimal {s:?}: {e}"))),
            other => Err(unexpected(&other, "Decimal")),
        }
    }
}

impl ColumnType for Decimal {
    const SQL_TYPE: &'static str = "numeric";
}

impl ToValue for serde_json::Value {
    fn to_value(&self) -> Value {
        Value::Json(self.clone())
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> Result<Self> {
        null_into(&value)?;
        match value {
            Value::Json(doc) => Ok(doc),
            Value::Text(s) => serde_json::from_str(&s)
                .map_err(|e| RelataError::conversion(format!("invalid json {s:?}: {e}"))),
            Value::Bool(b) => Ok(serde_json::Value::Bool(b)),
            Value::SmallInt(n) => Ok(n.into()),
            Value::Integer(n) => Ok(n.into()),
            Value::BigInt(n) => Ok(n.into()),
            Value::Double(f) => Ok(f.into()),
            other => Err(unexpected(&other, "serde_json::Value")),
        }
    }
}

impl ColumnType for serde_json::Value {
    const SQL_TYPE: &'static str = "jsonb";
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }

    fn try_to_value(&self) -> Result<Value> {
        (**self).try_to_value()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn try_to_value(&self) -> Result<Value> {
        match self {
            Some(inner) => inner.try_to_value(),
            None => Ok(Value::Null),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ColumnType> ColumnType for Option<T> {
    const SQL_TYPE: &'static str = T::SQL_TYPE;
    const NULLABLE: bool = true;
}

fn array_from_value<T: FromValue>(value: Value, target: &str) -> Result<Vec<T>> {
    null_into(&value)?;
    match value {
        Value::Array(items) => items.into_iter().map(T::from_value).collect(),
        other => Err(unexpected(&other, target)),
    }
}

macro_rules! impl_array {
    ($($ty:ty => $sql:literal;)*) => {
        $(
            impl ToValue for Vec<$ty> {
                fn to_value(&self) -> Value {
                    Value::Array(self.iter().map(ToValue::to_value).collect())
                }
            }

            impl FromValue for Vec<$ty> {
                fn from_value(value: Value) -> Result<Self> {
                    array_from_value(value, concat!("Vec<", stringify!($ty), ">"))
                }
            }

            impl ColumnType for Vec<$ty> {
                const SQL_TYPE: &'static str = $sql;
            }
        )*
    };
}

impl_array! {
    bool => "boolean[]";
    i16 => "smallint[]";
    i32 => "integer[]";
    i64 => "bigint[]";
    f32 => "real[]";
    f64 => "double precision[]";
    String => "text[]";
    Uuid => "uuid[]";
    NaiveDate => "date[]";
    NaiveDateTime => "timestamp[]";
    DateTime<Utc> => "timestamptz[]";
    Option<i32> => "integer[]";
    Option<i64> => "bigint[]";
    Option<String> => "text[]";
}

impl ToValue for Vec<Value> {
    fn to_value(&self) -> Value {
        Value::Array(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn integer_narrowing_is_checked() {
        assert_eq!(i16::from_value(Value::BigInt(300)).unwrap(), 300);
        assert!(i16::from_value(Value::BigInt(40_000)).unwrap_err().is_conversion());
        assert!(u8::from_value(Value::Integer(-1)).unwrap_err().is_conversion());
        assert_eq!(i64::from_value(Value::Numeric("12.000".into())).unwrap(), 12);
        assert!(i64::from_value(Value::Numeric("12.5".into())).is_err());
        assert!(i32::from_value(Value::Double(1.5)).is_err());
        assert_eq!(i32::from_value(Value::Double(4.0)).unwrap(), 4);
    }

    #[test]
    fn decimals_are_exact() {
        let price = Decimal::from_value(Value::Numeric("19.990".into())).unwrap();
        assert_eq!(price.to_string(), "19.990");
        assert_eq!(price.to_value(), Value::Numeric("19.990".into()));
        assert_eq!(Decimal::from_value(Value::BigInt(-3)).unwrap(), Decimal::from(-3));
        assert!(Decimal::from_value(Value::Numeric("NaN".into())).unwrap_err().is_conversion());
        assert!(Decimal::from_value(Value::Double(0.1)).unwrap_err().is_conversion());
    }

    #[test]
    fn float_precision_is_checked() {
        assert_eq!(f32::from_value(Value::Double(0.5)).unwrap(), 0.5);
        assert!(f32::from_value(Value::Double(0.1)).is_err());
        assert!(f64::from_value(Value::BigInt(i64::MAX)).is_err());
        assert_eq!(f64::from_value(Value::BigInt(1 << 40)).unwrap(), (1u64 << 40) as f64);
    }

    #[test]
    fn null_semantics() {
        assert!(i64::from_value(Value::Null).unwrap_err().is_nullability());
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Option::<i64>::from_value(Value::Integer(3)).unwrap(), Some(3));
    }

    #[test]
    fn large_unsigned_values_stay_exact() {
        assert_eq!(u64::MAX.to_value(), Value::Numeric(u64::MAX.to_string()));
        assert_eq!(u64::from_value(Value::Numeric(u64::MAX.to_string())).unwrap(), u64::MAX);
        assert_eq!(7u64.to_value(), Value::BigInt(7));
    }

    #[test]
    fn arrays_convert_element_wise() {
        let arr = Value::Array(vec![Value::Integer(1), Value::BigInt(2)]);
        assert_eq!(Vec::<i64>::from_value(arr).unwrap(), vec![1, 2]);
        let with_null = Value::Array(vec![Value::Integer(1), Value::Null]);
        assert!(Vec::<i64>::from_value(with_null.clone()).is_err());
        assert_eq!(
            Vec::<Option<i64>>::from_value(with_null).unwrap(),
            vec![Some(1), None]
        );
    }

    #[test]
    fn dates_refuse_time_of_day() {
        let midnight = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(NaiveDate::from_value(Value::Timestamp(midnight)).is_ok());
        let noon = midnight.with_hour(12).unwrap();
        assert!(NaiveDate::from_value(Value::Timestamp(noon)).is_err());
    }
}
