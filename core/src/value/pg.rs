//! Binary-format bridging with `postgres-types`.
//!
//! Encoding adapts to the parameter type the server inferred, so an `i32` argument can
//! fill a `bigint` parameter and text can fill a `uuid` one. Narrowing that would lose
//! information is refused.

use std::error::Error;

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres_types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{Value, text};

type BoxError = Box<dyn Error + Sync + Send>;

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot encode {} value as {}", value.kind(), ty.name()).into()
}

fn is_text_like(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    ) || ty.name() == "citext"
}

/// Encodes decimal text as NUMERIC, refusing input that would be rounded.
fn encode_numeric(text: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    Decimal::from_str_exact(text.trim())?.to_sql(ty, out)
}

fn encode_integer(n: i64, value: &Value, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(n)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(n)?.to_sql(ty, out),
        Type::INT8 => n.to_sql(ty, out),
        Type::OID => u32::try_from(n)?.to_sql(ty, out),
        Type::FLOAT8 if n.unsigned_abs() <= 1 << 53 => (n as f64).to_sql(ty, out),
        Type::FLOAT4 if n.unsigned_abs() <= 1 << 24 => (n as f32).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(n).to_sql(ty, out),
        _ if is_text_like(ty) => n.to_string().to_sql(ty, out),
        _ => Err(mismatch(value, ty)),
    }
}

fn encode_float(f: f64, value: &Value, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT8 => f.to_sql(ty, out),
        Type::FLOAT4 if f.is_nan() || f64::from(f as f32) == f => (f as f32).to_sql(ty, out),
        Type::NUMERIC => encode_numeric(&f.to_string(), ty, out),
        _ if is_text_like(ty) => value.encode_text().unwrap_or_default().to_sql(ty, out),
        _ => Err(mismatch(value, ty)),
    }
}

fn encode_via_text(value: &Value, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let rendered = value.encode_text().unwrap_or_default();
    if is_text_like(ty) {
        return rendered.to_sql(ty, out);
    }
    match text::parse(ty, &rendered)? {
        // an enum or other text-shaped type: the binary form is the label itself
        Value::Text(label) => {
            out.put_slice(label.as_bytes());
            Ok(IsNull::No)
        }
        parsed if parsed.kind() != value.kind() => parsed.to_sql(ty, out),
        _ => Err(mismatch(value, ty)),
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if let Kind::Domain(base) = ty.kind() {
            return self.to_sql(base, out);
        }
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                _ => encode_via_text(self, ty, out),
            },
            Value::SmallInt(n) => encode_integer(i64::from(*n), self, ty, out),
            Value::Integer(n) => encode_integer(i64::from(*n), self, ty, out),
            Value::BigInt(n) => encode_integer(*n, self, ty, out),
            Value::Real(f) => encode_float(f64::from(*f), self, ty, out),
            Value::Double(f) => encode_float(*f, self, ty, out),
            Value::Numeric(s) => match *ty {
                Type::NUMERIC => encode_numeric(s, ty, out),
                _ => encode_via_text(self, ty, out),
            },
            Value::Text(s) => match *ty {
                Type::BYTEA => s.as_bytes().to_sql(ty, out),
                _ if is_text_like(ty) => s.to_sql(ty, out),
                _ => encode_via_text(self, ty, out),
            },
            Value::Bytea(bytes) => match *ty {
                Type::BYTEA => bytes.to_sql(ty, out),
                _ => encode_via_text(self, ty, out),
            },
            Value::Date(d) => match *ty {
                Type::DATE => d.to_sql(ty, out),
                Type::TIMESTAMP => d.and_time(NaiveTime::MIN).to_sql(ty, out),
                Type::TIMESTAMPTZ => d.and_time(NaiveTime::MIN).and_utc().to_sql(ty, out),
                _ => encode_via_text(self, ty, out),
            },
            Value::Time(t) => match *ty {
                Type::TIME => t.to_sql(ty, out),
                _ => encode_via_text(self, ty, out),
            },
            Value::Timestamp(ts) => match *ty {
                Type::TIMESTAMP => ts.to_sql(ty, out),
                Type::TIMESTAMPTZ => ts.and_utc().to_sql(ty, out),
                _ => encode_via_text(self, ty, out),
            },
            Value::TimestampTz(ts) => match *ty {
                Type::TIMESTAMPTZ => ts.to_sql(ty, out),
                Type::TIMESTAMP => ts.naive_utc().to_sql(ty, out),
                _ => encode_via_text(self, ty, out),
            },
            Value::Uuid(u) => match *ty {
                Type::UUID => u.to_sql(ty, out),
                _ => encode_via_text(self, ty, out),
            },
            Value::Json(doc) => match *ty {
                Type::JSON | Type::JSONB => doc.to_sql(ty, out),
                _ => encode_via_text(self, ty, out),
            },
            Value::Array(items) => match ty.kind() {
                Kind::Array(_) => items.to_sql(ty, out),
                _ => encode_via_text(self, ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        match ty.kind() {
            Kind::Array(_) => return Ok(Value::Array(Vec::<Value>::from_sql(ty, raw)?)),
            Kind::Domain(base) => return Value::from_sql(base, raw),
            Kind::Enum(_) => return Ok(Value::Text(std::str::from_utf8(raw)?.to_owned())),
            _ => {}
        }

        let value = match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::SmallInt(i16::from_sql(ty, raw)?),
            Type::INT4 => Value::Integer(i32::from_sql(ty, raw)?),
            Type::INT8 => Value::BigInt(i64::from_sql(ty, raw)?),
            Type::OID => Value::BigInt(i64::from(u32::from_sql(ty, raw)?)),
            Type::FLOAT4 => Value::Real(f32::from_sql(ty, raw)?),
            Type::FLOAT8 => Value::Double(f64::from_sql(ty, raw)?),
            Type::NUMERIC => Value::Numeric(Decimal::from_sql(ty, raw)?.to_string()),
            Type::BYTEA => Value::Bytea(raw.to_vec()),
            Type::DATE => Value::Date(NaiveDate::from_sql(ty, raw)?),
            Type::TIME => Value::Time(NaiveTime::from_sql(ty, raw)?),
            Type::TIMESTAMP => Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
            Type::TIMESTAMPTZ => Value::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?),
            Type::UUID => Value::Uuid(Uuid::from_sql(ty, raw)?),
            Type::JSON | Type::JSONB => Value::Json(serde_json::Value::from_sql(ty, raw)?),
            _ => Value::Text(std::str::from_utf8(raw)?.to_owned()),
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Value::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}
