//! The PostgreSQL text wire format.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres_types::{Kind, Type};

use super::Value;
use crate::error::{RelataError, Result};

const DATE: &str = "%Y-%m-%d";
const TIME: &str = "%H:%M:%S%.f";
const TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S%.f";

pub(crate) fn encode(value: &Value, out: &mut String) {
    use std::fmt::Write;

    match value {
        Value::Null => out.push_str("NULL"),
        Value::Bool(b) => out.push(if *b { 't' } else { 'f' }),
        Value::SmallInt(n) => {
            let _ = write!(out, "{n}");
        }
        Value::Integer(n) => {
            let _ = write!(out, "{n}");
        }
        Value::BigInt(n) => {
            let _ = write!(out, "{n}");
        }
        Value::Real(f) => encode_float(f64::from(*f), &f.to_string(), out),
        Value::Double(f) => encode_float(*f, &f.to_string(), out),
        Value::Numeric(s) | Value::Text(s) => out.push_str(s),
        Value::Bytea(bytes) => {
            out.push_str("\\x");
            for b in bytes {
                let _ = write!(out, "{b:02x}");
            }
        }
        Value::Date(d) => {
            let _ = write!(out, "{}", d.format(DATE));
        }
        Value::Time(t) => {
            let _ = write!(out, "{}", t.format(TIME));
        }
        Value::Timestamp(ts) => {
            let _ = write!(out, "{}", ts.format(TIMESTAMP));
        }
        Value::TimestampTz(ts) => {
            let _ = write!(out, "{}+00", ts.naive_utc().format(TIMESTAMP));
        }
        Value::Uuid(u) => {
            let _ = write!(out, "{}", u.hyphenated());
        }
        Value::Json(doc) => out.push_str(&doc.to_string()),
        Value::Array(items) => {
            out.push('{');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                if item.is_null() {
                    out.push_str("NULL");
                    continue;
                }
                let mut element = String::new();
                encode(item, &mut element);
                write_array_element(out, &element);
            }
            out.push('}');
        }
    }
}

fn encode_float(f: f64, shortest: &str, out: &mut String) {
    if f.is_nan() {
        out.push_str("NaN");
    } else if f == f64::INFINITY {
        out.push_str("Infinity");
    } else if f == f64::NEG_INFINITY {
        out.push_str("-Infinity");
    } else {
        out.push_str(shortest);
    }
}

fn write_array_element(out: &mut String, element: &str) {
    let needs_quotes = element.is_empty()
        || element.eq_ignore_ascii_case("NULL")
        || element
            .chars()
            .any(|c| matches!(c, '{' | '}' | ',' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        out.push_str(element);
        return;
    }
    out.push('"');
    for ch in element.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
}

fn invalid(ty: &Type, text: &str, err: impl std::fmt::Display) -> RelataError {
    RelataError::conversion(format!("invalid {} input {text:?}: {err}", ty.name()))
}

/// Parses a text-format column value declared as `ty`.
pub fn parse(ty: &Type, text: &str) -> Result<Value> {
    if let Kind::Array(element) = ty.kind() {
        return parse_array(element, text);
    }
    if let Kind::Domain(base) = ty.kind() {
        return parse(base, text);
    }

    let value = match *ty {
        Type::BOOL => match text {
            "t" | "true" | "TRUE" | "y" | "yes" | "on" | "1" => Value::Bool(true),
            "f" | "false" | "FALSE" | "n" | "no" | "off" | "0" => Value::Bool(false),
            _ => return Err(invalid(ty, text, "expected t or f")),
        },
        Type::INT2 => Value::SmallInt(text.trim().parse().map_err(|e| invalid(ty, text, e))?),
        Type::INT4 => Value::Integer(text.trim().parse().map_err(|e| invalid(ty, text, e))?),
        Type::INT8 => Value::BigInt(text.trim().parse().map_err(|e| invalid(ty, text, e))?),
        Type::OID => Value::BigInt(
            text.trim()
                .parse::<u32>()
                .map(i64::from)
                .map_err(|e| invalid(ty, text, e))?,
        ),
        Type::FLOAT4 => {
            let wide = parse_float(text).map_err(|e| invalid(ty, text, e))?;
            let real = wide as f32;
            if wide.is_finite() && !real.is_finite() {
                return Err(invalid(ty, text, "out of range for real"));
            }
            Value::Real(real)
        }
        Type::FLOAT8 => Value::Double(parse_float(text).map_err(|e| invalid(ty, text, e))?),
        Type::NUMERIC => {
            let trimmed = text.trim();
            if !is_decimal(trimmed) && trimmed != "NaN" {
                return Err(invalid(ty, text, "not a decimal number"));
            }
            Value::Numeric(trimmed.to_owned())
        }
        Type::BYTEA => Value::Bytea(parse_bytea(text).map_err(|e| invalid(ty, text, e))?),
        Type::DATE => Value::Date(
            NaiveDate::parse_from_str(text, DATE).map_err(|e| invalid(ty, text, e))?,
        ),
        Type::TIME => Value::Time(
            NaiveTime::parse_from_str(text, TIME).map_err(|e| invalid(ty, text, e))?,
        ),
        Type::TIMESTAMP => Value::Timestamp(parse_timestamp(text).map_err(|e| invalid(ty, text, e))?),
        Type::TIMESTAMPTZ => {
            Value::TimestampTz(parse_timestamptz(text).map_err(|e| invalid(ty, text, e))?)
        }
        Type::UUID => Value::Uuid(text.parse().map_err(|e| invalid(ty, text, e))?),
        Type::JSON | Type::JSONB => {
            Value::Json(serde_json::from_str(text).map_err(|e| invalid(ty, text, e))?)
        }
        _ => Value::Text(text.to_owned()),
    };
    Ok(value)
}

fn parse_float(text: &str) -> std::result::Result<f64, std::num::ParseFloatError> {
    match text.trim() {
        "Infinity" => Ok(f64::INFINITY),
        "-Infinity" => Ok(f64::NEG_INFINITY),
        other => other.parse(),
    }
}

pub(crate) fn is_decimal(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
    !(int.is_empty() && frac.is_empty())
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
}

pub(crate) fn parse_timestamp(text: &str) -> chrono::ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
}

pub(crate) fn parse_timestamptz(text: &str) -> chrono::ParseResult<DateTime<Utc>> {
    DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|_| parse_timestamp(text).map(|naive| naive.and_utc()))
}

fn parse_bytea(text: &str) -> std::result::Result<Vec<u8>, String> {
    if let Some(hex) = text.strip_prefix("\\x") {
        if hex.len() % 2 != 0 {
            return Err("odd number of hex digits".into());
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err("invalid hex digit".into());
        }
        return (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| e.to_string()))
            .collect();
    }

    // escape format: backslash followed by three octal digits or another backslash
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
        } else if bytes.get(i + 1) == Some(&b'\\') {
            out.push(b'\\');
            i += 2;
        } else {
            let octal = text.get(i + 1..i + 4).ok_or("truncated escape")?;
            out.push(u8::from_str_radix(octal, 8).map_err(|e| e.to_string())?);
            i += 4;
        }
    }
    Ok(out)
}

fn parse_array(element: &Type, text: &str) -> Result<Value> {
    let items = split_array(text).map_err(|e| {
        RelataError::conversion(format!("invalid {}[] input {text:?}: {e}", element.name()))
    })?;
    items
        .into_iter()
        .map(|item| match item {
            Some(raw) => parse(element, &raw),
            None => Ok(Value::Null),
        })
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

/// Splits a one-dimensional array literal into its raw elements; `None` marks NULL.
fn split_array(text: &str) -> std::result::Result<Vec<Option<String>>, &'static str> {
    let body = text
        .trim()
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or("missing braces")?;
    let mut items = Vec::new();
    if body.is_empty() {
        return Ok(items);
    }

    let mut chars = body.chars().peekable();
    loop {
        let mut current = String::new();
        let quoted = chars.peek() == Some(&'"');
        if quoted {
            chars.next();
            loop {
                match chars.next() {
                    Some('\\') => current.push(chars.next().ok_or("dangling escape")?),
                    Some('"') => break,
                    Some(ch) => current.push(ch),
                    None => return Err("unterminated quoted element"),
                }
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch == ',' {
                    break;
                }
                if ch == '{' {
                    return Err("multi-dimensional arrays are not supported");
                }
                current.push(ch);
                chars.next();
            }
        }

        if !quoted && current.eq_ignore_ascii_case("NULL") {
            items.push(None);
        } else {
            items.push(Some(current));
        }

        match chars.next() {
            Some(',') => continue,
            None => break,
            Some(_) => return Err("unexpected character after element"),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn arrays_round_trip_with_quoting() {
        let value = Value::Array(vec![
            Value::Text("plain".into()),
            Value::Text("with space".into()),
            Value::Null,
            Value::Text("NULL".into()),
            Value::Text(r#"q"uote"#.into()),
            Value::Text(String::new()),
        ]);
        let text = value.encode_text().unwrap();
        assert_eq!(text, r#"{plain,"with space",NULL,"NULL","q\"uote",""}"#);
        assert_eq!(parse(&Type::TEXT_ARRAY, &text).unwrap(), value);
    }

    #[test]
    fn int_arrays_parse_elements_by_type() {
        let parsed = parse(&Type::INT8_ARRAY, "{1,-2,NULL}").unwrap();
        assert_eq!(
            parsed,
            Value::Array(vec![Value::BigInt(1), Value::BigInt(-2), Value::Null])
        );
        assert!(parse(&Type::INT8_ARRAY, "{1,x}").is_err());
        assert_eq!(parse(&Type::INT4_ARRAY, "{}").unwrap(), Value::Array(vec![]));
    }

    #[test]
    fn bytea_hex_and_escape_forms() {
        assert_eq!(
            parse(&Type::BYTEA, "\\x00ff10").unwrap(),
            Value::Bytea(vec![0, 255, 16])
        );
        assert_eq!(
            parse(&Type::BYTEA, "ab\\\\\\001").unwrap(),
            Value::Bytea(vec![b'a', b'b', b'\\', 1])
        );
        assert!(parse(&Type::BYTEA, "\\x0").is_err());
        assert!(parse(&Type::BYTEA, "\\xa\u{e9}0").is_err());
        assert!(parse(&Type::BYTEA, "\\x+f").is_err());
    }

    #[test]
    fn temporal_text_forms() {
        let ts = parse(&Type::TIMESTAMPTZ, "2024-03-01 12:30:00.25+02").unwrap();
        assert_eq!(ts.encode_text().unwrap(), "2024-03-01 10:30:00.250+00");

        let naive = parse(&Type::TIMESTAMP, "2024-03-01 12:30:00").unwrap();
        assert_eq!(naive.encode_text().unwrap(), "2024-03-01 12:30:00");

        assert!(parse(&Type::DATE, "2024-02-30").is_err());
    }

    #[test]
    fn floats_and_numerics() {
        assert_eq!(parse(&Type::FLOAT8, "Infinity").unwrap(), Value::Double(f64::INFINITY));
        assert_eq!(parse(&Type::FLOAT4, "-Infinity").unwrap(), Value::Real(f32::NEG_INFINITY));
        assert_eq!(parse(&Type::FLOAT4, "1.5").unwrap(), Value::Real(1.5));
        assert!(matches!(
            parse(&Type::FLOAT4, "1e300"),
            Err(RelataError::Conversion { .. })
        ));
        assert_eq!(Value::Double(0.1).encode_text().unwrap(), "0.1");
        assert_eq!(
            parse(&Type::NUMERIC, "-12.500").unwrap(),
            Value::Numeric("-12.500".into())
        );
        assert!(parse(&Type::NUMERIC, "12a").is_err());
        assert!(parse(&Type::BOOL, "maybe").is_err());
    }
}
