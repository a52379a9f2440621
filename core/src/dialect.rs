//! PostgreSQL quoting primitives.

use crate::value::Value;

/// Renders a numbered PostgreSQL placeholder (`$1`, `$2`, ...).
#[inline]
pub fn render_placeholder(index: usize) -> String {
    format!("${index}")
}

/// Quotes an identifier, splitting on `.` so `alias.column` becomes `"alias"."column"`.
///
/// `*` segments and segments that are already double-quoted pass through untouched.
pub fn quote_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    write_ident(&mut out, name);
    out
}

pub fn write_ident(out: &mut String, name: &str) {
    if name.starts_with('"') && name.ends_with('"') && name.len() > 1 {
        out.push_str(name);
        return;
    }
    for (i, part) in name.split('.').enumerate() {
        if i > 0 {
            out.push('.');
        }
        if part == "*" {
            out.push('*');
            continue;
        }
        out.push('"');
        for ch in part.chars() {
            if ch == '"' {
                out.push('"');
            }
            out.push(ch);
        }
        out.push('"');
    }
}

/// Renders a value as a SQL literal. Only used for diagnostics such as `Display` on a query.
pub fn quote_literal(value: &Value) -> String {
    let mut out = String::new();
    write_literal(&mut out, value);
    out
}

pub fn write_literal(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("NULL"),
        Value::Bool(b) => out.push_str(if *b { "TRUE" } else { "FALSE" }),
        Value::SmallInt(_) | Value::Integer(_) | Value::BigInt(_) | Value::Numeric(_) => {
            if let Some(text) = value.encode_text() {
                out.push_str(&text);
            }
        }
        Value::Real(f) if f.is_finite() => out.push_str(&f.to_string()),
        Value::Double(f) if f.is_finite() => out.push_str(&f.to_string()),
        other => {
            let text = other.encode_text().unwrap_or_default();
            write_string_literal(out, &text);
            if let Some(cast) = other.cast_suffix() {
                out.push_str("::");
                out.push_str(cast);
            }
        }
    }
}

fn write_string_literal(out: &mut String, text: &str) {
    if text.contains('\\') {
        out.push('E');
    }
    out.push('\'');
    for ch in text.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idents_are_quoted_per_segment() {
        assert_eq!(quote_ident("user.name"), r#""user"."name""#);
        assert_eq!(quote_ident("user.*"), r#""user".*"#);
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
        assert_eq!(quote_ident(r#""Already""#), r#""Already""#);
    }

    #[test]
    fn literals_escape_quotes_and_backslashes() {
        assert_eq!(quote_literal(&Value::Text("it's".into())), "'it''s'");
        assert_eq!(quote_literal(&Value::Text(r"a\b".into())), r"E'a\\b'");
        assert_eq!(quote_literal(&Value::Null), "NULL");
        assert_eq!(quote_literal(&Value::BigInt(-7)), "-7");
        assert_eq!(quote_literal(&Value::Bool(true)), "TRUE");
    }
}
