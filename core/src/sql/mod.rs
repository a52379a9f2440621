mod chunk;

use std::borrow::Cow;
use std::fmt;

use smallvec::SmallVec;

pub use chunk::SQLChunk;

use crate::dialect::{render_placeholder, write_ident, write_literal};
use crate::value::Value;

/// A SQL statement or fragment: a flat list of raw text, identifiers and bound values.
///
/// Placeholders are numbered only when the statement is built, so fragments can be
/// rendered independently and appended in any order; the numbering of a merged
/// sub-query always follows its final position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SQL {
    pub chunks: SmallVec<[SQLChunk; 8]>,
}

impl SQL {
    /// Creates an empty SQL fragment with const-friendly initialization.
    #[inline]
    pub const fn empty() -> Self {
        Self {
            chunks: SmallVec::new_const(),
        }
    }

    /// Creates SQL from raw text.
    #[inline]
    pub fn raw(text: impl Into<Cow<'static, str>>) -> Self {
        let mut sql = Self::empty();
        sql.push_raw(text);
        sql
    }

    /// Creates SQL holding one quoted identifier.
    #[inline]
    pub fn ident(name: impl Into<Cow<'static, str>>) -> Self {
        let mut sql = Self::empty();
        sql.push_ident(name);
        sql
    }

    /// Creates SQL holding one bound parameter.
    #[inline]
    pub fn param(value: impl Into<Value>) -> Self {
        let mut sql = Self::empty();
        sql.push_param(value.into());
        sql
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Appends raw text, merging with a preceding raw chunk.
    pub fn push_raw(&mut self, text: impl Into<Cow<'static, str>>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        if let Some(SQLChunk::Raw(prev)) = self.chunks.last_mut() {
            prev.to_mut().push_str(&text);
            return;
        }
        self.chunks.push(SQLChunk::Raw(text));
    }

    #[inline]
    pub fn push_ident(&mut self, name: impl Into<Cow<'static, str>>) {
        self.chunks.push(SQLChunk::ident(name));
    }

    #[inline]
    pub fn push_param(&mut self, value: Value) {
        self.chunks.push(SQLChunk::Param(value));
    }

    /// Appends another fragment in place.
    #[inline]
    pub fn append_mut(&mut self, other: SQL) {
        for chunk in other.chunks {
            match chunk {
                SQLChunk::Raw(text) => self.push_raw(text),
                other => self.chunks.push(other),
            }
        }
    }

    /// Appends another fragment.
    #[inline]
    pub fn append(mut self, other: SQL) -> Self {
        self.append_mut(other);
        self
    }

    /// Joins fragments with a raw separator.
    pub fn join<I>(parts: I, separator: &'static str) -> Self
    where
        I: IntoIterator<Item = SQL>,
    {
        let mut out = Self::empty();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                out.push_raw(separator);
            }
            out.append_mut(part);
        }
        out
    }

    /// Wraps the fragment in parentheses.
    pub fn parens(self) -> Self {
        SQL::raw("(").append(self).append(SQL::raw(")"))
    }

    /// Renders the statement text and collects the bound values in placeholder order.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut buf = String::with_capacity(self.chunks.len() * 8);
        let mut params = Vec::new();
        for chunk in &self.chunks {
            match chunk {
                SQLChunk::Raw(text) => buf.push_str(text),
                SQLChunk::Ident(name) => write_ident(&mut buf, name),
                SQLChunk::Param(value) => {
                    params.push(value.clone());
                    buf.push_str(&render_placeholder(params.len()));
                }
            }
        }
        (buf, params)
    }

    /// Statement text only.
    pub fn sql(&self) -> String {
        self.build().0
    }

    /// Bound values in placeholder order.
    pub fn params(&self) -> impl Iterator<Item = &Value> {
        self.chunks.iter().filter_map(|chunk| match chunk {
            SQLChunk::Param(value) => Some(value),
            _ => None,
        })
    }

    /// Renders with every parameter inlined as a literal. For diagnostics only.
    pub fn to_inline_string(&self) -> String {
        let mut buf = String::new();
        for chunk in &self.chunks {
            match chunk {
                SQLChunk::Raw(text) => buf.push_str(text),
                SQLChunk::Ident(name) => write_ident(&mut buf, name),
                SQLChunk::Param(value) => write_literal(&mut buf, value),
            }
        }
        buf
    }
}

impl fmt::Display for SQL {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_inline_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn appended_fragments_are_renumbered() {
        let inner = SQL::raw("SELECT id FROM users WHERE age > ")
            .append(SQL::param(Value::Integer(18)))
            .append(SQL::raw(" AND name = "))
            .append(SQL::param(Value::Text("x".into())));
        let outer = SQL::raw("SELECT * FROM posts WHERE flag = ")
            .append(SQL::param(Value::Bool(true)))
            .append(SQL::raw(" AND author_id IN "))
            .append(inner.parens());

        let (sql, params) = outer.build();
        assert_eq!(
            sql,
            "SELECT * FROM posts WHERE flag = $1 AND author_id IN \
             (SELECT id FROM users WHERE age > $2 AND name = $3)"
        );
        assert_eq!(
            params,
            vec![
                Value::Bool(true),
                Value::Integer(18),
                Value::Text("x".into())
            ]
        );
    }

    #[test]
    fn raw_chunks_merge() {
        let mut sql = SQL::raw("a");
        sql.push_raw(" b");
        sql.push_ident("t.c");
        sql.push_raw("");
        assert_eq!(sql.chunks.len(), 2);
        assert_eq!(sql.sql(), r#"a b"t"."c""#);
    }

    #[test]
    fn inline_rendering_quotes_literals() {
        let sql = SQL::raw("name = ").append(SQL::param(Value::Text("O'Brien".into())));
        assert_eq!(sql.to_string(), "name = 'O''Brien'");
    }
}
