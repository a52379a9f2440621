use std::borrow::Cow;

use crate::value::Value;

/// A SQL chunk represents a part of an SQL statement.
///
/// - `Raw` - Unquoted SQL text, emitted verbatim
/// - `Ident` - Identifier, quoted per dot-separated segment
/// - `Param` - Bound value, rendered as a numbered placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SQLChunk {
    /// Raw SQL text (unquoted)
    /// Renders as: text (as-is)
    Raw(Cow<'static, str>),

    /// Quoted identifier for table, column and alias names
    /// Renders as: "name" or "alias"."name"
    Ident(Cow<'static, str>),

    /// Bound parameter
    /// Renders as: $n, numbered at build time
    Param(Value),
}

impl SQLChunk {
    /// Creates a raw chunk from static text - const
    #[inline]
    pub const fn raw_static(text: &'static str) -> Self {
        Self::Raw(Cow::Borrowed(text))
    }

    /// Creates raw SQL text from a runtime string.
    #[inline]
    pub fn raw(text: impl Into<Cow<'static, str>>) -> Self {
        Self::Raw(text.into())
    }

    /// Creates a quoted identifier from a runtime string.
    #[inline]
    pub fn ident(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Ident(name.into())
    }

    /// Creates a parameter chunk.
    #[inline]
    pub fn param(value: Value) -> Self {
        Self::Param(value)
    }
}
