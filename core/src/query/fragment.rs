//! Query-string templates and their arguments.
//!
//! A template is plain SQL with placeholders:
//!
//! | placeholder       | expands to                                         |
//! |-------------------|----------------------------------------------------|
//! | `?`               | the next positional argument                       |
//! | `?0`, `?1`, ...   | the argument at that index                         |
//! | `\?`              | a literal `?`                                      |
//! | `?TableName`      | quoted table name of the query's model             |
//! | `?TableAlias`     | quoted alias of the query's model                  |
//! | `?TableColumns`   | every model column, alias-qualified                |
//! | `?Columns`        | every model column, unqualified                    |
//! | `?PKs`            | primary-key columns, alias-qualified               |
//! | `?field`          | the value of `field` on the record being written   |
//!
//! Values always become bound parameters; only [`Arg::Ident`] and [`Arg::Safe`] reach the
//! statement text.

use std::any::Any;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::Query;
use crate::error::{RelataError, Result};
use crate::schema::TableModel;
use crate::sql::SQL;
use crate::value::{Json, ToValue, Value};

/// One template argument.
#[derive(Debug, Clone)]
pub enum Arg {
    /// Bound parameter
    Value(Value),
    /// Identifier, quoted per dot-separated segment
    Ident(String),
    /// Trusted SQL text, inserted verbatim
    Safe(String),
    /// Comma-separated parameter list; `NULL` when empty
    In(Vec<Value>),
    /// Comma-separated parenthesized tuples of parameters
    InMulti(Vec<Vec<Value>>),
    /// A sub-query rendered in place
    Query(Box<Query>),
    /// A value that failed to convert; rendering reports the error
    Invalid(RelataError),
}

impl Arg {
    pub fn ident(name: impl Into<String>) -> Self {
        Arg::Ident(name.into())
    }

    pub fn safe(sql: impl Into<String>) -> Self {
        Arg::Safe(sql.into())
    }

    pub fn in_list<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToValue,
    {
        values
            .into_iter()
            .map(|v| v.try_to_value())
            .collect::<Result<_>>()
            .map_or_else(Arg::Invalid, Arg::In)
    }

    pub fn in_multi<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator,
        R::Item: ToValue,
    {
        rows.into_iter()
            .map(|row| row.into_iter().map(|v| v.try_to_value()).collect::<Result<Vec<_>>>())
            .collect::<Result<_>>()
            .map_or_else(Arg::Invalid, Arg::InMulti)
    }

    fn converted(value: Result<Value>) -> Self {
        value.map_or_else(Arg::Invalid, Arg::Value)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<Query> for Arg {
    fn from(query: Query) -> Self {
        Arg::Query(Box::new(query))
    }
}

impl<T: ToValue + ?Sized> From<&T> for Arg {
    fn from(value: &T) -> Self {
        Arg::converted(value.try_to_value())
    }
}

impl<T: ToValue> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        Arg::converted(value.try_to_value())
    }
}

impl<T: Serialize> From<Json<T>> for Arg {
    fn from(value: Json<T>) -> Self {
        Arg::converted(value.try_to_value())
    }
}

macro_rules! impl_arg_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Value(value.to_value())
                }
            }

            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    value.to_value()
                }
            }
        )*
    };
}

impl_arg_from!(
    i8,
    i16,
    i32,
    i64,
    isize,
    u8,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
    bool,
    String,
    Vec<u8>,
    NaiveDate,
    NaiveTime,
    NaiveDateTime,
    DateTime<Utc>,
    Uuid,
    serde_json::Value,
    Vec<bool>,
    Vec<i16>,
    Vec<i32>,
    Vec<i64>,
    Vec<f32>,
    Vec<f64>,
    Vec<String>,
    Vec<Uuid>,
);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

/// Conversion of a caller-supplied argument list.
pub trait IntoArgs {
    fn into_args(self) -> Vec<Arg>;
}

impl IntoArgs for () {
    fn into_args(self) -> Vec<Arg> {
        Vec::new()
    }
}

impl<T: Into<Arg>, const N: usize> IntoArgs for [T; N] {
    fn into_args(self) -> Vec<Arg> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Arg>> IntoArgs for Vec<T> {
    fn into_args(self) -> Vec<Arg> {
        self.into_iter().map(Into::into).collect()
    }
}

macro_rules! impl_into_args_tuple {
    ($($T:ident),+) => {
        impl<$($T: Into<Arg>),+> IntoArgs for ($($T,)+) {
            #[allow(non_snake_case)]
            fn into_args(self) -> Vec<Arg> {
                let ($($T,)+) = self;
                vec![$($T.into()),+]
            }
        }
    };
}

impl_into_args_tuple!(A);
impl_into_args_tuple!(A, B);
impl_into_args_tuple!(A, B, C);
impl_into_args_tuple!(A, B, C, D);
impl_into_args_tuple!(A, B, C, D, E);
impl_into_args_tuple!(A, B, C, D, E, F);
impl_into_args_tuple!(A, B, C, D, E, F, G);
impl_into_args_tuple!(A, B, C, D, E, F, G, H);

/// What named placeholders resolve against.
#[derive(Clone, Copy, Default)]
pub(crate) struct RenderCx<'a> {
    pub model: Option<&'a TableModel>,
    pub record: Option<&'a dyn Any>,
}

impl<'a> RenderCx<'a> {
    pub fn new(model: Option<&'a TableModel>) -> Self {
        Self {
            model,
            record: None,
        }
    }

    pub fn with_record(self, record: &'a dyn Any) -> Self {
        Self {
            record: Some(record),
            ..self
        }
    }

    fn model(&self, placeholder: &str) -> Result<&'a TableModel> {
        self.model.ok_or_else(|| {
            RelataError::Build(format!("?{placeholder} used in a query without a model"))
        })
    }
}

/// A template plus its arguments.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub(crate) expr: String,
    pub(crate) args: Vec<Arg>,
}

impl Fragment {
    pub fn new(expr: impl Into<String>, args: impl IntoArgs) -> Self {
        Self {
            expr: expr.into(),
            args: args.into_args(),
        }
    }

    /// A fragment that renders as one quoted identifier.
    pub(crate) fn ident(name: impl Into<String>) -> Self {
        Self {
            expr: "?".into(),
            args: vec![Arg::Ident(name.into())],
        }
    }

    pub(crate) fn is(&self, text: &str) -> bool {
        self.args.is_empty() && self.expr.trim().eq_ignore_ascii_case(text)
    }

    pub(crate) fn render(&self, cx: RenderCx<'_>, out: &mut SQL) -> Result<()> {
        let mut literal = String::new();
        let mut positional = 0;
        let mut chars = self.expr.char_indices().peekable();

        while let Some((_, ch)) = chars.next() {
            if ch == '\\' && matches!(chars.peek(), Some((_, '?'))) {
                chars.next();
                literal.push('?');
                continue;
            }
            if ch != '?' {
                literal.push(ch);
                continue;
            }

            let start = chars.peek().map(|(i, _)| *i).unwrap_or(self.expr.len());
            let mut end = start;
            let numeric = matches!(chars.peek(), Some((_, c)) if c.is_ascii_digit());
            let named = matches!(chars.peek(), Some((_, c)) if c.is_ascii_alphabetic() || *c == '_');
            if numeric || named {
                while let Some((i, c)) = chars.peek().copied() {
                    let keep = if numeric {
                        c.is_ascii_digit()
                    } else {
                        c.is_ascii_alphanumeric() || c == '_'
                    };
                    if !keep {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
            }

            out.push_raw(std::mem::take(&mut literal));
            let name = &self.expr[start..end];
            if name.is_empty() {
                let arg = self.args.get(positional).ok_or_else(|| {
                    RelataError::Build(format!(
                        "{:?} needs more than {} arguments",
                        self.expr,
                        self.args.len()
                    ))
                })?;
                positional += 1;
                render_arg(arg, out)?;
            } else if numeric {
                let index: usize = name
                    .parse()
                    .map_err(|_| RelataError::Build(format!("invalid placeholder ?{name}")))?;
                let arg = self.args.get(index).ok_or_else(|| {
                    RelataError::Build(format!(
                        "placeholder ?{index} out of range in {:?} ({} arguments)",
                        self.expr,
                        self.args.len()
                    ))
                })?;
                render_arg(arg, out)?;
            } else {
                render_named(name, cx, out)?;
            }
        }
        out.push_raw(literal);
        Ok(())
    }
}

impl From<&str> for Fragment {
    fn from(expr: &str) -> Self {
        Fragment::new(expr, ())
    }
}

impl From<String> for Fragment {
    fn from(expr: String) -> Self {
        Fragment::new(expr, ())
    }
}

fn render_arg(arg: &Arg, out: &mut SQL) -> Result<()> {
    match arg {
        Arg::Value(value) => out.push_param(value.clone()),
        Arg::Ident(name) => out.push_ident(name.clone()),
        Arg::Safe(sql) => out.push_raw(sql.clone()),
        Arg::In(values) => push_list(values, out),
        Arg::InMulti(rows) => {
            if rows.is_empty() {
                out.push_raw("NULL");
            }
            for (i, row) in rows.iter().enumerate() {
                if i > 0 {
                    out.push_raw(", ");
                }
                out.push_raw("(");
                push_list(row, out);
                out.push_raw(")");
            }
        }
        Arg::Query(query) => out.append_mut(query.select_sql()?),
        Arg::Invalid(err) => return Err(err.clone()),
    }
    Ok(())
}

fn push_list(values: &[Value], out: &mut SQL) {
    if values.is_empty() {
        out.push_raw("NULL");
        return;
    }
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push_raw(", ");
        }
        out.push_param(value.clone());
    }
}

fn render_named(name: &str, cx: RenderCx<'_>, out: &mut SQL) -> Result<()> {
    match name {
        "TableName" => out.push_ident(cx.model(name)?.name.clone()),
        "TableAlias" => out.push_ident(cx.model(name)?.alias.clone()),
        "TableColumns" => {
            let model = cx.model(name)?;
            push_columns(model, model.columns.iter().map(|c| c.name.as_str()), true, out);
        }
        "Columns" => {
            let model = cx.model(name)?;
            push_columns(model, model.columns.iter().map(|c| c.name.as_str()), false, out);
        }
        "PKs" => {
            let model = cx.model(name)?;
            push_columns(model, model.primary_keys().map(|c| c.name.as_str()), true, out);
        }
        field => {
            let column = cx
                .model
                .zip(cx.record)
                .and_then(|(model, record)| {
                    model
                        .column_by_field(field)
                        .map(|column| (column.get)(record))
                })
                .ok_or_else(|| RelataError::Build(format!("unknown placeholder ?{field}")))?;
            out.push_param(column?);
        }
    }
    Ok(())
}

pub(crate) fn push_columns<'a>(
    model: &TableModel,
    columns: impl Iterator<Item = &'a str>,
    qualified: bool,
    out: &mut SQL,
) {
    for (i, column) in columns.enumerate() {
        if i > 0 {
            out.push_raw(", ");
        }
        if qualified {
            out.push_ident(format!("{}.{column}", model.alias));
        } else {
            out.push_ident(column.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render(fragment: Fragment) -> Result<(String, Vec<Value>)> {
        let mut out = SQL::empty();
        fragment.render(RenderCx::default(), &mut out)?;
        Ok(out.build())
    }

    #[test]
    fn positional_indexed_and_escaped() {
        let (sql, params) = render(Fragment::new(
            r"a = ? AND b = ?1 AND c = ? AND d \? e",
            (1, "two"),
        ))
        .unwrap();
        assert_eq!(sql, "a = $1 AND b = $2 AND c = $3 AND d ? e");
        assert_eq!(
            params,
            vec![
                Value::Integer(1),
                Value::Text("two".into()),
                Value::Text("two".into())
            ]
        );
    }

    #[test]
    fn idents_safe_and_lists() {
        let (sql, params) = render(Fragment::new(
            "? = ANY(?) OR ? IN (?) OR ? IN (?)",
            vec![
                Arg::ident("u.id"),
                Arg::safe("ARRAY[1, 2]"),
                Arg::ident("x"),
                Arg::in_list([3, 4]),
                Arg::ident("y"),
                Arg::In(vec![]),
            ],
        ))
        .unwrap();
        assert_eq!(
            sql,
            r#""u"."id" = ANY(ARRAY[1, 2]) OR "x" IN ($1, $2) OR "y" IN (NULL)"#
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn missing_arguments_fail() {
        assert!(render(Fragment::new("a = ? AND b = ?", [1])).is_err());
        assert!(render(Fragment::new("a = ?3", [1])).is_err());
        assert!(render(Fragment::new("?TableName", ())).is_err());
        assert!(render(Fragment::new("?nope", ())).is_err());
    }

    #[test]
    fn tuples_render_as_rows() {
        let (sql, params) = render(Fragment::new(
            "(a, b) IN (?)",
            [Arg::in_multi([[1, 2], [3, 4]])],
        ))
        .unwrap();
        assert_eq!(sql, "(a, b) IN (($1, $2), ($3, $4))");
        assert_eq!(params.len(), 4);
    }
}
