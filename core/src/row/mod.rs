//! Raw rows as delivered by a backend, and the decoding seam that turns their columns
//! into values.
//!
//! Rows are consumed column by column: the orchestrator calls
//! [`RowSink::begin_row`], then [`RowSink::scan_column`] once per column in order, then
//! [`RowSink::end_row`]. A sink never needs the whole row buffered at once.

use std::sync::Arc;

use bytes::Bytes;
use postgres_types::FromSql;
pub use postgres_types::Type;

use crate::error::{RelataError, Result};
use crate::value::{FromValue, Value, text};

/// Wire format of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Text,
    Binary,
}

/// Name, declared type and format of one result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub ty: Type,
    pub format: Format,
    pub nullable: bool,
}

impl ColumnInfo {
    /// A nullable text-format column.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            format: Format::Text,
            nullable: true,
        }
    }

    pub fn binary(mut self) -> Self {
        self.format = Format::Binary;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// One row: shared column descriptions plus the raw bytes of each column (`None` is NULL).
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[ColumnInfo]>,
    values: Vec<Option<Bytes>>,
}

impl Row {
    pub fn new(columns: Arc<[ColumnInfo]>, values: Vec<Option<Bytes>>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn raw(&self, idx: usize) -> Option<&[u8]> {
        self.values.get(idx).and_then(|v| v.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnInfo, Option<&[u8]>)> {
        self.columns
            .iter()
            .zip(self.values.iter().map(|v| v.as_deref()))
    }

    /// Decodes column `idx` into `T`.
    pub fn get<T: FromValue>(&self, idx: usize) -> Result<T> {
        let col = self
            .columns
            .get(idx)
            .ok_or_else(|| RelataError::Build(format!("row has no column {idx}")))?;
        decode(col, self.raw(idx))
    }
}

/// Decodes raw column bytes into a [`Value`] according to the column's type and format.
pub fn decode_value(col: &ColumnInfo, raw: Option<&[u8]>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };
    match col.format {
        Format::Text => {
            let text = std::str::from_utf8(raw).map_err(|e| RelataError::Conversion {
                column: col.name.clone(),
                message: format!("column is not valid utf-8: {e}"),
            })?;
            text::parse(&col.ty, text).map_err(|e| e.with_column(&col.name))
        }
        Format::Binary => Value::from_sql(&col.ty, raw).map_err(|e| RelataError::Conversion {
            column: col.name.clone(),
            message: e.to_string(),
        }),
    }
}

/// Decodes raw column bytes straight into a destination type.
pub fn decode<T: FromValue>(col: &ColumnInfo, raw: Option<&[u8]>) -> Result<T> {
    let value = decode_value(col, raw)?;
    T::from_value(value).map_err(|e| e.with_column(&col.name))
}

/// Receives the columns of a row one at a time.
pub trait ColumnScanner {
    fn scan_column(&mut self, col: &ColumnInfo, raw: Option<&[u8]>) -> Result<()>;
}

/// A destination for a stream of rows.
///
/// If any `scan_column` of a row fails, `discard_row` is called instead of `end_row` and the
/// staged row must leave no trace in the destination.
pub trait RowSink: Send {
    fn begin_row(&mut self) -> Result<()>;

    fn scan_column(&mut self, col: &ColumnInfo, raw: Option<&[u8]>) -> Result<()>;

    fn end_row(&mut self) -> Result<()>;

    fn discard_row(&mut self) {}
}

/// Untyped rows.
impl RowSink for Vec<Vec<Value>> {
    fn begin_row(&mut self) -> Result<()> {
        self.push(Vec::new());
        Ok(())
    }

    fn scan_column(&mut self, col: &ColumnInfo, raw: Option<&[u8]>) -> Result<()> {
        let value = decode_value(col, raw)?;
        if let Some(row) = self.last_mut() {
            row.push(value);
        }
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        Ok(())
    }

    fn discard_row(&mut self) {
        self.pop();
    }
}

/// Collects the first column of every row into `T`.
pub struct Scalars<'a, T> {
    out: &'a mut Vec<T>,
    staged: Option<T>,
    column: usize,
}

impl<'a, T> Scalars<'a, T> {
    pub fn new(out: &'a mut Vec<T>) -> Self {
        Self {
            out,
            staged: None,
            column: 0,
        }
    }
}

impl<T: FromValue + Send> RowSink for Scalars<'_, T> {
    fn begin_row(&mut self) -> Result<()> {
        self.staged = None;
        self.column = 0;
        Ok(())
    }

    fn scan_column(&mut self, col: &ColumnInfo, raw: Option<&[u8]>) -> Result<()> {
        if self.column == 0 {
            self.staged = Some(decode(col, raw)?);
        }
        self.column += 1;
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        match self.staged.take() {
            Some(value) => {
                self.out.push(value);
                Ok(())
            }
            None => Err(RelataError::Build("row has no columns".into())),
        }
    }

    fn discard_row(&mut self) {
        self.staged = None;
    }
}

/// Ignores every row; used when only the row count matters.
#[derive(Debug, Default)]
pub struct Discard;

impl RowSink for Discard {
    fn begin_row(&mut self) -> Result<()> {
        Ok(())
    }

    fn scan_column(&mut self, _col: &ColumnInfo, _raw: Option<&[u8]>) -> Result<()> {
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Adapts a per-row callback over untyped values into a sink.
pub struct RowFn<F> {
    staged: Vec<Value>,
    f: F,
}

impl<F> RowFn<F>
where
    F: FnMut(Vec<Value>) -> Result<()> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            staged: Vec::new(),
            f,
        }
    }
}

impl<F> RowSink for RowFn<F>
where
    F: FnMut(Vec<Value>) -> Result<()> + Send,
{
    fn begin_row(&mut self) -> Result<()> {
        self.staged.clear();
        Ok(())
    }

    fn scan_column(&mut self, col: &ColumnInfo, raw: Option<&[u8]>) -> Result<()> {
        self.staged.push(decode_value(col, raw)?);
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        (self.f)(std::mem::take(&mut self.staged))
    }

    fn discard_row(&mut self) {
        self.staged.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text_col(name: &str, ty: Type) -> ColumnInfo {
        ColumnInfo::new(name, ty)
    }

    #[test]
    fn text_and_binary_decode_agree() {
        let text = decode::<i64>(&text_col("n", Type::INT8), Some(b"42".as_slice())).unwrap();
        let binary = decode::<i64>(
            &text_col("n", Type::INT8).binary(),
            Some(42i64.to_be_bytes().as_slice()),
        )
        .unwrap();
        assert_eq!(text, binary);
    }

    #[test]
    fn errors_carry_the_column_name() {
        let err = decode::<i16>(&text_col("age", Type::INT8), Some(b"70000".as_slice())).unwrap_err();
        assert!(matches!(err, RelataError::Conversion { ref column, .. } if column == "age"));

        let err = decode::<String>(&text_col("name", Type::TEXT), None).unwrap_err();
        assert!(matches!(err, RelataError::Nullability { ref column } if column == "name"));

        let err = decode::<i32>(&text_col("n", Type::INT4), Some(b"abc".as_slice())).unwrap_err();
        assert!(matches!(err, RelataError::Conversion { ref column, .. } if column == "n"));
    }

    #[test]
    fn values_sink_discards_failed_rows() {
        let mut rows: Vec<Vec<Value>> = Vec::new();
        let col = text_col("n", Type::INT4);

        rows.begin_row().unwrap();
        rows.scan_column(&col, Some(b"1".as_slice())).unwrap();
        rows.end_row().unwrap();

        rows.begin_row().unwrap();
        assert!(rows.scan_column(&col, Some(b"x".as_slice())).is_err());
        rows.discard_row();

        assert_eq!(rows, vec![vec![Value::Integer(1)]]);
    }

    #[test]
    fn scalars_take_the_first_column() {
        let mut out: Vec<i64> = Vec::new();
        let mut sink = Scalars::new(&mut out);
        sink.begin_row().unwrap();
        sink.scan_column(&text_col("count", Type::INT8), Some(b"10".as_slice())).unwrap();
        sink.scan_column(&text_col("other", Type::TEXT), Some(b"x".as_slice())).unwrap();
        sink.end_row().unwrap();
        assert_eq!(out, vec![10]);
    }
}
