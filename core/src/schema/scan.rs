//! Row sinks that decode into model records.
//!
//! Every sink stages the row in a scratch record and only commits it in `end_row`, so a row
//! that fails to decode never reaches the destination.

use crate::error::{RelataError, Result};
use crate::row::{ColumnInfo, ColumnScanner, RowSink};

use super::{Model, TableModel};

struct Staged<'a, M> {
    table: &'a TableModel,
    record: Option<M>,
}

impl<M: Model> Staged<'_, M> {
    fn stage(&mut self, record: M) {
        self.record = Some(record);
    }

    fn take(&mut self) -> Result<M> {
        self.record
            .take()
            .ok_or_else(|| RelataError::Build("end_row without begin_row".into()))
    }
}

impl<M: Model> ColumnScanner for Staged<'_, M> {
    fn scan_column(&mut self, col: &ColumnInfo, raw: Option<&[u8]>) -> Result<()> {
        match self.record.as_mut() {
            Some(record) => self.table.scan_column(record, col, raw),
            None => Err(RelataError::Build("scan_column without begin_row".into())),
        }
    }
}

/// Appends one record per row.
pub(crate) struct Records<'a, M> {
    staged: Staged<'a, M>,
    out: &'a mut Vec<M>,
}

impl<'a, M: Model> Records<'a, M> {
    pub fn new(table: &'a TableModel, out: &'a mut Vec<M>) -> Self {
        Self {
            staged: Staged {
                table,
                record: None,
            },
            out,
        }
    }
}

impl<M: Model> RowSink for Records<'_, M> {
    fn begin_row(&mut self) -> Result<()> {
        self.staged.stage(M::default());
        Ok(())
    }

    fn scan_column(&mut self, col: &ColumnInfo, raw: Option<&[u8]>) -> Result<()> {
        self.staged.scan_column(col, raw)
    }

    fn end_row(&mut self) -> Result<()> {
        let record = self.staged.take()?;
        self.out.push(record);
        Ok(())
    }

    fn discard_row(&mut self) {
        self.staged.record = None;
    }
}

/// Decodes exactly one row into an existing record, keeping fields that were not selected.
pub(crate) struct OneRecord<'a, M> {
    staged: Staged<'a, M>,
    out: &'a mut M,
    rows: usize,
}

impl<'a, M: Model> OneRecord<'a, M> {
    pub fn new(table: &'a TableModel, out: &'a mut M) -> Self {
        Self {
            staged: Staged {
                table,
                record: None,
            },
            out,
            rows: 0,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}

impl<M: Model> RowSink for OneRecord<'_, M> {
    fn begin_row(&mut self) -> Result<()> {
        if self.rows > 0 {
            return Err(RelataError::MultipleRows);
        }
        self.staged.stage(self.out.clone());
        Ok(())
    }

    fn scan_column(&mut self, col: &ColumnInfo, raw: Option<&[u8]>) -> Result<()> {
        self.staged.scan_column(col, raw)
    }

    fn end_row(&mut self) -> Result<()> {
        *self.out = self.staged.take()?;
        self.rows += 1;
        Ok(())
    }

    fn discard_row(&mut self) {
        self.staged.record = None;
    }
}

/// Decodes RETURNING rows back into the written records, in order.
pub(crate) struct ReturningRecords<'a, M> {
    staged: Staged<'a, M>,
    out: &'a mut [M],
    next: usize,
}

impl<'a, M: Model> ReturningRecords<'a, M> {
    pub fn new(table: &'a TableModel, out: &'a mut [M]) -> Self {
        Self {
            staged: Staged {
                table,
                record: None,
            },
            out,
            next: 0,
        }
    }
}

impl<M: Model> RowSink for ReturningRecords<'_, M> {
    fn begin_row(&mut self) -> Result<()> {
        let current = self.out.get(self.next).cloned().ok_or_else(|| {
            RelataError::Build(format!(
                "RETURNING produced more rows than the {} records written",
                self.out.len()
            ))
        })?;
        self.staged.stage(current);
        Ok(())
    }

    fn scan_column(&mut self, col: &ColumnInfo, raw: Option<&[u8]>) -> Result<()> {
        self.staged.scan_column(col, raw)
    }

    fn end_row(&mut self) -> Result<()> {
        let record = self.staged.take()?;
        if let Some(slot) = self.out.get_mut(self.next) {
            *slot = record;
        }
        self.next += 1;
        Ok(())
    }

    fn discard_row(&mut self) {
        self.staged.record = None;
    }
}

/// Hands each decoded record to a callback instead of collecting it.
pub(crate) struct ForEachRecord<'a, M, F> {
    staged: Staged<'a, M>,
    f: F,
}

impl<'a, M: Model, F> ForEachRecord<'a, M, F>
where
    F: FnMut(M) -> Result<()> + Send,
{
    pub fn new(table: &'a TableModel, f: F) -> Self {
        Self {
            staged: Staged {
                table,
                record: None,
            },
            f,
        }
    }
}

impl<M: Model, F> RowSink for ForEachRecord<'_, M, F>
where
    F: FnMut(M) -> Result<()> + Send,
{
    fn begin_row(&mut self) -> Result<()> {
        self.staged.stage(M::default());
        Ok(())
    }

    fn scan_column(&mut self, col: &ColumnInfo, raw: Option<&[u8]>) -> Result<()> {
        self.staged.scan_column(col, raw)
    }

    fn end_row(&mut self) -> Result<()> {
        let record = self.staged.take()?;
        (self.f)(record)
    }

    fn discard_row(&mut self) {
        self.staged.record = None;
    }
}
