use std::future::Future;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};

use super::{Context, Db, QueryResult};
use crate::error::{RelataError, Result};
use crate::row::RowSink;
use crate::sql::SQL;

impl Db {
    /// Runs `fut` under `ctx`; when the context interrupts it, the backend is asked to cancel
    /// the statement in flight.
    async fn guarded<T, F>(&self, ctx: &Context, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if ctx.is_cancelled() {
            return Err(RelataError::Cancelled);
        }
        match ctx.run(fut).await {
            Err(RelataError::Cancelled) => {
                if let Err(_err) = self.backend.cancel().await {
                    crate::relata_trace_cancel_failed!(_err);
                }
                Err(RelataError::Cancelled)
            }
            other => other,
        }
    }

    pub(crate) async fn run_exec(&self, ctx: &Context, sql: &SQL) -> Result<QueryResult> {
        let (text, params) = sql.build();
        crate::relata_trace_exec!(&text, params.len());
        let affected = self
            .guarded(ctx, async {
                self.backend
                    .execute(&text, &params)
                    .await
                    .map_err(|e| RelataError::backend(&text, params.len(), e))
            })
            .await?;
        Ok(QueryResult {
            rows_affected: affected,
            rows_returned: 0,
        })
    }

    /// Streams the rows of `sql` into `sink`, one column at a time.
    ///
    /// A row that fails to decode is discarded and fails the statement with
    /// [`RelataError::Decode`]; rows completed before it stay in the sink.
    pub(crate) async fn run_query<S>(
        &self,
        ctx: &Context,
        sql: &SQL,
        sink: &mut S,
    ) -> Result<QueryResult>
    where
        S: RowSink + ?Sized,
    {
        let (text, params) = sql.build();
        crate::relata_trace_query!(&text, params.len());
        self.guarded(ctx, async {
            let backend_err = |e| RelataError::backend(&text, params.len(), e);
            let mut rows = self
                .backend
                .query(&text, &params)
                .await
                .map_err(backend_err)?;

            let mut returned = 0usize;
            while let Some(row) = rows.next().await {
                let row = row.map_err(backend_err)?;
                sink.begin_row()?;
                let scanned = row
                    .iter()
                    .try_for_each(|(col, raw)| sink.scan_column(col, raw));
                if let Err(source) = scanned {
                    sink.discard_row();
                    return Err(RelataError::Decode {
                        row: returned,
                        source: Box::new(source),
                    });
                }
                sink.end_row()?;
                returned += 1;
            }
            Ok(QueryResult {
                rows_affected: returned as u64,
                rows_returned: returned as u64,
            })
        })
        .await
    }

    pub(crate) async fn run_copy_in<R>(
        &self,
        ctx: &Context,
        sql: &SQL,
        reader: &mut R,
    ) -> Result<QueryResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        // COPY takes no bind parameters.
        let text = sql.to_inline_string();
        crate::relata_trace_exec!(&text, 0);
        let rows = self
            .guarded(ctx, async {
                self.backend
                    .copy_in(&text, reader)
                    .await
                    .map_err(|e| RelataError::backend(&text, 0, e))
            })
            .await?;
        Ok(QueryResult {
            rows_affected: rows,
            rows_returned: 0,
        })
    }

    pub(crate) async fn run_copy_out<W>(
        &self,
        ctx: &Context,
        sql: &SQL,
        writer: &mut W,
    ) -> Result<QueryResult>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let text = sql.to_inline_string();
        crate::relata_trace_exec!(&text, 0);
        let rows = self
            .guarded(ctx, async {
                self.backend
                    .copy_out(&text, writer)
                    .await
                    .map_err(|e| RelataError::backend(&text, 0, e))
            })
            .await?;
        Ok(QueryResult {
            rows_affected: rows,
            rows_returned: 0,
        })
    }
}
