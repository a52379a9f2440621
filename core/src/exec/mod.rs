//! Statement execution: the backend seam, the [`Db`] handle and result bookkeeping.

mod context;
mod copy;
mod relations;
mod run;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::io::{AsyncRead, AsyncWrite};

pub use context::{CancelHandle, Context};
pub use copy::{CopyFormat, CopyRowCounter};
pub(crate) use relations::load_relations;

use crate::error::{BackendError, RelataError, Result};
use crate::query::{Fragment, IntoArgs, Query};
use crate::query::fragment::RenderCx;
use crate::row::RowSink;
use crate::schema::Model;
use crate::sql::SQL;
use crate::value::Value;

/// Rows of one statement, delivered as they arrive.
pub type RowStream = BoxStream<'static, std::result::Result<crate::row::Row, BackendError>>;

/// A connection that can run statements.
///
/// Parameters arrive in placeholder order (`$1` first). Implementations report failures as
/// boxed errors; the caller wraps them with the statement they belong to.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Runs a statement and returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> std::result::Result<u64, BackendError>;

    /// Runs a row-returning statement.
    async fn query(
        &self,
        sql: &str,
        params: &[Value],
    ) -> std::result::Result<RowStream, BackendError>;

    /// Runs `COPY ... FROM STDIN`, feeding it from `reader`.
    async fn copy_in(
        &self,
        sql: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> std::result::Result<u64, BackendError>;

    /// Runs `COPY ... TO STDOUT`, draining it into `writer`, and returns the number of data
    /// rows. [`CopyRowCounter`] counts them from the bytes when the driver does not report it.
    async fn copy_out(
        &self,
        sql: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> std::result::Result<u64, BackendError>;

    /// Asks the server to abandon the statement in flight. Best effort.
    async fn cancel(&self) -> std::result::Result<(), BackendError> {
        Ok(())
    }
}

/// Outcome of one statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub(crate) rows_affected: u64,
    pub(crate) rows_returned: u64,
}

impl QueryResult {
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn rows_returned(&self) -> u64 {
        self.rows_returned
    }
}

/// A cloneable handle to a backend plus the default [`Context`] of its queries.
#[derive(Clone)]
pub struct Db {
    backend: Arc<dyn Backend>,
    ctx: Context,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db").field("ctx", &self.ctx).finish_non_exhaustive()
    }
}

fn render(expr: impl Into<String>, args: impl IntoArgs) -> Result<SQL> {
    let mut sql = SQL::empty();
    Fragment::new(expr, args).render(RenderCx::default(), &mut sql)?;
    Ok(sql)
}

fn exactly_one(result: QueryResult, count: u64) -> Result<QueryResult> {
    match count {
        0 => Err(RelataError::NotFound),
        1 => Ok(result),
        _ => Err(RelataError::MultipleRows),
    }
}

impl Db {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    pub fn from_arc(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            ctx: Context::background(),
        }
    }

    /// A handle whose queries run under `ctx` unless they set their own.
    pub fn with_context(&self, ctx: Context) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            ctx,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// An empty query bound to this handle.
    pub fn new_query(&self) -> Query {
        Query::new().db(self.clone())
    }

    /// A query targeting the table of `M`.
    pub fn model<M: Model>(&self) -> Query {
        self.new_query().model::<M>()
    }

    /// A query over a table without a model.
    pub fn table(&self, name: impl Into<String>) -> Query {
        self.new_query().table(name)
    }

    /// Runs a raw statement, ignoring any returned rows.
    pub async fn exec(&self, expr: impl Into<String>, args: impl IntoArgs) -> Result<QueryResult> {
        let sql = render(expr, args)?;
        self.run_exec(&self.ctx, &sql).await
    }

    /// Like [`Db::exec`], failing unless exactly one row was affected.
    pub async fn exec_one(
        &self,
        expr: impl Into<String>,
        args: impl IntoArgs,
    ) -> Result<QueryResult> {
        let result = self.exec(expr, args).await?;
        exactly_one(result, result.rows_affected)
    }

    /// Runs a raw query, feeding every row into `sink`.
    pub async fn query<S>(
        &self,
        sink: &mut S,
        expr: impl Into<String>,
        args: impl IntoArgs,
    ) -> Result<QueryResult>
    where
        S: RowSink + ?Sized,
    {
        let sql = render(expr, args)?;
        self.run_query(&self.ctx, &sql, sink).await
    }

    /// Like [`Db::query`], failing unless exactly one row was returned.
    pub async fn query_one<S>(
        &self,
        sink: &mut S,
        expr: impl Into<String>,
        args: impl IntoArgs,
    ) -> Result<QueryResult>
    where
        S: RowSink + ?Sized,
    {
        let result = self.query(sink, expr, args).await?;
        exactly_one(result, result.rows_returned)
    }

    /// Streams `reader` into a `COPY ... FROM STDIN` statement.
    pub async fn copy_from<R>(
        &self,
        reader: &mut R,
        expr: impl Into<String>,
        args: impl IntoArgs,
    ) -> Result<QueryResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        let sql = render(expr, args)?;
        self.run_copy_in(&self.ctx, &sql, reader).await
    }

    /// Streams the output of a `COPY ... TO STDOUT` statement into `writer`.
    pub async fn copy_to<W>(
        &self,
        writer: &mut W,
        expr: impl Into<String>,
        args: impl IntoArgs,
    ) -> Result<QueryResult>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let sql = render(expr, args)?;
        self.run_copy_out(&self.ctx, &sql, writer).await
    }
}
