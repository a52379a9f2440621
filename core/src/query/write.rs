//! Terminal operations that write rows.
//!
//! When a write renders RETURNING (requested explicitly, or for columns inserted as
//! `DEFAULT`), the returned rows are decoded back into the written records in order.

use std::slice;

use tokio::io::{AsyncRead, AsyncWrite};

use super::render::{Rendered, UpdateMode, as_any};
use super::{IntoArgs, Query};
use crate::error::{RelataError, Result};
use crate::exec::QueryResult;
use super::fragment::{Fragment, RenderCx};
use crate::row::Discard;
use crate::schema::{Model, ReturningRecords};
use crate::sql::SQL;

const SELECT_OR_INSERT_ATTEMPTS: usize = 5;

impl Query {
    pub(crate) async fn run_statement(&self, sql: &SQL) -> Result<QueryResult> {
        let (db, ctx) = self.runtime()?;
        db.run_exec(&ctx, sql).await
    }

    async fn run_rendered(&self, rendered: Rendered) -> Result<QueryResult> {
        if !rendered.returning {
            return self.run_statement(&rendered.sql).await;
        }
        let (db, ctx) = self.runtime()?;
        db.run_query(&ctx, &rendered.sql, &mut Discard).await
    }

    async fn run_rendered_into<M: Model>(
        &self,
        rendered: Rendered,
        records: &mut [M],
    ) -> Result<QueryResult> {
        if !rendered.returning {
            return self.run_statement(&rendered.sql).await;
        }
        let model = self.typed_model::<M>()?.clone();
        let (db, ctx) = self.runtime()?;
        db.run_query(
            &ctx,
            &rendered.sql,
            &mut ReturningRecords::new(&model, records),
        )
        .await
    }

    /// Inserts one record; generated columns come back through RETURNING.
    pub async fn insert<M: Model>(self, record: &mut M) -> Result<QueryResult> {
        self.insert_many(slice::from_mut(record)).await
    }

    /// Inserts all records with one multi-row INSERT.
    pub async fn insert_many<M: Model>(self, records: &mut [M]) -> Result<QueryResult> {
        self.typed_model::<M>()?;
        let rendered = self.render_insert(&as_any(records))?;
        self.run_rendered_into(rendered, records).await
    }

    /// Inserts one row built from `value` overrides only.
    pub async fn insert_values(self) -> Result<QueryResult> {
        let rendered = self.render_insert(&[])?;
        self.run_rendered(rendered).await
    }

    /// Selects the record matching the query's conditions into `record`, inserting `record`
    /// when nothing matches. Returns whether a row was inserted.
    ///
    /// The INSERT uses `ON CONFLICT DO NOTHING` unless another conflict clause was set, so a
    /// concurrent insert of the same row is picked up by the next select.
    pub async fn select_or_insert<M: Model>(self, record: &mut M) -> Result<bool> {
        let mut last_err = RelataError::NotFound;
        for _ in 0..SELECT_OR_INSERT_ATTEMPTS {
            match self.clone().select_one(record).await {
                Ok(()) => return Ok(false),
                Err(RelataError::NotFound) => {}
                Err(err) => return Err(err),
            }

            let mut insert = self.clone();
            if insert.on_conflict.is_none() {
                insert = insert.on_conflict("DO NOTHING", ());
            }
            match insert.insert(record).await {
                Ok(result) if result.rows_affected() > 0 => return Ok(true),
                Ok(_) => {}
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }

    /// Updates `record`. Without conditions the statement targets the record's primary key.
    pub async fn update<M: Model>(self, record: &mut M) -> Result<QueryResult> {
        self.typed_model::<M>()?;
        let rendered = self.render_update(&as_any(slice::from_ref(&*record)), UpdateMode::All)?;
        self.run_rendered_into(rendered, slice::from_mut(record))
            .await
    }

    /// Like [`Query::update`], skipping columns whose value is zero.
    pub async fn update_not_zero<M: Model>(self, record: &mut M) -> Result<QueryResult> {
        self.typed_model::<M>()?;
        let rendered =
            self.render_update(&as_any(slice::from_ref(&*record)), UpdateMode::NotZero)?;
        self.run_rendered_into(rendered, slice::from_mut(record))
            .await
    }

    /// Runs an UPDATE built from `set` fragments.
    pub async fn update_values(self) -> Result<QueryResult> {
        let rendered = self.render_update(&[], UpdateMode::All)?;
        self.run_rendered(rendered).await
    }

    /// Updates all records with one statement joined against a VALUES list.
    pub async fn update_many<M: Model>(self, records: &mut [M]) -> Result<QueryResult> {
        self.typed_model::<M>()?;
        let rendered = self.render_update_many(&as_any(records))?;
        self.run_rendered_into(rendered, records).await
    }

    /// Deletes the matching rows; soft-delete models are marked deleted instead.
    pub async fn delete(self) -> Result<QueryResult> {
        let rendered = self.render_delete(&[], false)?;
        self.run_rendered(rendered).await
    }

    /// Deletes `records` by primary key; soft-delete models are marked deleted instead.
    pub async fn delete_records<M: Model>(self, records: &mut [M]) -> Result<QueryResult> {
        self.typed_model::<M>()?;
        let rendered = self.render_delete(&as_any(records), false)?;
        self.run_rendered_into(rendered, records).await
    }

    /// Deletes the matching rows even on soft-delete models.
    pub async fn force_delete(self) -> Result<QueryResult> {
        let rendered = self.render_delete(&[], true)?;
        self.run_rendered(rendered).await
    }

    pub async fn force_delete_records<M: Model>(self, records: &mut [M]) -> Result<QueryResult> {
        self.typed_model::<M>()?;
        let rendered = self.render_delete(&as_any(records), true)?;
        self.run_rendered_into(rendered, records).await
    }

    fn render_template(&self, expr: impl Into<String>, args: impl IntoArgs) -> Result<SQL> {
        self.check()?;
        let mut sql = SQL::empty();
        Fragment::new(expr, args).render(RenderCx::new(self.model.as_deref()), &mut sql)?;
        Ok(sql)
    }

    /// `COPY` from `reader`; the template may use the model placeholders, e.g.
    /// `"COPY ?TableName FROM STDIN WITH CSV"`.
    pub async fn copy_from<R>(
        self,
        reader: &mut R,
        expr: impl Into<String>,
        args: impl IntoArgs,
    ) -> Result<QueryResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        let sql = self.render_template(expr, args)?;
        let (db, ctx) = self.runtime()?;
        db.run_copy_in(&ctx, &sql, reader).await
    }

    /// `COPY` into `writer`, e.g. `"COPY ?TableName TO STDOUT WITH CSV"`.
    pub async fn copy_to<W>(
        self,
        writer: &mut W,
        expr: impl Into<String>,
        args: impl IntoArgs,
    ) -> Result<QueryResult>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let sql = self.render_template(expr, args)?;
        let (db, ctx) = self.runtime()?;
        db.run_copy_out(&ctx, &sql, writer).await
    }
}
