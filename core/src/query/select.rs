//! Terminal operations that read rows.

use std::any::Any;
use std::sync::LazyLock;

use regex::Regex;

use super::{Arg, Query};
use crate::error::{RelataError, Result};
use crate::exec::{QueryResult, load_relations};
use crate::row::{Discard, RowSink, Scalars};
use crate::schema::{ForEachRecord, Model, OneRecord, Records, TableModel};
use crate::value::Value;

static PLANNER_ROWS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"rows=(\d+)").ok());

/// Reads the planner row estimate from the first line of `EXPLAIN` output.
fn planner_rows(plan: &[String]) -> Option<u64> {
    let captures = PLANNER_ROWS.as_ref()?.captures(plan.first()?)?;
    captures.get(1)?.as_str().parse().ok()
}

impl Query {
    /// Turns `where_pk` into explicit conditions on the key values of `record`.
    fn pk_conditions(mut self, model: &TableModel, record: &dyn Any) -> Result<Self> {
        if !self.where_pk {
            return Ok(self);
        }
        for idx in model.require_pk()? {
            let column = &model.columns[*idx];
            self = self.where_(
                "? = ?",
                [
                    Arg::ident(format!("{}.{}", model.alias, column.name)),
                    Arg::Value((column.get)(record)?),
                ],
            );
        }
        self.where_pk = false;
        Ok(self)
    }

    /// Selects every matching row into `dest`, replacing its contents, then loads the
    /// requested relations.
    pub async fn select<M: Model>(self, dest: &mut Vec<M>) -> Result<QueryResult> {
        let model = self.typed_model::<M>()?.clone();
        let (db, ctx) = self.runtime()?;
        let sql = self.select_sql()?;
        dest.clear();
        let result = db
            .run_query(&ctx, &sql, &mut Records::new(&model, dest))
            .await?;
        if !self.relations.is_empty() && !dest.is_empty() {
            let mut records: Vec<&mut (dyn Any + Send)> = dest
                .iter_mut()
                .map(|record| record as &mut (dyn Any + Send))
                .collect();
            load_relations(&db, &ctx, &model, &mut records, &self.relations).await?;
        }
        Ok(result)
    }

    /// Selects exactly one row into `dest`. Columns that are not selected keep their values.
    ///
    /// With `where_pk`, the key values are taken from `dest`.
    pub async fn select_one<M: Model>(self, dest: &mut M) -> Result<()> {
        let model = self.typed_model::<M>()?.clone();
        let query = self.pk_conditions(&model, &*dest)?;
        let (db, ctx) = query.runtime()?;
        let sql = query.select_sql()?;
        let mut sink = OneRecord::new(&model, dest);
        db.run_query(&ctx, &sql, &mut sink).await?;
        if sink.rows() == 0 {
            return Err(RelataError::NotFound);
        }
        if !query.relations.is_empty() {
            let mut records: [&mut (dyn Any + Send); 1] = [dest];
            load_relations(&db, &ctx, &model, &mut records, &query.relations).await?;
        }
        Ok(())
    }

    fn order_by_pk(self, direction: &'static str) -> Result<Self> {
        let model = self.require_model()?.clone();
        let mut query = self;
        for idx in model.require_pk()? {
            query = query.order_expr(
                format!("? {direction}"),
                [Arg::ident(format!(
                    "{}.{}",
                    model.alias, model.columns[*idx].name
                ))],
            );
        }
        Ok(query.limit(1))
    }

    /// The row with the lowest primary key.
    pub async fn first<M: Model>(self, dest: &mut M) -> Result<()> {
        self.order_by_pk("ASC")?.select_one(dest).await
    }

    /// The row with the highest primary key.
    pub async fn last<M: Model>(self, dest: &mut M) -> Result<()> {
        self.order_by_pk("DESC")?.select_one(dest).await
    }

    /// Feeds every row into a custom sink.
    pub async fn select_into<S>(self, sink: &mut S) -> Result<QueryResult>
    where
        S: RowSink + ?Sized,
    {
        let (db, ctx) = self.runtime()?;
        let sql = self.select_sql()?;
        db.run_query(&ctx, &sql, sink).await
    }

    /// Every row as untyped values.
    pub async fn select_values(self) -> Result<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        self.select_into(&mut rows).await?;
        Ok(rows)
    }

    /// Calls `f` with each decoded record instead of collecting them. Relations are not
    /// loaded.
    pub async fn for_each<M, F>(self, f: F) -> Result<QueryResult>
    where
        M: Model,
        F: FnMut(M) -> Result<()> + Send,
    {
        let model = self.typed_model::<M>()?.clone();
        let (db, ctx) = self.runtime()?;
        let sql = self.select_sql()?;
        db.run_query(&ctx, &sql, &mut ForEachRecord::new(&model, f))
            .await
    }

    /// Number of matching rows, ignoring ORDER BY, LIMIT and OFFSET.
    pub async fn count(self) -> Result<u64> {
        let (db, ctx) = self.runtime()?;
        let sql = self.count_sql()?;
        let mut counts: Vec<i64> = Vec::new();
        db.run_query(&ctx, &sql, &mut Scalars::new(&mut counts))
            .await?;
        let count = counts.first().copied().ok_or(RelataError::NotFound)?;
        u64::try_from(count)
            .map_err(|_| RelataError::conversion(format!("negative count {count}")))
    }

    pub async fn exists(self) -> Result<bool> {
        let (db, ctx) = self.runtime()?;
        let sql = self.exists_sql()?;
        let result = db.run_query(&ctx, &sql, &mut Discard).await?;
        Ok(result.rows_returned() > 0)
    }

    /// Runs [`Query::select`] and [`Query::count`] concurrently. Both run to completion; the
    /// select error is reported first.
    pub async fn select_and_count<M: Model>(self, dest: &mut Vec<M>) -> Result<u64> {
        let counter = self.clone();
        let (selected, counted) = tokio::join!(self.select(dest), counter.count());
        selected?;
        counted
    }

    /// Row count from the planner estimate; the exact count runs only when the estimate is
    /// below `threshold`.
    pub async fn count_estimate(self, threshold: u64) -> Result<u64> {
        let (db, ctx) = self.runtime()?;
        let sql = self.explain_sql()?;
        let mut plan: Vec<String> = Vec::new();
        db.run_query(&ctx, &sql, &mut Scalars::new(&mut plan))
            .await?;
        match planner_rows(&plan) {
            Some(estimate) if estimate >= threshold => Ok(estimate),
            _ => self.count().await,
        }
    }

    /// Like [`Query::select_and_count`], counting through [`Query::count_estimate`].
    pub async fn select_and_count_estimate<M: Model>(
        self,
        dest: &mut Vec<M>,
        threshold: u64,
    ) -> Result<u64> {
        let counter = self.clone();
        let (selected, counted) =
            tokio::join!(self.select(dest), counter.count_estimate(threshold));
        selected?;
        counted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_estimate_comes_from_the_first_plan_line() {
        let plan = vec![
            "Seq Scan on users user  (cost=0.00..22.70 rows=1270 width=36)".to_owned(),
            "  Filter: (age > 18)".to_owned(),
        ];
        assert_eq!(planner_rows(&plan), Some(1270));
        assert_eq!(planner_rows(&[]), None);
        assert_eq!(planner_rows(&["Result".to_owned()]), None);
        assert_eq!(planner_rows(&["Result  (rows=)".to_owned()]), None);

        let analyzed = ["Limit  (cost=0.00..0.04 rows=3 width=8) (actual rows=2 loops=1)".to_owned()];
        assert_eq!(planner_rows(&analyzed), Some(3));
    }
}
