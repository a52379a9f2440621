//! Rendering of a [`Query`] into parameterized statements.
//!
//! Clause order is fixed: WITH, SELECT [DISTINCT [ON]], columns, FROM, JOIN, WHERE,
//! GROUP BY, HAVING, set operations, ORDER BY, LIMIT, OFFSET, FOR.

use std::any::Any;

use chrono::Utc;

use super::fragment::{Fragment, RenderCx, push_columns};
use super::where_tree::{render_nodes, visible_len};
use super::{ColumnItem, CteKind, Query, Visibility};
use crate::error::{RelataError, Result};
use crate::schema::{Model, TableModel};
use crate::sql::SQL;
use crate::value::Value;

/// A rendered write statement.
pub(crate) struct Rendered {
    pub sql: SQL,
    /// The statement returns rows to decode back into the written records
    pub returning: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateMode {
    All,
    NotZero,
}

fn no_target() -> RelataError {
    RelataError::Build("statement has no target table".into())
}

fn render_list(fragments: &[Fragment], cx: RenderCx<'_>, out: &mut SQL) -> Result<()> {
    for (i, fragment) in fragments.iter().enumerate() {
        if i > 0 {
            out.push_raw(", ");
        }
        fragment.render(cx, out)?;
    }
    Ok(())
}

fn qualified(model: &TableModel, idx: usize) -> SQL {
    SQL::ident(format!("{}.{}", model.alias, model.columns[idx].name))
}

/// `pk = $1`, or an IN list over several records; tuples for composite keys.
fn pk_condition(model: &TableModel, records: &[&dyn Any]) -> Result<SQL> {
    let pks = model.require_pk()?;
    match records {
        [] => Err(RelataError::Build(
            "where_pk needs at least one record".into(),
        )),
        [record] => {
            let conditions = pks
                .iter()
                .map(|idx| {
                    Ok(qualified(model, *idx)
                        .append(SQL::raw(" = "))
                        .append(SQL::param(model.value(*record, *idx)?)))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(SQL::join(conditions, " AND "))
        }
        records => {
            let composite = pks.len() > 1;
            let lhs = SQL::join(pks.iter().map(|idx| qualified(model, *idx)), ", ");
            let rows = records
                .iter()
                .map(|record| {
                    let values = model.values(*record, pks)?;
                    let row = SQL::join(values.into_iter().map(SQL::param), ", ");
                    Ok(if composite { row.parens() } else { row })
                })
                .collect::<Result<Vec<_>>>()?;
            let lhs = if composite { lhs.parens() } else { lhs };
            Ok(lhs
                .append(SQL::raw(" IN ("))
                .append(SQL::join(rows, ", "))
                .append(SQL::raw(")")))
        }
    }
}

pub(crate) fn as_any<M: Model>(records: &[M]) -> Vec<&dyn Any> {
    records.iter().map(|record| record as &dyn Any).collect()
}

impl Query {
    fn cx(&self) -> RenderCx<'_> {
        RenderCx::new(self.model.as_deref())
    }

    fn render_ctes(&self, out: &mut SQL) -> Result<()> {
        for (i, cte) in self.with.iter().enumerate() {
            out.push_raw(if i == 0 { "WITH " } else { ", " });
            out.push_ident(cte.name.clone());
            out.push_raw(" AS (");
            let body = match cte.kind {
                CteKind::Select => cte.query.select_sql()?,
                CteKind::Insert => cte.query.render_insert(&[])?.sql,
                CteKind::Update => cte.query.render_update(&[], UpdateMode::All)?.sql,
                CteKind::Delete => cte.query.render_delete(&[], false)?.sql,
            };
            out.append_mut(body);
            out.push_raw(")");
        }
        if !self.with.is_empty() {
            out.push_raw(" ");
        }
        Ok(())
    }

    /// FROM items: the model table (or its override) followed by explicit tables.
    fn from_items(&self, cx: RenderCx<'_>) -> Result<Vec<SQL>> {
        let mut items = Vec::with_capacity(self.tables.len() + 1);
        if let Some(expr) = &self.model_table {
            let mut item = SQL::empty();
            expr.render(cx, &mut item)?;
            items.push(item);
        } else if let Some(model) = &self.model {
            items.push(
                SQL::ident(model.name.clone())
                    .append(SQL::raw(" AS "))
                    .append(SQL::ident(model.alias.clone())),
            );
        }
        for table in &self.tables {
            let mut item = SQL::empty();
            table.render(cx, &mut item)?;
            items.push(item);
        }
        Ok(items)
    }

    /// Model columns minus exclusions, in declaration order.
    fn model_columns(&self, model: &TableModel) -> Result<Vec<usize>> {
        if let Some(unknown) = self
            .excluded
            .iter()
            .find(|name| model.column(name).is_none())
        {
            return Err(RelataError::Build(format!(
                "{} has no column {unknown:?} to exclude",
                model.type_name
            )));
        }
        Ok((0..model.columns.len())
            .filter(|idx| !self.excluded.contains(&model.columns[*idx].name))
            .collect())
    }

    /// Columns written by INSERT and UPDATE: explicit names, or the model columns.
    fn write_columns(&self, model: &TableModel) -> Result<Vec<usize>> {
        let names: Vec<&str> = self
            .columns
            .iter()
            .filter_map(|item| match item {
                ColumnItem::Name(name) => Some(name.as_str()),
                ColumnItem::Expr(_) => None,
            })
            .collect();
        if names.is_empty() {
            return self.model_columns(model);
        }
        names
            .into_iter()
            .map(|name| {
                model.column_index(name).ok_or_else(|| {
                    RelataError::Build(format!("{} has no column {name:?}", model.type_name))
                })
            })
            .collect()
    }

    fn render_select_columns(&self, cx: RenderCx<'_>, out: &mut SQL) -> Result<()> {
        if !self.columns.is_empty() {
            for (i, item) in self.columns.iter().enumerate() {
                if i > 0 {
                    out.push_raw(", ");
                }
                match item {
                    ColumnItem::Name(name) => match &self.model {
                        Some(model) if model.column(name).is_some() => {
                            out.push_ident(format!("{}.{name}", model.alias));
                        }
                        _ => out.push_ident(name.clone()),
                    },
                    ColumnItem::Expr(fragment) => fragment.render(cx, out)?,
                }
            }
            return Ok(());
        }
        match &self.model {
            Some(model) => {
                let columns = self.model_columns(model)?;
                if columns.is_empty() {
                    return Err(RelataError::Build("SELECT with zero columns".into()));
                }
                push_columns(
                    model,
                    columns.iter().map(|idx| model.columns[*idx].name.as_str()),
                    true,
                    out,
                );
            }
            None => out.push_raw("*"),
        }
        Ok(())
    }

    fn soft_delete_filter(&self) -> Option<SQL> {
        let model = self.model.as_ref()?;
        let column = model.soft_delete_column()?;
        let test = match self.visibility {
            Visibility::Live => " IS NULL",
            Visibility::Deleted => " IS NOT NULL",
            Visibility::All => return None,
        };
        Some(SQL::ident(format!("{}.{}", model.alias, column.name)).append(SQL::raw(test)))
    }

    /// The primary-key condition for `records`, when `where_pk` was requested or the
    /// statement is record-based and has no other condition.
    fn pk_condition_for(&self, records: &[&dyn Any]) -> Result<Option<SQL>> {
        let implied = !records.is_empty() && visible_len(&self.wheres) == 0;
        if !(self.where_pk || implied) {
            return Ok(None);
        }
        pk_condition(self.require_model()?, records).map(Some)
    }

    fn guard(&self, statement: &'static str, has_pk: bool) -> Result<()> {
        if visible_len(&self.wheres) == 0 && !has_pk && !self.all_rows {
            return Err(RelataError::UnsafeOperation(statement));
        }
        Ok(())
    }

    /// Renders ` WHERE ...` from the user conditions, a primary-key condition and the
    /// soft-delete filter, AND-combined in that order.
    fn render_where(
        &self,
        cx: RenderCx<'_>,
        pk: Option<SQL>,
        soft_delete: bool,
        out: &mut SQL,
    ) -> Result<()> {
        let filter = if soft_delete {
            self.soft_delete_filter()
        } else {
            None
        };
        let visible = visible_len(&self.wheres);
        let mut parts = Vec::with_capacity(3);
        if visible > 0 {
            let mut user = SQL::empty();
            render_nodes(&self.wheres, cx, &mut user)?;
            let combined = pk.is_some() || filter.is_some();
            parts.push(if visible > 1 && combined {
                user.parens()
            } else {
                user
            });
        }
        parts.extend(pk);
        parts.extend(filter);
        if !parts.is_empty() {
            out.push_raw(" WHERE ");
            out.append_mut(SQL::join(parts, " AND "));
        }
        Ok(())
    }

    fn render_returning(
        &self,
        cx: RenderCx<'_>,
        implicit: Option<SQL>,
        out: &mut SQL,
    ) -> Result<bool> {
        if self.returning.iter().any(|item| item.is("NULL")) {
            return Ok(false);
        }
        if !self.returning.is_empty() {
            out.push_raw(" RETURNING ");
            render_list(&self.returning, cx, out)?;
            return Ok(true);
        }
        match implicit {
            Some(columns) => {
                out.push_raw(" RETURNING ");
                out.append_mut(columns);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn render_select_core(&self, cx: RenderCx<'_>, out: &mut SQL) -> Result<()> {
        out.push_raw("SELECT ");
        if let Some(on) = &self.distinct {
            if on.is_empty() {
                out.push_raw("DISTINCT ");
            } else {
                out.push_raw("DISTINCT ON (");
                render_list(on, cx, out)?;
                out.push_raw(") ");
            }
        }
        self.render_select_columns(cx, out)?;

        let from = self.from_items(cx)?;
        if !from.is_empty() {
            out.push_raw(" FROM ");
            out.append_mut(SQL::join(from, ", "));
        }
        for join in &self.joins {
            out.push_raw(" ");
            join.join.render(cx, out)?;
            if visible_len(&join.on) > 0 {
                out.push_raw(" ON ");
                render_nodes(&join.on, cx, out)?;
            }
        }
        self.render_where(cx, None, true, out)?;

        if !self.group.is_empty() {
            out.push_raw(" GROUP BY ");
            render_list(&self.group, cx, out)?;
        }
        for (i, having) in self.having.iter().enumerate() {
            out.push_raw(if i == 0 { " HAVING (" } else { " AND (" });
            having.render(cx, out)?;
            out.push_raw(")");
        }
        Ok(())
    }

    /// Renders the query as a SELECT.
    pub fn select_sql(&self) -> Result<SQL> {
        self.check()?;
        let cx = self.cx();
        let mut out = SQL::empty();
        self.render_ctes(&mut out)?;

        if self.set_ops.is_empty() {
            self.render_select_core(cx, &mut out)?;
        } else {
            out.push_raw("(");
            self.render_select_core(cx, &mut out)?;
            out.push_raw(")");
            for op in &self.set_ops {
                out.push_raw(op.kind.keyword());
                out.append_mut(op.query.select_sql()?.parens());
            }
        }

        if !self.order.is_empty() {
            out.push_raw(" ORDER BY ");
            render_list(&self.order, cx, &mut out)?;
        }
        if let Some(limit) = self.limit {
            out.push_raw(format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            out.push_raw(format!(" OFFSET {offset}"));
        }
        if let Some(lock) = &self.lock {
            out.push_raw(" FOR ");
            lock.render(cx, &mut out)?;
        }
        Ok(out)
    }

    /// Renders `count(*)` over the query, ignoring ORDER BY, LIMIT and OFFSET.
    ///
    /// Queries with DISTINCT, GROUP BY or set operations are counted through a
    /// `_count_wrapper` CTE.
    pub fn count_sql(&self) -> Result<SQL> {
        self.check()?;
        let mut inner = self.clone();
        inner.order.clear();
        inner.limit = None;
        inner.offset = None;
        inner.lock = None;

        if inner.distinct.is_some() || !inner.group.is_empty() || !inner.set_ops.is_empty() {
            let mut out = SQL::raw("WITH ");
            out.push_ident("_count_wrapper");
            out.push_raw(" AS (");
            out.append_mut(inner.select_sql()?);
            out.push_raw(") SELECT count(*) FROM ");
            out.push_ident("_count_wrapper");
            return Ok(out);
        }
        inner.columns = vec![ColumnItem::Expr(Fragment::from("count(*)"))];
        inner.select_sql()
    }

    /// Renders `SELECT 1 ... LIMIT 1`.
    pub fn exists_sql(&self) -> Result<SQL> {
        let mut inner = self.clone();
        inner.columns = vec![ColumnItem::Expr(Fragment::from("1"))];
        inner.order.clear();
        inner.limit = Some(1);
        inner.select_sql()
    }

    /// The planner estimate query used by `select_and_count_estimate`.
    pub(crate) fn explain_sql(&self) -> Result<SQL> {
        let mut inner = self.clone();
        inner.order.clear();
        inner.limit = None;
        inner.offset = None;
        Ok(SQL::raw("EXPLAIN ").append(inner.select_sql()?))
    }

    pub(crate) fn render_insert(&self, records: &[&dyn Any]) -> Result<Rendered> {
        enum Source {
            Model(usize),
            Value,
        }

        self.check()?;
        let cx = self.cx();
        let mut out = SQL::empty();
        self.render_ctes(&mut out)?;
        out.push_raw("INSERT INTO ");
        out.append_mut(self.from_items(cx)?.into_iter().next().ok_or_else(no_target)?);

        let mut columns: Vec<(String, Source)> = Vec::new();
        let model = if records.is_empty() {
            None
        } else {
            Some(self.require_model()?)
        };
        if let Some(model) = model {
            for idx in self.write_columns(model)? {
                columns.push((model.columns[idx].name.clone(), Source::Model(idx)));
            }
        }
        for (name, _) in &self.values {
            if !columns.iter().any(|(existing, _)| existing == name) {
                columns.push((name.clone(), Source::Value));
            }
        }
        if columns.is_empty() {
            return Err(RelataError::Build("INSERT with zero columns".into()));
        }

        out.push_raw(" (");
        out.append_mut(SQL::join(
            columns.iter().map(|(name, _)| SQL::ident(name.clone())),
            ", ",
        ));
        out.push_raw(") VALUES ");

        let rows: Vec<Option<&dyn Any>> = if records.is_empty() {
            vec![None]
        } else {
            records.iter().map(|record| Some(*record)).collect()
        };
        let mut defaults: Vec<usize> = Vec::new();
        for (r, record) in rows.iter().enumerate() {
            if r > 0 {
                out.push_raw(", ");
            }
            out.push_raw("(");
            let row_cx = match record {
                Some(record) => cx.with_record(*record),
                None => cx,
            };
            for (i, (name, source)) in columns.iter().enumerate() {
                if i > 0 {
                    out.push_raw(", ");
                }
                if let Some((_, fragment)) = self.values.iter().find(|(column, _)| column == name) {
                    fragment.render(row_cx, &mut out)?;
                    continue;
                }
                match (source, model, record) {
                    (Source::Model(idx), Some(model), Some(record)) => {
                        let column = &model.columns[*idx];
                        let value = (column.get)(*record)?;
                        if value.is_zero() && column.uses_default() {
                            out.push_raw("DEFAULT");
                            if !defaults.contains(idx) {
                                defaults.push(*idx);
                            }
                        } else {
                            out.push_param(value);
                        }
                    }
                    _ => out.push_raw("DEFAULT"),
                }
            }
            out.push_raw(")");
        }

        if let Some(conflict) = &self.on_conflict {
            out.push_raw(" ON CONFLICT ");
            conflict.render(cx, &mut out)?;
            if conflict.expr.to_ascii_uppercase().contains("DO UPDATE") {
                let first_cx = match records.first() {
                    Some(record) => cx.with_record(*record),
                    None => cx,
                };
                let assignments = if !self.set.is_empty() {
                    let mut set = SQL::empty();
                    render_list(&self.set, first_cx, &mut set)?;
                    set
                } else {
                    let excluded = columns.iter().filter_map(|(name, source)| match (source, model) {
                        (Source::Model(idx), Some(model)) if model.columns[*idx].primary_key => None,
                        _ => Some(
                            SQL::ident(name.clone())
                                .append(SQL::raw(" = EXCLUDED."))
                                .append(SQL::ident(name.clone())),
                        ),
                    });
                    SQL::join(excluded, ", ")
                };
                if assignments.is_empty() {
                    return Err(RelataError::Build(
                        "ON CONFLICT DO UPDATE with nothing to SET".into(),
                    ));
                }
                out.push_raw(" SET ");
                out.append_mut(assignments);
            }
        }

        let implicit = match model {
            Some(model) if !defaults.is_empty() => Some(SQL::join(
                defaults
                    .iter()
                    .map(|idx| SQL::ident(model.columns[*idx].name.clone())),
                ", ",
            )),
            _ => None,
        };
        let returning = self.render_returning(cx, implicit, &mut out)?;
        Ok(Rendered {
            sql: out,
            returning,
        })
    }

    pub(crate) fn render_update(&self, records: &[&dyn Any], mode: UpdateMode) -> Result<Rendered> {
        self.check()?;
        let pk = self.pk_condition_for(records)?;
        self.guard("UPDATE", pk.is_some())?;

        let cx = self.cx();
        let record_cx = match records.first() {
            Some(record) => cx.with_record(*record),
            None => cx,
        };
        let mut out = SQL::empty();
        self.render_ctes(&mut out)?;
        out.push_raw("UPDATE ");
        let mut from = self.from_items(cx)?.into_iter();
        out.append_mut(from.next().ok_or_else(no_target)?);

        let mut assignments = Vec::new();
        if !self.set.is_empty() {
            for fragment in &self.set {
                let mut assignment = SQL::empty();
                fragment.render(record_cx, &mut assignment)?;
                assignments.push(assignment);
            }
        } else if let (Some(model), Some(record)) = (self.model.as_deref(), records.first()) {
            for idx in self.write_columns(model)? {
                let column = &model.columns[idx];
                if column.primary_key {
                    continue;
                }
                let value = (column.get)(*record)?;
                if mode == UpdateMode::NotZero && value.is_zero() {
                    continue;
                }
                assignments.push(
                    SQL::ident(column.name.clone())
                        .append(SQL::raw(" = "))
                        .append(SQL::param(value)),
                );
            }
        }
        if assignments.is_empty() {
            return Err(RelataError::Build("UPDATE with nothing to SET".into()));
        }
        out.push_raw(" SET ");
        out.append_mut(SQL::join(assignments, ", "));

        let rest: Vec<SQL> = from.collect();
        if !rest.is_empty() {
            out.push_raw(" FROM ");
            out.append_mut(SQL::join(rest, ", "));
        }
        self.render_where(cx, pk, true, &mut out)?;
        let returning = self.render_returning(cx, None, &mut out)?;
        Ok(Rendered {
            sql: out,
            returning,
        })
    }

    /// `UPDATE t AS a SET c = _data.c FROM (VALUES ...) AS _data (...) WHERE a.pk = _data.pk`
    pub(crate) fn render_update_many(&self, records: &[&dyn Any]) -> Result<Rendered> {
        self.check()?;
        let model = self.require_model()?;
        let pks = model.require_pk()?;
        if records.is_empty() {
            return Err(RelataError::Build(
                "update_many needs at least one record".into(),
            ));
        }

        let cx = self.cx();
        let mut out = SQL::empty();
        self.render_ctes(&mut out)?;
        out.push_raw("UPDATE ");
        let mut from = self.from_items(cx)?.into_iter();
        out.append_mut(from.next().ok_or_else(no_target)?);

        let set_columns: Vec<usize> = self
            .write_columns(model)?
            .into_iter()
            .filter(|idx| !model.columns[*idx].primary_key)
            .collect();
        let mut data_columns = pks.to_vec();
        data_columns.extend(&set_columns);

        out.push_raw(" SET ");
        if !self.set.is_empty() {
            render_list(&self.set, cx, &mut out)?;
        } else if set_columns.is_empty() {
            return Err(RelataError::Build("UPDATE with nothing to SET".into()));
        } else {
            out.append_mut(SQL::join(
                set_columns.iter().map(|idx| {
                    let name = &model.columns[*idx].name;
                    SQL::ident(name.clone())
                        .append(SQL::raw(" = "))
                        .append(SQL::ident(format!("_data.{name}")))
                }),
                ", ",
            ));
        }

        out.push_raw(" FROM (VALUES ");
        let rows = records
            .iter()
            .map(|record| {
                let values = data_columns
                    .iter()
                    .map(|idx| {
                        let column = &model.columns[*idx];
                        Ok(SQL::param((column.get)(*record)?)
                            .append(SQL::raw(format!("::{}", column.sql_type))))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(SQL::join(values, ", ").parens())
            })
            .collect::<Result<Vec<_>>>()?;
        out.append_mut(SQL::join(rows, ", "));
        out.push_raw(") AS ");
        out.push_ident("_data");
        out.push_raw(" (");
        out.append_mut(SQL::join(
            data_columns
                .iter()
                .map(|idx| SQL::ident(model.columns[*idx].name.clone())),
            ", ",
        ));
        out.push_raw(")");
        for table in from {
            out.push_raw(", ");
            out.append_mut(table);
        }

        let matched = SQL::join(
            pks.iter().map(|idx| {
                qualified(model, *idx)
                    .append(SQL::raw(" = "))
                    .append(SQL::ident(format!("_data.{}", model.columns[*idx].name)))
            }),
            " AND ",
        );
        self.render_where(cx, Some(matched), true, &mut out)?;
        let returning = self.render_returning(cx, None, &mut out)?;
        Ok(Rendered {
            sql: out,
            returning,
        })
    }

    /// DELETE, or `UPDATE ... SET deleted_at = now` for soft-delete models unless `force`.
    pub(crate) fn render_delete(&self, records: &[&dyn Any], force: bool) -> Result<Rendered> {
        self.check()?;
        let pk = self.pk_condition_for(records)?;
        self.guard("DELETE", pk.is_some())?;

        let cx = self.cx();
        let soft = if force {
            None
        } else {
            self.model.as_deref().and_then(TableModel::soft_delete_column)
        };
        let mut out = SQL::empty();
        self.render_ctes(&mut out)?;
        let mut from = self.from_items(cx)?.into_iter();
        let target = from.next().ok_or_else(no_target)?;
        let rest: Vec<SQL> = from.collect();

        match soft {
            Some(column) => {
                out.push_raw("UPDATE ");
                out.append_mut(target);
                out.push_raw(" SET ");
                out.push_ident(column.name.clone());
                out.push_raw(" = ");
                let now = Utc::now();
                out.push_param(if column.sql_type == "timestamp" {
                    Value::Timestamp(now.naive_utc())
                } else {
                    Value::TimestampTz(now)
                });
                if !rest.is_empty() {
                    out.push_raw(" FROM ");
                    out.append_mut(SQL::join(rest, ", "));
                }
            }
            None => {
                out.push_raw("DELETE FROM ");
                out.append_mut(target);
                if !rest.is_empty() {
                    out.push_raw(" USING ");
                    out.append_mut(SQL::join(rest, ", "));
                }
            }
        }
        self.render_where(cx, pk, soft.is_some(), &mut out)?;
        let returning = self.render_returning(cx, None, &mut out)?;
        Ok(Rendered {
            sql: out,
            returning,
        })
    }

    /// Renders the INSERT of `records`.
    pub fn insert_sql<M: Model>(&self, records: &[M]) -> Result<SQL> {
        self.typed_model::<M>()?;
        Ok(self.render_insert(&as_any(records))?.sql)
    }

    /// Renders an INSERT built only from `value` overrides.
    pub fn insert_values_sql(&self) -> Result<SQL> {
        Ok(self.render_insert(&[])?.sql)
    }

    /// Renders the UPDATE of one record; without conditions it targets the record's key.
    pub fn update_sql<M: Model>(&self, record: &M) -> Result<SQL> {
        self.typed_model::<M>()?;
        Ok(self.render_update(&[record as &dyn Any], UpdateMode::All)?.sql)
    }

    pub fn update_not_zero_sql<M: Model>(&self, record: &M) -> Result<SQL> {
        self.typed_model::<M>()?;
        Ok(self
            .render_update(&[record as &dyn Any], UpdateMode::NotZero)?
            .sql)
    }

    /// Renders an UPDATE built only from `set` fragments.
    pub fn update_values_sql(&self) -> Result<SQL> {
        Ok(self.render_update(&[], UpdateMode::All)?.sql)
    }

    pub fn update_many_sql<M: Model>(&self, records: &[M]) -> Result<SQL> {
        self.typed_model::<M>()?;
        Ok(self.render_update_many(&as_any(records))?.sql)
    }

    pub fn delete_sql(&self) -> Result<SQL> {
        Ok(self.render_delete(&[], false)?.sql)
    }

    /// Renders the DELETE of `records` by primary key.
    pub fn delete_records_sql<M: Model>(&self, records: &[M]) -> Result<SQL> {
        self.typed_model::<M>()?;
        Ok(self.render_delete(&as_any(records), false)?.sql)
    }

    pub fn force_delete_sql(&self) -> Result<SQL> {
        Ok(self.render_delete(&[], true)?.sql)
    }
}
