//! The fluent query builder.
//!
//! A [`Query`] accumulates clauses through methods that take and return `self`. Builder
//! errors (an unknown model, a soft-delete mode on a model without a soft-delete column,
//! a failing callback) are deferred and surface from the terminal operation.
//!
//! ```ignore
//! let mut users: Vec<User> = Vec::new();
//! db.model::<User>()
//!     .column("name")
//!     .where_("age > ?", [18])
//!     .where_or_group(|q| Ok(q.where_("admin", ()).where_("active", ())))
//!     .order("name ASC")
//!     .limit(10)
//!     .select(&mut users)
//!     .await?;
//! ```

mod ddl;
pub(crate) mod fragment;
mod render;
mod select;
mod where_tree;
mod write;

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

pub use ddl::{CreateTableOptions, DropTableOptions};
pub use fragment::{Arg, Fragment, IntoArgs};
pub(crate) use where_tree::{Sep, WhereNode};

use crate::error::{RelataError, Result};
use crate::exec::{Context, Db};
use crate::schema::{Model, TableModel, resolve};
use crate::value::ToValue;

pub(crate) type ApplyFn = Arc<dyn Fn(Query) -> Result<Query> + Send + Sync>;

/// Which rows of a soft-delete model are visible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum Visibility {
    #[default]
    Live,
    Deleted,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CteKind {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub(crate) struct Cte {
    pub name: String,
    pub kind: CteKind,
    pub query: Box<Query>,
}

#[derive(Debug, Clone)]
pub(crate) enum ColumnItem {
    Name(String),
    Expr(Fragment),
}

#[derive(Clone)]
pub(crate) struct RelationRequest {
    pub path: String,
    pub apply: Option<ApplyFn>,
}

impl fmt::Debug for RelationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationRequest")
            .field("path", &self.path)
            .field("apply", &self.apply.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Join {
    pub join: Fragment,
    pub on: Vec<WhereNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetOpKind {
    Union,
    UnionAll,
    Intersect,
    IntersectAll,
    Except,
    ExceptAll,
}

impl SetOpKind {
    pub fn keyword(self) -> &'static str {
        match self {
            SetOpKind::Union => " UNION ",
            SetOpKind::UnionAll => " UNION ALL ",
            SetOpKind::Intersect => " INTERSECT ",
            SetOpKind::IntersectAll => " INTERSECT ALL ",
            SetOpKind::Except => " EXCEPT ",
            SetOpKind::ExceptAll => " EXCEPT ALL ",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SetOp {
    pub kind: SetOpKind,
    pub query: Box<Query>,
}

/// A statement under construction. `Clone` is a deep copy, so a configured query can serve
/// as a template for several independent variants.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub(crate) db: Option<Db>,
    pub(crate) ctx: Option<Context>,
    pub(crate) model: Option<Arc<TableModel>>,
    pub(crate) model_table: Option<Fragment>,
    pub(crate) err: Option<RelataError>,
    pub(crate) with: Vec<Cte>,
    pub(crate) tables: Vec<Fragment>,
    pub(crate) distinct: Option<Vec<Fragment>>,
    pub(crate) columns: Vec<ColumnItem>,
    pub(crate) excluded: Vec<String>,
    pub(crate) relations: Vec<RelationRequest>,
    pub(crate) set: Vec<Fragment>,
    pub(crate) values: Vec<(String, Fragment)>,
    pub(crate) wheres: Vec<WhereNode>,
    pub(crate) where_pk: bool,
    pub(crate) joins: Vec<Join>,
    pub(crate) group: Vec<Fragment>,
    pub(crate) having: Vec<Fragment>,
    pub(crate) set_ops: Vec<SetOp>,
    pub(crate) order: Vec<Fragment>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) on_conflict: Option<Fragment>,
    pub(crate) returning: Vec<Fragment>,
    pub(crate) lock: Option<Fragment>,
    pub(crate) visibility: Visibility,
    pub(crate) all_rows: bool,
}

impl Query {
    /// An empty query with no database handle and no model.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty query sharing this one's database handle, context and model.
    pub fn fresh(&self) -> Self {
        Self {
            db: self.db.clone(),
            ctx: self.ctx.clone(),
            model: self.model.clone(),
            ..Self::default()
        }
    }

    fn fail(mut self, err: RelataError) -> Self {
        if self.err.is_none() {
            self.err = Some(err);
        }
        self
    }

    pub(crate) fn check(&self) -> Result<()> {
        match &self.err {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Sets the context used for cancellation and deadlines of this query only.
    pub fn context(mut self, ctx: Context) -> Self {
        self.ctx = Some(ctx);
        self
    }

    pub fn db(mut self, db: Db) -> Self {
        self.db = Some(db);
        self
    }

    /// Targets the table of `M`.
    pub fn model<M: Model>(self) -> Self {
        match resolve::<M>() {
            Ok(model) => self.for_table_model(model),
            Err(err) => self.fail(err),
        }
    }

    pub fn for_table_model(mut self, model: Arc<TableModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn table_model(&self) -> Option<&Arc<TableModel>> {
        self.model.as_ref()
    }

    /// Replaces the model's `"table" AS "alias"` in FROM and statement targets.
    pub fn model_table_expr(mut self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.model_table = Some(Fragment::new(expr, args));
        self
    }

    fn soft_delete_mode(self, visibility: Visibility) -> Self {
        let supported = self
            .model
            .as_ref()
            .is_some_and(|model| model.soft_delete_column().is_some());
        if !supported {
            let name = self
                .model
                .as_ref()
                .map_or("query without a model", |model| model.type_name());
            return self.fail(RelataError::Schema(format!(
                "{name} does not support soft deletes"
            )));
        }
        Self { visibility, ..self }
    }

    /// Only soft-deleted rows.
    pub fn deleted(self) -> Self {
        self.soft_delete_mode(Visibility::Deleted)
    }

    /// Live and soft-deleted rows.
    pub fn all_with_deleted(self) -> Self {
        self.soft_delete_mode(Visibility::All)
    }

    fn push_cte(mut self, name: impl Into<String>, kind: CteKind, query: Query) -> Self {
        self.with.push(Cte {
            name: name.into(),
            kind,
            query: Box::new(query),
        });
        self
    }

    /// Adds `WITH name AS (select)`.
    pub fn with(self, name: impl Into<String>, query: Query) -> Self {
        self.push_cte(name, CteKind::Select, query)
    }

    /// Adds `WITH name AS (insert)`, rendered from the query's `value` overrides.
    pub fn with_insert(self, name: impl Into<String>, query: Query) -> Self {
        self.push_cte(name, CteKind::Insert, query)
    }

    /// Adds `WITH name AS (update)`, rendered from the query's `set` fragments.
    pub fn with_update(self, name: impl Into<String>, query: Query) -> Self {
        self.push_cte(name, CteKind::Update, query)
    }

    /// Adds `WITH name AS (delete)`.
    pub fn with_delete(self, name: impl Into<String>, query: Query) -> Self {
        self.push_cte(name, CteKind::Delete, query)
    }

    /// Moves this query into a CTE called `name` of a new query with the same handle and
    /// model. The CTEs of this query move to the wrapper.
    pub fn wrap_with(mut self, name: impl Into<String>) -> Self {
        let mut wrapper = self.fresh();
        wrapper.with = std::mem::take(&mut self.with);
        wrapper.err = self.err.clone();
        wrapper.with(name, self)
    }

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.tables.push(Fragment::ident(name));
        self
    }

    pub fn table_expr(mut self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.tables.push(Fragment::new(expr, args));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct.get_or_insert_with(Vec::new);
        self
    }

    pub fn distinct_on(mut self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.distinct
            .get_or_insert_with(Vec::new)
            .push(Fragment::new(expr, args));
        self
    }

    /// Selects a column by name; model columns are alias-qualified.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(ColumnItem::Name(name.into()));
        self
    }

    pub fn column_expr(mut self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.columns
            .push(ColumnItem::Expr(Fragment::new(expr, args)));
        self
    }

    /// Leaves a model column out of the default column list.
    pub fn exclude_column(mut self, name: impl Into<String>) -> Self {
        self.excluded.push(name.into());
        self
    }

    /// Eagerly loads a relation after the primary rows. Dotted paths load nested relations.
    pub fn relation(mut self, path: impl Into<String>) -> Self {
        self.relations.push(RelationRequest {
            path: path.into(),
            apply: None,
        });
        self
    }

    /// Like [`Query::relation`], customizing the secondary query.
    pub fn relation_with<F>(mut self, path: impl Into<String>, apply: F) -> Self
    where
        F: Fn(Query) -> Result<Query> + Send + Sync + 'static,
    {
        self.relations.push(RelationRequest {
            path: path.into(),
            apply: Some(Arc::new(apply)),
        });
        self
    }

    /// Adds a `SET` assignment to UPDATE, or to `ON CONFLICT DO UPDATE`.
    pub fn set(mut self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.set.push(Fragment::new(expr, args));
        self
    }

    /// Overrides the inserted value of a column with an expression.
    pub fn value(
        mut self,
        column: impl Into<String>,
        expr: impl Into<String>,
        args: impl IntoArgs,
    ) -> Self {
        let column = column.into();
        let fragment = Fragment::new(expr, args);
        match self.values.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = fragment,
            None => self.values.push((column, fragment)),
        }
        self
    }

    fn push_where(mut self, sep: Sep, fragment: Fragment) -> Self {
        self.wheres.push(WhereNode::Cond { sep, fragment });
        self
    }

    pub(crate) fn push_where_fragment(self, fragment: Fragment) -> Self {
        self.push_where(Sep::And, fragment)
    }

    /// Adds a condition AND-combined with the previous one.
    pub fn where_(self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.push_where(Sep::And, Fragment::new(expr, args))
    }

    /// Adds a condition OR-combined with the previous one.
    pub fn where_or(self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.push_where(Sep::Or, Fragment::new(expr, args))
    }

    fn push_group<F>(self, sep: Sep, negate: bool, f: F) -> Self
    where
        F: FnOnce(Query) -> Result<Query>,
    {
        let scoped = Query {
            model: self.model.clone(),
            ..Query::default()
        };
        match f(scoped) {
            Ok(scoped) => {
                let mut this = match scoped.err {
                    Some(err) => self.fail(err),
                    None => self,
                };
                this.wheres.push(WhereNode::Group {
                    sep,
                    negate,
                    children: scoped.wheres,
                });
                this
            }
            Err(err) => self.fail(err),
        }
    }

    /// AND-combines the conditions added by `f` as one parenthesized group.
    pub fn where_group<F>(self, f: F) -> Self
    where
        F: FnOnce(Query) -> Result<Query>,
    {
        self.push_group(Sep::And, false, f)
    }

    pub fn where_not_group<F>(self, f: F) -> Self
    where
        F: FnOnce(Query) -> Result<Query>,
    {
        self.push_group(Sep::And, true, f)
    }

    pub fn where_or_group<F>(self, f: F) -> Self
    where
        F: FnOnce(Query) -> Result<Query>,
    {
        self.push_group(Sep::Or, false, f)
    }

    pub fn where_or_not_group<F>(self, f: F) -> Self
    where
        F: FnOnce(Query) -> Result<Query>,
    {
        self.push_group(Sep::Or, true, f)
    }

    /// `where_("id IN (?)", values)` with the values expanded into a parameter list.
    pub fn where_in<I>(self, expr: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToValue,
    {
        self.push_where(Sep::And, Fragment::new(expr, [Arg::in_list(values)]))
    }

    /// `where_("(a, b) IN (?)", rows)` with each row expanded into a parenthesized tuple.
    pub fn where_in_multi<I, R>(self, expr: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator,
        R::Item: ToValue,
    {
        self.push_where(Sep::And, Fragment::new(expr, [Arg::in_multi(rows)]))
    }

    /// Restricts the statement to the primary keys of the records it is given.
    pub fn where_pk(mut self) -> Self {
        self.where_pk = true;
        self
    }

    pub fn join(mut self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.joins.push(Join {
            join: Fragment::new(expr, args),
            on: Vec::new(),
        });
        self
    }

    fn push_join_on(mut self, sep: Sep, fragment: Fragment) -> Self {
        match self.joins.last_mut() {
            Some(join) => {
                join.on.push(WhereNode::Cond { sep, fragment });
                self
            }
            None => self.fail(RelataError::Build(
                "join_on called before any join".into(),
            )),
        }
    }

    /// Adds a condition to the ON clause of the last join.
    pub fn join_on(self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.push_join_on(Sep::And, Fragment::new(expr, args))
    }

    pub fn join_on_or(self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.push_join_on(Sep::Or, Fragment::new(expr, args))
    }

    pub fn group(mut self, column: impl Into<String>) -> Self {
        self.group.push(Fragment::ident(column));
        self
    }

    pub fn group_expr(mut self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.group.push(Fragment::new(expr, args));
        self
    }

    pub fn having(mut self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.having.push(Fragment::new(expr, args));
        self
    }

    fn push_set_op(mut self, kind: SetOpKind, query: Query) -> Self {
        self.set_ops.push(SetOp {
            kind,
            query: Box::new(query),
        });
        self
    }

    pub fn union(self, other: Query) -> Self {
        self.push_set_op(SetOpKind::Union, other)
    }

    pub fn union_all(self, other: Query) -> Self {
        self.push_set_op(SetOpKind::UnionAll, other)
    }

    pub fn intersect(self, other: Query) -> Self {
        self.push_set_op(SetOpKind::Intersect, other)
    }

    pub fn intersect_all(self, other: Query) -> Self {
        self.push_set_op(SetOpKind::IntersectAll, other)
    }

    pub fn except(self, other: Query) -> Self {
        self.push_set_op(SetOpKind::Except, other)
    }

    pub fn except_all(self, other: Query) -> Self {
        self.push_set_op(SetOpKind::ExceptAll, other)
    }

    /// Orders by a column, optionally followed by a direction:
    /// `"name"`, `"created_at DESC"`, `"rank ASC NULLS LAST"`.
    pub fn order(mut self, order: impl Into<String>) -> Self {
        let order = order.into();
        if let Some((column, direction)) = order.split_once(' ') {
            let upper = direction.trim().to_ascii_uppercase();
            if matches!(
                upper.as_str(),
                "ASC"
                    | "DESC"
                    | "ASC NULLS FIRST"
                    | "DESC NULLS FIRST"
                    | "ASC NULLS LAST"
                    | "DESC NULLS LAST"
            ) {
                self.order.push(Fragment::new(
                    "? ?",
                    [Arg::ident(column), Arg::safe(upper)],
                ));
                return self;
            }
        }
        self.order.push(Fragment::ident(order));
        self
    }

    pub fn order_expr(mut self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.order.push(Fragment::new(expr, args));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// `ON CONFLICT <expr>`; with `DO UPDATE` the query's `set` fragments follow as `SET`.
    pub fn on_conflict(mut self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.on_conflict = Some(Fragment::new(expr, args));
        self
    }

    /// Adds a RETURNING item. `returning("NULL", ())` suppresses the automatic RETURNING of
    /// columns inserted as DEFAULT.
    pub fn returning(mut self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.returning.push(Fragment::new(expr, args));
        self
    }

    /// Locking clause: `for_("UPDATE SKIP LOCKED", ())`.
    pub fn for_(mut self, expr: impl Into<String>, args: impl IntoArgs) -> Self {
        self.lock = Some(Fragment::new(expr, args));
        self
    }

    /// Runs a reusable builder function over the query.
    pub fn apply<F>(self, f: F) -> Self
    where
        F: FnOnce(Query) -> Result<Query>,
    {
        let fallback = self.fresh();
        match f(self) {
            Ok(query) => query,
            Err(err) => fallback.fail(err),
        }
    }

    /// Allows UPDATE and DELETE without any condition.
    pub fn all_rows(mut self) -> Self {
        self.all_rows = true;
        self
    }

    /// The database handle and the context the query runs under.
    pub(crate) fn runtime(&self) -> Result<(Db, Context)> {
        let db = self
            .db
            .clone()
            .ok_or_else(|| RelataError::Build("query has no database handle".into()))?;
        let ctx = self.ctx.clone().unwrap_or_else(|| db.context().clone());
        Ok((db, ctx))
    }

    pub(crate) fn require_model(&self) -> Result<&Arc<TableModel>> {
        self.model
            .as_ref()
            .ok_or_else(|| RelataError::Build("query has no model".into()))
    }

    /// The query's model, checked to be the table of `M`.
    pub(crate) fn typed_model<M: Model>(&self) -> Result<&Arc<TableModel>> {
        let model = self.require_model()?;
        if model.type_id() != TypeId::of::<M>() {
            return Err(RelataError::Build(format!(
                "query targets {} but the records are {}",
                model.type_name(),
                std::any::type_name::<M>()
            )));
        }
        Ok(model)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.select_sql() {
            Ok(sql) => fmt::Display::fmt(&sql, f),
            Err(err) => write!(f, "<{err}>"),
        }
    }
}
