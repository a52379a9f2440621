//! Structural metadata binding record types to tables.
//!
//! A record type implements [`Model`] and describes its columns and relations once in
//! [`Model::describe`]. [`resolve`] turns that description into an immutable
//! [`TableModel`], memoized per type in the global [`Registry`].

mod builder;
mod naming;
mod registry;
mod relation;
mod scan;

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

pub use builder::{ColumnBuilder, RelationBuilder, TableBuilder};
pub use registry::{Registry, resolve};
pub use relation::{Relation, RelationKind, RelationSlot};
pub(crate) use relation::RelationKeys;
pub(crate) use scan::{ForEachRecord, OneRecord, Records, ReturningRecords};

use crate::error::{RelataError, Result};
use crate::row::{ColumnInfo, decode_value};
use crate::value::Value;

/// A record type mapped to a table.
///
/// ```ignore
/// #[derive(Debug, Clone, Default)]
/// struct User {
///     id: i64,
///     name: String,
///     posts: Vec<Post>,
/// }
///
/// impl Model for User {
///     fn describe(t: &mut TableBuilder<Self>) {
///         t.column("id", |u| &u.id, |u| &mut u.id).pk();
///         t.column("name", |u| &u.name, |u| &mut u.name);
///         t.has_many("posts", |u| &mut u.posts);
///     }
/// }
/// ```
pub trait Model: Default + Clone + Send + Sync + 'static {
    fn describe(table: &mut TableBuilder<Self>);
}

pub(crate) type Getter = Arc<dyn Fn(&dyn Any) -> Result<Value> + Send + Sync>;
pub(crate) type Setter = Arc<dyn Fn(&mut dyn Any, Value) -> Result<()> + Send + Sync>;

/// One mapped column.
#[derive(Clone)]
pub struct Column {
    pub(crate) name: String,
    pub(crate) field: String,
    pub(crate) sql_type: &'static str,
    pub(crate) nullable: bool,
    pub(crate) primary_key: bool,
    pub(crate) use_default: bool,
    pub(crate) soft_delete: bool,
    pub(crate) get: Getter,
    pub(crate) set: Setter,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn sql_type(&self) -> &'static str {
        self.sql_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Zero values are inserted as `DEFAULT`.
    pub fn uses_default(&self) -> bool {
        self.use_default || self.primary_key
    }

    pub fn is_soft_delete(&self) -> bool {
        self.soft_delete
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("field", &self.field)
            .field("sql_type", &self.sql_type)
            .field("nullable", &self.nullable)
            .field("primary_key", &self.primary_key)
            .field("use_default", &self.use_default)
            .field("soft_delete", &self.soft_delete)
            .finish()
    }
}

/// Derived, immutable metadata for one record type.
pub struct TableModel {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) name: String,
    pub(crate) alias: String,
    pub(crate) columns: Vec<Column>,
    pub(crate) by_name: HashMap<String, usize>,
    pub(crate) pks: Vec<usize>,
    pub(crate) soft_delete: Option<usize>,
    pub(crate) relations: Vec<Relation>,
    pub(crate) new_record: fn() -> Box<dyn Any + Send>,
    pub(crate) clone_record: fn(&dyn Any) -> Option<Box<dyn Any + Send>>,
}

impl TableModel {
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// SQL table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alias used to qualify columns in rendered statements.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|idx| &self.columns[idx])
    }

    pub(crate) fn column_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Looks a column up by its column name or its field name.
    pub fn column_by_field(&self, field: &str) -> Option<&Column> {
        self.column(field)
            .or_else(|| self.columns.iter().find(|c| c.field == field))
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &Column> {
        self.pks.iter().map(|idx| &self.columns[*idx])
    }

    pub(crate) fn pk_indexes(&self) -> &[usize] {
        &self.pks
    }

    pub(crate) fn require_pk(&self) -> Result<&[usize]> {
        if self.pks.is_empty() {
            return Err(RelataError::Schema(format!(
                "{} does not declare a primary key",
                self.type_name
            )));
        }
        Ok(&self.pks)
    }

    pub fn soft_delete_column(&self) -> Option<&Column> {
        self.soft_delete.map(|idx| &self.columns[idx])
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Reads the values of the given columns from a record.
    pub(crate) fn values(&self, record: &dyn Any, columns: &[usize]) -> Result<Vec<Value>> {
        columns
            .iter()
            .map(|idx| (self.columns[*idx].get)(record))
            .collect()
    }

    pub(crate) fn value(&self, record: &dyn Any, column: usize) -> Result<Value> {
        (self.columns[column].get)(record)
    }

    /// Decodes one result column into the matching field of `record`.
    ///
    /// Columns whose name starts with `_` and has no field are skipped.
    pub fn scan_column(
        &self,
        record: &mut dyn Any,
        col: &ColumnInfo,
        raw: Option<&[u8]>,
    ) -> Result<()> {
        let Some(idx) = self.column_index(&col.name) else {
            if col.name.starts_with('_') {
                return Ok(());
            }
            return Err(RelataError::Schema(format!(
                "{} has no field for column {:?}",
                self.type_name, col.name
            )));
        };
        let value = decode_value(col, raw)?;
        (self.columns[idx].set)(record, value).map_err(|e| e.with_column(&col.name))
    }

    pub(crate) fn new_record(&self) -> Box<dyn Any + Send> {
        (self.new_record)()
    }

    pub(crate) fn clone_record(&self, record: &dyn Any) -> Result<Box<dyn Any + Send>> {
        (self.clone_record)(record).ok_or_else(|| self.type_mismatch())
    }

    pub(crate) fn type_mismatch(&self) -> RelataError {
        RelataError::Schema(format!("record is not a {}", self.type_name))
    }
}

impl fmt::Debug for TableModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableModel")
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("columns", &self.columns)
            .field("relations", &self.relations)
            .finish()
    }
}
