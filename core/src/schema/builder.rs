use std::any::{Any, TypeId, type_name};
use std::marker::PhantomData;
use std::sync::Arc;

use hashbrown::HashMap;
use heck::ToSnakeCase;

use super::naming::{default_alias, default_table};
use super::relation::Assigner;
use super::{Column, Model, Relation, RelationKind, RelationSlot, TableModel, resolve};
use crate::error::{RelataError, Result};
use crate::value::{ColumnType, Value};

/// Collects the structural description of `M` inside [`Model::describe`].
pub struct TableBuilder<M> {
    name: Option<String>,
    alias: Option<String>,
    columns: Vec<Column>,
    relations: Vec<Relation>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> TableBuilder<M> {
    fn new() -> Self {
        Self {
            name: None,
            alias: None,
            columns: Vec::new(),
            relations: Vec::new(),
            _model: PhantomData,
        }
    }

    /// Overrides the table name (default: pluralized snake_case type name).
    pub fn table(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the alias (default: snake_case type name).
    pub fn alias(&mut self, alias: impl Into<String>) -> &mut Self {
        self.alias = Some(alias.into());
        self
    }

    /// Maps a field to a column named after the snake_case field name.
    pub fn column<T: ColumnType>(
        &mut self,
        field: &str,
        get: fn(&M) -> &T,
        get_mut: fn(&mut M) -> &mut T,
    ) -> ColumnBuilder<'_> {
        let getter = Arc::new(move |record: &dyn Any| match record.downcast_ref::<M>() {
            Some(record) => get(record).try_to_value(),
            None => Ok(Value::Null),
        });
        let setter = Arc::new(move |record: &mut dyn Any, value: Value| -> Result<()> {
            let record = record.downcast_mut::<M>().ok_or_else(|| {
                RelataError::Schema(format!("record is not a {}", type_name::<M>()))
            })?;
            *get_mut(record) = T::from_value(value)?;
            Ok(())
        });

        self.columns.push(Column {
            name: field.to_snake_case(),
            field: field.to_owned(),
            sql_type: T::SQL_TYPE,
            nullable: T::NULLABLE,
            primary_key: false,
            use_default: false,
            soft_delete: false,
            get: getter,
            set: setter,
        });
        let last = self.columns.len() - 1;
        ColumnBuilder {
            column: &mut self.columns[last],
        }
    }

    pub fn has_one<S>(&mut self, name: &str, slot: fn(&mut M) -> &mut S) -> RelationBuilder<'_>
    where
        S: RelationSlot,
    {
        self.relation(name, RelationKind::HasOne, slot)
    }

    pub fn belongs_to<S>(&mut self, name: &str, slot: fn(&mut M) -> &mut S) -> RelationBuilder<'_>
    where
        S: RelationSlot,
    {
        self.relation(name, RelationKind::BelongsTo, slot)
    }

    pub fn has_many<S>(&mut self, name: &str, slot: fn(&mut M) -> &mut S) -> RelationBuilder<'_>
    where
        S: RelationSlot,
    {
        self.relation(name, RelationKind::HasMany, slot)
    }

    pub fn many_to_many<S>(
        &mut self,
        name: &str,
        slot: fn(&mut M) -> &mut S,
    ) -> RelationBuilder<'_>
    where
        S: RelationSlot,
    {
        self.relation(name, RelationKind::ManyToMany, slot)
    }

    fn relation<S: RelationSlot>(
        &mut self,
        name: &str,
        kind: RelationKind,
        slot: fn(&mut M) -> &mut S,
    ) -> RelationBuilder<'_> {
        let assign: Assigner = Arc::new(
            move |owner: &mut dyn Any, records: Vec<Box<dyn Any + Send>>| -> Result<()> {
                let owner = owner.downcast_mut::<M>().ok_or_else(|| {
                    RelataError::Schema(format!("record is not a {}", type_name::<M>()))
                })?;
                let typed = records
                    .into_iter()
                    .map(|record| {
                        record.downcast::<S::Target>().map(|b| *b).map_err(|_| {
                            RelataError::Schema(format!(
                                "loaded record is not a {}",
                                type_name::<S::Target>()
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                slot(owner).assign(typed);
                Ok(())
            },
        );

        self.relations.push(Relation {
            name: name.to_owned(),
            kind,
            join_type: type_name::<S::Target>(),
            join: resolve::<S::Target>,
            base_fk: Vec::new(),
            join_fk: Vec::new(),
            m2m_table: None,
            assign,
        });
        let last = self.relations.len() - 1;
        RelationBuilder {
            relation: &mut self.relations[last],
        }
    }

    pub(crate) fn build() -> Result<TableModel> {
        let mut builder = Self::new();
        M::describe(&mut builder);

        let model_name = type_name::<M>();
        let mut by_name = HashMap::with_capacity(builder.columns.len());
        let mut pks = Vec::new();
        let mut soft_delete = None;
        for (idx, column) in builder.columns.iter().enumerate() {
            if by_name.insert(column.name.clone(), idx).is_some() {
                return Err(RelataError::Schema(format!(
                    "{model_name} maps column {:?} twice",
                    column.name
                )));
            }
            if column.primary_key {
                pks.push(idx);
            }
            if column.soft_delete {
                if soft_delete.replace(idx).is_some() {
                    return Err(RelataError::Schema(format!(
                        "{model_name} declares more than one soft-delete column"
                    )));
                }
                if !column.nullable {
                    return Err(RelataError::Schema(format!(
                        "soft-delete column {:?} on {model_name} must be an Option",
                        column.name
                    )));
                }
                if !matches!(column.sql_type, "timestamptz" | "timestamp") {
                    return Err(RelataError::Schema(format!(
                        "soft-delete column {:?} on {model_name} must be a timestamp, not {}",
                        column.name, column.sql_type
                    )));
                }
            }
        }

        for relation in &builder.relations {
            if relation.kind == RelationKind::ManyToMany && relation.m2m_table.is_none() {
                return Err(RelataError::Schema(format!(
                    "many-to-many relation {:?} on {model_name} needs an m2m table",
                    relation.name
                )));
            }
            if relation.kind == RelationKind::BelongsTo
                && let Some(missing) = relation
                    .join_fk
                    .iter()
                    .find(|fk| !by_name.contains_key(fk.as_str()))
            {
                return Err(RelataError::Schema(format!(
                    "relation {:?} on {model_name} references unknown column {missing:?}",
                    relation.name
                )));
            }
        }

        Ok(TableModel {
            type_id: TypeId::of::<M>(),
            type_name: model_name,
            name: builder.name.unwrap_or_else(|| default_table(model_name)),
            alias: builder.alias.unwrap_or_else(|| default_alias(model_name)),
            columns: builder.columns,
            by_name,
            pks,
            soft_delete,
            relations: builder.relations,
            new_record: new_record::<M>,
            clone_record: clone_record::<M>,
        })
    }
}

fn new_record<M: Model>() -> Box<dyn Any + Send> {
    Box::new(M::default())
}

fn clone_record<M: Model>(record: &dyn Any) -> Option<Box<dyn Any + Send>> {
    record
        .downcast_ref::<M>()
        .map(|record| Box::new(record.clone()) as Box<dyn Any + Send>)
}

/// Refines the column just declared with [`TableBuilder::column`].
pub struct ColumnBuilder<'a> {
    column: &'a mut Column,
}

impl ColumnBuilder<'_> {
    /// Overrides the column name.
    pub fn name(self, name: impl Into<String>) -> Self {
        self.column.name = name.into();
        self
    }

    pub fn pk(self) -> Self {
        self.column.primary_key = true;
        self
    }

    /// Inserts `DEFAULT` instead of the zero value.
    pub fn use_default(self) -> Self {
        self.column.use_default = true;
        self
    }

    /// Marks a nullable timestamp column as the soft-delete marker.
    pub fn soft_delete(self) -> Self {
        self.column.soft_delete = true;
        self
    }

    /// Declares the column NOT NULL in DDL even though the field is an `Option`.
    pub fn not_null(self) -> Self {
        self.column.nullable = false;
        self
    }
}

/// Refines the relation just declared on a [`TableBuilder`].
pub struct RelationBuilder<'a> {
    relation: &'a mut Relation,
}

impl RelationBuilder<'_> {
    /// Columns that reference the declaring model: on the related table for has-one and
    /// has-many, on the join table for many-to-many.
    pub fn base_fk<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relation.base_fk = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Columns that reference the related model: on the declaring table for belongs-to,
    /// on the join table for many-to-many.
    pub fn join_fk<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relation.join_fk = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Join table of a many-to-many relation.
    pub fn m2m_table(self, table: impl Into<String>) -> Self {
        self.relation.m2m_table = Some(table.into());
        self
    }
}
