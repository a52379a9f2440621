use std::any::Any;
use std::fmt;
use std::sync::Arc;

use heck::ToSnakeCase;

use super::{Model, TableModel};
use crate::error::{RelataError, Result};

/// How two tables are associated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// The related table holds a foreign key to this one; at most one match.
    HasOne,
    /// This table holds a foreign key to the related one.
    BelongsTo,
    /// The related table holds a foreign key to this one; any number of matches.
    HasMany,
    /// Association through a join table holding keys of both sides.
    ManyToMany,
}

/// A field that receives eagerly loaded records.
pub trait RelationSlot: Send + Sync + 'static {
    type Target: Model;

    fn assign(&mut self, records: Vec<Self::Target>);
}

impl<J: Model> RelationSlot for Option<J> {
    type Target = J;

    fn assign(&mut self, records: Vec<J>) {
        *self = records.into_iter().next();
    }
}

impl<J: Model> RelationSlot for Vec<J> {
    type Target = J;

    fn assign(&mut self, records: Vec<J>) {
        *self = records;
    }
}

pub(crate) type Assigner =
    Arc<dyn Fn(&mut dyn Any, Vec<Box<dyn Any + Send>>) -> Result<()> + Send + Sync>;

/// A declared association. Read-only after derivation.
#[derive(Clone)]
pub struct Relation {
    pub(crate) name: String,
    pub(crate) kind: RelationKind,
    pub(crate) join_type: &'static str,
    pub(crate) join: fn() -> Result<Arc<TableModel>>,
    /// Columns referencing the base model (on the related or m2m table)
    pub(crate) base_fk: Vec<String>,
    /// Columns referencing the related model (on the base or m2m table)
    pub(crate) join_fk: Vec<String>,
    pub(crate) m2m_table: Option<String>,
    pub(crate) assign: Assigner,
}

/// Key columns of a relation, resolved against both models.
#[derive(Debug, Clone)]
pub(crate) struct RelationKeys {
    /// Column indexes on the base model whose values select related rows
    pub base: Vec<usize>,
    /// Column indexes on the related model matched against `base`, unless many-to-many
    pub join: Vec<usize>,
    pub m2m: Option<M2mKeys>,
}

#[derive(Debug, Clone)]
pub(crate) struct M2mKeys {
    pub table: String,
    /// m2m columns matching the base model keys
    pub base_fk: Vec<String>,
    /// m2m columns matching the related model keys
    pub join_fk: Vec<String>,
}

impl Relation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Resolves the related model.
    pub fn join_model(&self) -> Result<Arc<TableModel>> {
        (self.join)()
    }

    pub(crate) fn keys(&self, base: &TableModel, join: &TableModel) -> Result<RelationKeys> {
        let default_fks = |owner: &TableModel, prefix: &str| -> Vec<String> {
            owner
                .primary_keys()
                .map(|pk| format!("{prefix}_{}", pk.name))
                .collect()
        };
        let lookup = |model: &TableModel, names: &[String]| -> Result<Vec<usize>> {
            names
                .iter()
                .map(|name| {
                    model.column_index(name).ok_or_else(|| {
                        RelataError::Schema(format!(
                            "relation {:?} on {}: {} has no column {name:?}",
                            self.name, base.type_name, model.type_name
                        ))
                    })
                })
                .collect()
        };

        let keys = match self.kind {
            RelationKind::BelongsTo => {
                let fks = if self.join_fk.is_empty() {
                    default_fks(join, &self.name.to_snake_case())
                } else {
                    self.join_fk.clone()
                };
                RelationKeys {
                    base: lookup(base, &fks)?,
                    join: join.require_pk()?.to_vec(),
                    m2m: None,
                }
            }
            RelationKind::HasOne | RelationKind::HasMany => {
                let fks = if self.base_fk.is_empty() {
                    default_fks(base, &base.alias)
                } else {
                    self.base_fk.clone()
                };
                RelationKeys {
                    base: base.require_pk()?.to_vec(),
                    join: lookup(join, &fks)?,
                    m2m: None,
                }
            }
            RelationKind::ManyToMany => {
                let table = self.m2m_table.clone().ok_or_else(|| {
                    RelataError::Schema(format!(
                        "many-to-many relation {:?} on {} needs an m2m table",
                        self.name, base.type_name
                    ))
                })?;
                let base_fk = if self.base_fk.is_empty() {
                    default_fks(base, &base.alias)
                } else {
                    self.base_fk.clone()
                };
                let join_fk = if self.join_fk.is_empty() {
                    default_fks(join, &join.alias)
                } else {
                    self.join_fk.clone()
                };
                let base_pks = base.require_pk()?.to_vec();
                let join_pks = join.require_pk()?.to_vec();
                if base_fk.len() != base_pks.len() || join_fk.len() != join_pks.len() {
                    return Err(self.count_mismatch(base));
                }
                RelationKeys {
                    base: base_pks,
                    join: join_pks,
                    m2m: Some(M2mKeys {
                        table,
                        base_fk,
                        join_fk,
                    }),
                }
            }
        };

        if keys.base.len() != keys.join.len() || keys.base.is_empty() {
            return Err(self.count_mismatch(base));
        }
        Ok(keys)
    }

    fn count_mismatch(&self, base: &TableModel) -> RelataError {
        RelataError::Schema(format!(
            "relation {:?} on {}: key column counts do not match",
            self.name, base.type_name
        ))
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("join_type", &self.join_type)
            .field("base_fk", &self.base_fk)
            .field("join_fk", &self.join_fk)
            .field("m2m_table", &self.m2m_table)
            .finish()
    }
}
