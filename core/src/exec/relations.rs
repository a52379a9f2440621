//! Eager loading of declared relations.
//!
//! After the primary rows are decoded, every requested relation is fetched with one query
//! keyed by the distinct key values of the loaded records, then matched back by key. Nested
//! paths (`"posts.comments"`) recurse into the freshly loaded records.

use std::any::Any;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use hashbrown::{HashMap, HashSet};

use super::{Context, Db};
use crate::error::{RelataError, Result};
use crate::query::{ApplyFn, Arg, Fragment, Query, RelationRequest};
use crate::row::{ColumnInfo, RowSink, decode_value};
use crate::schema::{RelationKeys, TableModel};
use crate::value::Value;

const KEY_PREFIX: &str = "__rel_key_";
const M2M_ALIAS: &str = "_m2m";

/// Records of one model plus, for many-to-many loads, the join-table keys of each row.
struct Loaded<'a> {
    model: &'a TableModel,
    rows: Vec<(Box<dyn Any + Send>, Vec<Value>)>,
    staged: Option<(Box<dyn Any + Send>, Vec<Value>)>,
}

impl RowSink for Loaded<'_> {
    fn begin_row(&mut self) -> Result<()> {
        self.staged = Some((self.model.new_record(), Vec::new()));
        Ok(())
    }

    fn scan_column(&mut self, col: &ColumnInfo, raw: Option<&[u8]>) -> Result<()> {
        let (record, keys) = self
            .staged
            .as_mut()
            .ok_or_else(|| RelataError::Build("scan_column without begin_row".into()))?;
        if col.name.starts_with(KEY_PREFIX) {
            keys.push(decode_value(col, raw)?);
            return Ok(());
        }
        self.model.scan_column(&mut **record, col, raw)
    }

    fn end_row(&mut self) -> Result<()> {
        let staged = self
            .staged
            .take()
            .ok_or_else(|| RelataError::Build("end_row without begin_row".into()))?;
        self.rows.push(staged);
        Ok(())
    }

    fn discard_row(&mut self) {
        self.staged = None;
    }
}

/// Joins key values into a lookup string; `None` when any part is NULL.
fn key_of(values: &[Value]) -> Option<String> {
    if values.iter().any(Value::is_null) {
        return None;
    }
    Some(
        values
            .iter()
            .map(Value::key_text)
            .collect::<Vec<_>>()
            .join("\u{1f}"),
    )
}

/// Requests grouped by their first path segment.
struct Head {
    name: String,
    apply: Option<ApplyFn>,
    nested: Vec<RelationRequest>,
}

fn group_requests(requests: &[RelationRequest]) -> Vec<Head> {
    let mut heads: Vec<Head> = Vec::new();
    for request in requests {
        let (name, rest) = match request.path.split_once('.') {
            Some((name, rest)) => (name, Some(rest)),
            None => (request.path.as_str(), None),
        };
        let idx = match heads.iter().position(|head| head.name == name) {
            Some(idx) => idx,
            None => {
                heads.push(Head {
                    name: name.to_owned(),
                    apply: None,
                    nested: Vec::new(),
                });
                heads.len() - 1
            }
        };
        let head = &mut heads[idx];
        match rest {
            Some(rest) => head.nested.push(RelationRequest {
                path: rest.to_owned(),
                apply: request.apply.clone(),
            }),
            None => {
                if request.apply.is_some() {
                    head.apply = request.apply.clone();
                }
            }
        }
    }
    heads
}

fn qualified(alias: &str, column: &str) -> Arg {
    Arg::ident(format!("{alias}.{column}"))
}

/// `"a"."x" IN (...)` or `("a"."x", "a"."y") IN ((...), ...)`.
fn key_filter(columns: Vec<Arg>, keys: Vec<Vec<Value>>) -> Fragment {
    if columns.len() == 1 {
        let values = keys.into_iter().flatten().collect();
        let mut args = columns;
        args.push(Arg::In(values));
        return Fragment::new("? IN (?)", args);
    }
    let lhs = vec!["?"; columns.len()].join(", ");
    let mut args = columns;
    args.push(Arg::InMulti(keys));
    Fragment::new(format!("({lhs}) IN (?)"), args)
}

/// Builds the secondary query for one relation.
fn relation_query(
    db: &Db,
    ctx: &Context,
    join: &Arc<TableModel>,
    keys: &RelationKeys,
    values: Vec<Vec<Value>>,
) -> Query {
    let query = Query::new()
        .db(db.clone())
        .context(ctx.clone())
        .for_table_model(Arc::clone(join));

    let Some(m2m) = &keys.m2m else {
        let columns = keys
            .join
            .iter()
            .map(|idx| qualified(&join.alias, &join.columns[*idx].name))
            .collect();
        let filter = key_filter(columns, values);
        return query.push_where_fragment(filter);
    };

    let mut on = Vec::with_capacity(m2m.join_fk.len());
    let mut args = vec![Arg::ident(m2m.table.clone()), Arg::ident(M2M_ALIAS)];
    for (fk, pk) in m2m.join_fk.iter().zip(&keys.join) {
        on.push("? = ?");
        args.push(qualified(M2M_ALIAS, fk));
        args.push(qualified(&join.alias, &join.columns[*pk].name));
    }
    let mut query = query
        .join(format!("JOIN ? AS ? ON {}", on.join(" AND ")), args)
        .column_expr("?TableColumns", ());
    for (i, fk) in m2m.base_fk.iter().enumerate() {
        query = query.column_expr(
            "? AS ?",
            [qualified(M2M_ALIAS, fk), Arg::ident(format!("{KEY_PREFIX}{i}"))],
        );
    }
    let columns = m2m
        .base_fk
        .iter()
        .map(|fk| qualified(M2M_ALIAS, fk))
        .collect();
    query.push_where_fragment(key_filter(columns, values))
}

/// Loads `requests` into `records`, which must all be records of `model`.
pub(crate) fn load_relations<'a>(
    db: &'a Db,
    ctx: &'a Context,
    model: &'a TableModel,
    records: &'a mut [&mut (dyn Any + Send)],
    requests: &'a [RelationRequest],
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        for head in group_requests(requests) {
            let relation = model.relation(&head.name).ok_or_else(|| {
                RelataError::Schema(format!(
                    "{} has no relation {:?}",
                    model.type_name(),
                    head.name
                ))
            })?;
            let join = relation.join_model()?;
            let keys = relation.keys(model, &join)?;

            let mut record_keys: Vec<Option<String>> = Vec::with_capacity(records.len());
            let mut distinct: Vec<Vec<Value>> = Vec::new();
            let mut seen: HashSet<String> = HashSet::new();
            for record in records.iter() {
                let values = model.values(&**record, &keys.base)?;
                let key = key_of(&values);
                if let Some(key) = &key
                    && seen.insert(key.clone())
                {
                    distinct.push(values);
                }
                record_keys.push(key);
            }

            crate::relata_trace_relation!(relation.name(), distinct.len());
            let mut loaded = Loaded {
                model: &join,
                rows: Vec::new(),
                staged: None,
            };
            if !distinct.is_empty() {
                let mut query = relation_query(db, ctx, &join, &keys, distinct);
                if let Some(apply) = &head.apply {
                    query = apply(query)?;
                }
                let sql = query.select_sql()?;
                db.run_query(ctx, &sql, &mut loaded).await?;
            }
            let mut rows = loaded.rows;

            if !head.nested.is_empty() && !rows.is_empty() {
                let mut nested: Vec<&mut (dyn Any + Send)> =
                    rows.iter_mut().map(|(record, _)| &mut **record).collect();
                load_relations(db, ctx, &join, &mut nested, &head.nested).await?;
            }

            let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
            for (idx, (record, m2m_keys)) in rows.iter().enumerate() {
                let key = if keys.m2m.is_some() {
                    key_of(m2m_keys)
                } else {
                    key_of(&join.values(&**record, &keys.join)?)
                };
                if let Some(key) = key {
                    by_key.entry(key).or_default().push(idx);
                }
            }

            for (record, key) in records.iter_mut().zip(record_keys) {
                let matches = key
                    .and_then(|key| by_key.get(&key))
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let related = matches
                    .iter()
                    .map(|idx| join.clone_record(&*rows[*idx].0))
                    .collect::<Result<Vec<_>>>()?;
                let owner: &mut dyn Any = &mut **record;
                (relation.assign)(owner, related)?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_paths_group_under_their_head() {
        let requests = vec![
            RelationRequest {
                path: "posts.comments".into(),
                apply: None,
            },
            RelationRequest {
                path: "author".into(),
                apply: None,
            },
            RelationRequest {
                path: "posts".into(),
                apply: Some(Arc::new(|q: Query| Ok(q.limit(1)))),
            },
        ];
        let heads = group_requests(&requests);
        assert_eq!(heads.len(), 2);
        assert_eq!(heads[0].name, "posts");
        assert!(heads[0].apply.is_some());
        assert_eq!(heads[0].nested.len(), 1);
        assert_eq!(heads[0].nested[0].path, "comments");
        assert_eq!(heads[1].name, "author");
    }

    #[test]
    fn null_keys_never_match() {
        assert_eq!(
            key_of(&[Value::BigInt(1), Value::Text("a".into())]).as_deref(),
            Some("1\u{1f}a")
        );
        assert_eq!(key_of(&[Value::Null]), None);
        assert_eq!(key_of(&[Value::Integer(5)]), key_of(&[Value::BigInt(5)]));
    }
}
