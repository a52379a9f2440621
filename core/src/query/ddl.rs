//! CREATE/DROP rendering for model tables and composite types.

use super::Query;
use crate::error::Result;
use crate::exec::QueryResult;
use crate::schema::{RelationKind, TableModel};
use crate::sql::SQL;

/// Options for [`Query::create_table`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateTableOptions {
    pub temp: bool,
    pub if_not_exists: bool,
    /// Emit FOREIGN KEY constraints for belongs-to relations
    pub fk_constraints: bool,
}

/// Options for [`Query::drop_table`] and [`Query::drop_composite`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DropTableOptions {
    pub if_exists: bool,
    pub cascade: bool,
}

fn column_list<'a>(names: impl Iterator<Item = &'a str>) -> SQL {
    SQL::join(names.map(|name| SQL::ident(name.to_owned())), ", ").parens()
}

fn serial_type(sql_type: &str) -> Option<&'static str> {
    match sql_type {
        "smallint" => Some("smallserial"),
        "integer" => Some("serial"),
        "bigint" => Some("bigserial"),
        _ => None,
    }
}

fn foreign_keys(model: &TableModel, out: &mut SQL) -> Result<()> {
    for relation in model
        .relations()
        .iter()
        .filter(|r| r.kind() == RelationKind::BelongsTo)
    {
        let join = relation.join_model()?;
        let keys = relation.keys(model, &join)?;
        out.push_raw(", FOREIGN KEY ");
        out.append_mut(column_list(
            keys.base.iter().map(|idx| model.columns[*idx].name.as_str()),
        ));
        out.push_raw(" REFERENCES ");
        out.push_ident(join.name.clone());
        out.push_raw(" ");
        out.append_mut(column_list(
            keys.join.iter().map(|idx| join.columns[*idx].name.as_str()),
        ));
    }
    Ok(())
}

fn drop_suffix(opts: DropTableOptions, out: &mut SQL) {
    if opts.cascade {
        out.push_raw(" CASCADE");
    }
}

impl Query {
    pub fn create_table_sql(&self, opts: CreateTableOptions) -> Result<SQL> {
        self.check()?;
        let model = self.require_model()?;
        let mut out = SQL::raw("CREATE ");
        if opts.temp {
            out.push_raw("TEMP ");
        }
        out.push_raw("TABLE ");
        if opts.if_not_exists {
            out.push_raw("IF NOT EXISTS ");
        }
        out.push_ident(model.name.clone());
        out.push_raw(" (");

        let single_pk = model.pk_indexes().len() == 1;
        for (i, column) in model.columns().iter().enumerate() {
            if i > 0 {
                out.push_raw(", ");
            }
            out.push_ident(column.name.clone());
            let serial = if single_pk && column.primary_key {
                serial_type(column.sql_type)
            } else {
                None
            };
            out.push_raw(format!(" {}", serial.unwrap_or(column.sql_type)));
            if !column.nullable && !column.primary_key {
                out.push_raw(" NOT NULL");
            }
        }
        if !model.pk_indexes().is_empty() {
            out.push_raw(", PRIMARY KEY ");
            out.append_mut(column_list(
                model.primary_keys().map(|column| column.name.as_str()),
            ));
        }
        if opts.fk_constraints {
            foreign_keys(model, &mut out)?;
        }
        out.push_raw(")");
        Ok(out)
    }

    pub fn drop_table_sql(&self, opts: DropTableOptions) -> Result<SQL> {
        self.check()?;
        let model = self.require_model()?;
        let mut out = SQL::raw("DROP TABLE ");
        if opts.if_exists {
            out.push_raw("IF EXISTS ");
        }
        out.push_ident(model.name.clone());
        drop_suffix(opts, &mut out);
        Ok(out)
    }

    /// `CREATE TYPE "alias" AS (...)` over the model columns.
    pub fn create_composite_sql(&self) -> Result<SQL> {
        self.check()?;
        let model = self.require_model()?;
        let mut out = SQL::raw("CREATE TYPE ");
        out.push_ident(model.alias.clone());
        out.push_raw(" AS (");
        for (i, column) in model.columns().iter().enumerate() {
            if i > 0 {
                out.push_raw(", ");
            }
            out.push_ident(column.name.clone());
            out.push_raw(format!(" {}", column.sql_type));
        }
        out.push_raw(")");
        Ok(out)
    }

    pub fn drop_composite_sql(&self, opts: DropTableOptions) -> Result<SQL> {
        self.check()?;
        let model = self.require_model()?;
        let mut out = SQL::raw("DROP TYPE ");
        if opts.if_exists {
            out.push_raw("IF EXISTS ");
        }
        out.push_ident(model.alias.clone());
        drop_suffix(opts, &mut out);
        Ok(out)
    }

    pub async fn create_table(self, opts: CreateTableOptions) -> Result<QueryResult> {
        let sql = self.create_table_sql(opts)?;
        self.run_statement(&sql).await
    }

    pub async fn drop_table(self, opts: DropTableOptions) -> Result<QueryResult> {
        let sql = self.drop_table_sql(opts)?;
        self.run_statement(&sql).await
    }

    pub async fn create_composite(self) -> Result<QueryResult> {
        let sql = self.create_composite_sql()?;
        self.run_statement(&sql).await
    }

    pub async fn drop_composite(self, opts: DropTableOptions) -> Result<QueryResult> {
        let sql = self.drop_composite_sql(opts)?;
        self.run_statement(&sql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Model, TableBuilder};
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, Default)]
    struct Writer {
        id: i32,
        name: String,
        bio: Option<String>,
    }

    impl Model for Writer {
        fn describe(t: &mut TableBuilder<Self>) {
            t.column("id", |w| &w.id, |w| &mut w.id).pk();
            t.column("name", |w| &w.name, |w| &mut w.name);
            t.column("bio", |w| &w.bio, |w| &mut w.bio);
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Essay {
        id: i64,
        writer_id: i32,
        writer: Option<Writer>,
    }

    impl Model for Essay {
        fn describe(t: &mut TableBuilder<Self>) {
            t.column("id", |e| &e.id, |e| &mut e.id).pk();
            t.column("writer_id", |e| &e.writer_id, |e| &mut e.writer_id);
            t.belongs_to("writer", |e| &mut e.writer);
        }
    }

    #[test]
    fn create_table_with_serial_key_and_foreign_keys() {
        let sql = Query::new()
            .model::<Essay>()
            .create_table_sql(CreateTableOptions {
                if_not_exists: true,
                fk_constraints: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            sql.sql(),
            r#"CREATE TABLE IF NOT EXISTS "essays" ("id" bigserial, "writer_id" integer NOT NULL, PRIMARY KEY ("id"), FOREIGN KEY ("writer_id") REFERENCES "writers" ("id"))"#
        );
    }

    #[test]
    fn composite_and_drop_statements() {
        let query = Query::new().model::<Writer>();
        assert_eq!(
            query.create_composite_sql().unwrap().sql(),
            r#"CREATE TYPE "writer" AS ("id" integer, "name" text, "bio" text)"#
        );
        let opts = DropTableOptions {
            if_exists: true,
            cascade: true,
        };
        assert_eq!(
            query.drop_table_sql(opts).unwrap().sql(),
            r#"DROP TABLE IF EXISTS "writers" CASCADE"#
        );
        assert_eq!(
            query.drop_composite_sql(opts).unwrap().sql(),
            r#"DROP TYPE IF EXISTS "writer" CASCADE"#
        );
    }
}
