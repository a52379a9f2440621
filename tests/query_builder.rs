mod common;

use common::{Comment, Post, User};
use pretty_assertions::assert_eq;
use relata::{Arg, CreateTableOptions, DropTableOptions, Query, RelataError, Value};

const USER_SELECT: &str = r#"SELECT "user"."id", "user"."name", "user"."email" FROM "users" AS "user""#;

#[test]
fn clones_do_not_share_state() {
    let base = Query::new().model::<User>().where_("name = ?", ["alice"]);
    let narrowed = base.clone().where_("id > ?", [10]);
    let ordered = base.clone().order("id DESC").limit(2);

    assert_eq!(
        base.select_sql().unwrap().sql(),
        format!("{USER_SELECT} WHERE (name = $1)")
    );
    assert_eq!(
        narrowed.select_sql().unwrap().sql(),
        format!("{USER_SELECT} WHERE (name = $1) AND (id > $2)")
    );
    assert_eq!(
        ordered.select_sql().unwrap().sql(),
        format!(r#"{USER_SELECT} WHERE (name = $1) ORDER BY "id" DESC LIMIT 2"#)
    );
}

#[test]
fn nested_groups_parenthesize_each_level() {
    let query = Query::new()
        .model::<User>()
        .where_("a = ?", [1])
        .where_group(|q| {
            Ok(q.where_("b = ?", [2]).where_or_group(|q| {
                Ok(q.where_("c = ?", [3]).where_not_group(|q| {
                    Ok(q.where_("d = ?", [4]).where_or("e = ?", [5]))
                }))
            }))
        });
    let (sql, params) = query.select_sql().unwrap().build();
    assert_eq!(
        sql,
        format!(
            "{USER_SELECT} WHERE (a = $1) AND ((b = $2) OR ((c = $3) AND NOT ((d = $4) OR (e = $5))))"
        )
    );
    assert_eq!(
        params,
        vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
            Value::Integer(4),
            Value::Integer(5)
        ]
    );
}

#[test]
fn empty_groups_render_nothing() {
    let query = Query::new()
        .model::<User>()
        .where_group(Ok)
        .where_("id = ?", [1]);
    assert_eq!(
        query.select_sql().unwrap().sql(),
        format!("{USER_SELECT} WHERE (id = $1)")
    );
}

#[test]
fn in_lists_expand_to_parameters() {
    let query = Query::new()
        .model::<User>()
        .where_in("id IN (?)", [1i64, 2, 3])
        .where_in_multi("(id, name) IN (?)", vec![vec![Value::BigInt(1), Value::from("a")]]);
    assert_eq!(
        query.select_sql().unwrap().sql(),
        format!("{USER_SELECT} WHERE (id IN ($1, $2, $3)) AND ((id, name) IN (($4, $5)))")
    );

    let empty: [i64; 0] = [];
    let query = Query::new().table("users").where_in("id IN (?)", empty);
    assert_eq!(
        query.select_sql().unwrap().sql(),
        r#"SELECT * FROM "users" WHERE (id IN (NULL))"#
    );
}

#[test]
fn placeholders_resolve_identifiers_indexes_and_model_names() {
    let query = Query::new()
        .model::<User>()
        .column_expr("?TableAlias.?0, ?1", [Arg::ident("name"), Arg::safe("now()")])
        .where_("? = ?0 OR ? \\? 'x'", [Arg::ident("name"), "bob".into()]);
    assert_eq!(
        query.select_sql().unwrap().sql(),
        r#"SELECT "user"."name", now() FROM "users" AS "user" WHERE ("name" = "name" OR $1 ? 'x')"#
    );
}

#[test]
fn placeholder_errors_are_build_errors() {
    let out_of_range = Query::new().table("t").where_("a = ?3", [1]);
    assert!(matches!(out_of_range.select_sql(), Err(RelataError::Build(_))));

    let unknown = Query::new().model::<User>().where_("?Nope = 1", ());
    assert!(matches!(unknown.select_sql(), Err(RelataError::Build(_))));

    let join_on_without_join = Query::new().table("t").join_on("a = b", ());
    assert!(matches!(
        join_on_without_join.select_sql(),
        Err(RelataError::Build(_))
    ));
}

#[test]
fn subqueries_merge_their_parameters() {
    let recent = Query::new()
        .model::<Post>()
        .column("user_id")
        .where_("title LIKE ?", ["a%"]);
    let query = Query::new()
        .model::<User>()
        .where_("name <> ?", ["x"])
        .where_("id IN (?)", [Arg::from(recent)]);
    let (sql, params) = query.select_sql().unwrap().build();
    assert_eq!(
        sql,
        format!(
            r#"{USER_SELECT} WHERE (name <> $1) AND (id IN (SELECT "post"."user_id" FROM "posts" AS "post" WHERE (title LIKE $2)))"#
        )
    );
    assert_eq!(params, vec![Value::from("x"), Value::from("a%")]);
}

#[test]
fn ctes_and_wrapping() {
    let active = Query::new()
        .table("users")
        .column("id")
        .where_("active", ());
    let query = Query::new()
        .with("active_users", active)
        .table("active_users")
        .column("id");
    assert_eq!(
        query.select_sql().unwrap().sql(),
        r#"WITH "active_users" AS (SELECT "id" FROM "users" WHERE (active)) SELECT "id" FROM "active_users""#
    );

    let wrapped = Query::new()
        .model::<User>()
        .where_("id > ?", [5])
        .wrap_with("inner_users")
        .table("inner_users");
    assert_eq!(
        wrapped.select_sql().unwrap().sql(),
        format!(
            r#"WITH "inner_users" AS ({USER_SELECT} WHERE (id > $1)) SELECT "user"."id", "user"."name", "user"."email" FROM "users" AS "user", "inner_users""#
        )
    );
}

#[test]
fn excluded_columns_are_left_out() {
    let query = Query::new().model::<User>().exclude_column("email");
    assert_eq!(
        query.select_sql().unwrap().sql(),
        r#"SELECT "user"."id", "user"."name" FROM "users" AS "user""#
    );

    let unknown = Query::new().model::<User>().exclude_column("nope");
    assert!(matches!(unknown.select_sql(), Err(RelataError::Build(_))));
}

#[test]
fn soft_delete_models_filter_reads() {
    let base = Query::new().model::<Comment>();
    let columns = r#"SELECT "comment"."id", "comment"."body", "comment"."deleted_at" FROM "comments" AS "comment""#;
    assert_eq!(
        base.select_sql().unwrap().sql(),
        format!(r#"{columns} WHERE "comment"."deleted_at" IS NULL"#)
    );
    assert_eq!(
        base.clone().deleted().select_sql().unwrap().sql(),
        format!(r#"{columns} WHERE "comment"."deleted_at" IS NOT NULL"#)
    );
    assert_eq!(
        base.clone().all_with_deleted().select_sql().unwrap().sql(),
        columns
    );
    assert_eq!(
        base.where_("id = ?", [1])
            .where_or("id = ?", [2])
            .select_sql()
            .unwrap()
            .sql(),
        format!(r#"{columns} WHERE ((id = $1) OR (id = $2)) AND "comment"."deleted_at" IS NULL"#)
    );

    assert!(matches!(
        Query::new().model::<User>().deleted().select_sql(),
        Err(RelataError::Schema(_))
    ));
}

#[test]
fn deferred_errors_surface_at_render() {
    let query = Query::new()
        .model::<User>()
        .apply(|_| Err(RelataError::Build("scope failed".into())))
        .where_("id = ?", [1]);
    assert!(matches!(query.select_sql(), Err(RelataError::Build(ref m)) if m == "scope failed"));
    assert!(query.to_string().starts_with('<'));
}

#[test]
fn display_inlines_parameters() {
    let query = Query::new()
        .table("users")
        .where_("name = ?", ["o'neil"])
        .where_("age > ?", [30]);
    assert_eq!(
        query.to_string(),
        r#"SELECT * FROM "users" WHERE (name = 'o''neil') AND (age > 30)"#
    );
}

#[test]
fn ddl_statements() {
    let create = Query::new()
        .model::<Post>()
        .create_table_sql(CreateTableOptions {
            if_not_exists: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(
        create.sql(),
        r#"CREATE TABLE IF NOT EXISTS "posts" ("id" bigserial, "user_id" bigint NOT NULL, "title" text NOT NULL, PRIMARY KEY ("id"))"#
    );

    let drop = Query::new()
        .model::<Post>()
        .drop_table_sql(DropTableOptions {
            if_exists: true,
            cascade: true,
        })
        .unwrap();
    assert_eq!(drop.sql(), r#"DROP TABLE IF EXISTS "posts" CASCADE"#);
}
