mod common;

use chrono::{DateTime, TimeZone, Utc};
use common::{MockBackend, Reply, rows};
use pretty_assertions::assert_eq;
use relata::{Decimal, Json, Model, RelataError, TableBuilder, Type, Value};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Meta {
    unit: String,
    scale: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Reading {
    id: i64,
    level: i16,
    ratio: f64,
    active: bool,
    labels: Vec<String>,
    meta: Json<Meta>,
    taken_at: DateTime<Utc>,
    source: Uuid,
    note: Option<String>,
}

impl Model for Reading {
    fn describe(t: &mut TableBuilder<Self>) {
        t.column("id", |r| &r.id, |r| &mut r.id).pk();
        t.column("level", |r| &r.level, |r| &mut r.level);
        t.column("ratio", |r| &r.ratio, |r| &mut r.ratio);
        t.column("active", |r| &r.active, |r| &mut r.active);
        t.column("labels", |r| &r.labels, |r| &mut r.labels);
        t.column("meta", |r| &r.meta, |r| &mut r.meta);
        t.column("taken_at", |r| &r.taken_at, |r| &mut r.taken_at);
        t.column("source", |r| &r.source, |r| &mut r.source);
        t.column("note", |r| &r.note, |r| &mut r.note);
    }
}

const SOURCE: &str = "67e55044-10b1-426f-9247-bb680e5fe0c8";

fn reading_columns() -> Vec<(&'static str, Type)> {
    vec![
        ("id", Type::INT8),
        ("level", Type::INT2),
        ("ratio", Type::FLOAT8),
        ("active", Type::BOOL),
        ("labels", Type::TEXT_ARRAY),
        ("meta", Type::JSONB),
        ("taken_at", Type::TIMESTAMPTZ),
        ("source", Type::UUID),
        ("note", Type::TEXT),
    ]
}

#[tokio::test]
async fn model_columns_decode_from_text_rows() {
    let data = rows(
        &reading_columns(),
        &[&[
            Some("1"),
            Some("7"),
            Some("0.25"),
            Some("t"),
            Some(r#"{a,"b c"}"#),
            Some(r#"{"unit": "cm", "scale": 2}"#),
            Some("2024-05-06 07:08:09+00"),
            Some(SOURCE),
            None,
        ]],
    );
    let (db, _) = MockBackend::new().on("FROM", Reply::rows(data)).into_db();

    let mut readings: Vec<Reading> = Vec::new();
    db.model::<Reading>().select(&mut readings).await.unwrap();

    assert_eq!(
        readings,
        vec![Reading {
            id: 1,
            level: 7,
            ratio: 0.25,
            active: true,
            labels: vec!["a".into(), "b c".into()],
            meta: Json(Meta {
                unit: "cm".into(),
                scale: 2,
            }),
            taken_at: Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
            source: Uuid::parse_str(SOURCE).unwrap(),
            note: None,
        }]
    );
}

#[test]
fn narrowing_checks_range() {
    let row = &rows(&[("n", Type::INT8)], &[&[Some("70000")]])[0];
    assert_eq!(row.get::<i32>(0).unwrap(), 70000);
    assert_eq!(row.get::<i64>(0).unwrap(), 70000);

    let err = row.get::<i16>(0).unwrap_err();
    assert!(matches!(err, RelataError::Conversion { ref column, .. } if column == "n"));
}

#[test]
fn fractions_do_not_become_integers() {
    let row = &rows(&[("f", Type::FLOAT8)], &[&[Some("1.5")]])[0];
    assert_eq!(row.get::<f64>(0).unwrap(), 1.5);
    assert!(matches!(
        row.get::<i64>(0),
        Err(RelataError::Conversion { .. })
    ));
}

#[test]
fn null_needs_an_option() {
    let row = &rows(&[("email", Type::TEXT)], &[&[None]])[0];
    assert_eq!(row.get::<Option<String>>(0).unwrap(), None);
    assert_eq!(row.get::<Value>(0).unwrap(), Value::Null);

    let err = row.get::<String>(0).unwrap_err();
    assert!(matches!(err, RelataError::Nullability { ref column } if column == "email"));
}

#[test]
fn arrays_and_json_documents() {
    let row = &rows(
        &[("ids", Type::INT4_ARRAY), ("doc", Type::JSONB)],
        &[&[Some("{1,2,3}"), Some(r#"{"unit": "m", "scale": 10}"#)]],
    )[0];
    assert_eq!(row.get::<Vec<i32>>(0).unwrap(), vec![1, 2, 3]);
    assert_eq!(
        row.get::<Json<Meta>>(1).unwrap().into_inner(),
        Meta {
            unit: "m".into(),
            scale: 10,
        }
    );

    let bad = &rows(&[("doc", Type::JSONB)], &[&[Some(r#"{"unit": 5}"#)]])[0];
    assert!(matches!(
        bad.get::<Json<Meta>>(0),
        Err(RelataError::Conversion { .. })
    ));
}

#[test]
fn missing_columns_are_build_errors() {
    let row = &rows(&[("id", Type::INT8)], &[&[Some("1")]])[0];
    assert!(matches!(row.get::<i64>(3), Err(RelataError::Build(_))));
}

#[test]
fn numerics_decode_exactly() {
    let row = &rows(
        &[("price", Type::NUMERIC), ("qty", Type::INT4)],
        &[&[Some("19.990"), Some("3")]],
    )[0];
    let price = row.get::<Decimal>(0).unwrap();
    assert_eq!(price.to_string(), "19.990");
    assert_eq!(row.get::<Decimal>(1).unwrap(), Decimal::from(3));
    assert!(row.get::<i64>(0).is_err());
}
