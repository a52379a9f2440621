//! Core of relata: model metadata, the query builder, SQL rendering and execution over a
//! pluggable [`Backend`].

mod trace;

pub mod dialect;
pub mod error;
pub mod exec;
pub mod query;
pub mod row;
pub mod schema;
pub mod sql;
pub mod value;

pub use error::{BackendError, RelataError, Result};
pub use exec::{
    Backend, CancelHandle, Context, CopyFormat, CopyRowCounter, Db, QueryResult, RowStream,
};
pub use query::{Arg, CreateTableOptions, DropTableOptions, Fragment, IntoArgs, Query};
pub use row::{ColumnInfo, ColumnScanner, Discard, Format, Row, RowFn, RowSink, Scalars, Type};
pub use schema::{
    Column, ColumnBuilder, Model, Registry, Relation, RelationBuilder, RelationKind,
    RelationSlot, TableBuilder, TableModel, resolve,
};
pub use sql::{SQL, SQLChunk};
pub use rust_decimal::Decimal;
pub use value::{ColumnType, FromValue, Json, ToValue, Value};
