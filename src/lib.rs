//! # relata
//!
//! A model-driven query builder and ORM for PostgreSQL.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relata::prelude::*;
//!
//! #[derive(Debug, Clone, Default)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Model for User {
//!     fn describe(t: &mut TableBuilder<Self>) {
//!         t.column("id", |u| &u.id, |u| &mut u.id).pk();
//!         t.column("name", |u| &u.name, |u| &mut u.name);
//!     }
//! }
//!
//! # async fn run() -> relata::Result<()> {
//! let db = Db::new(relata::postgres::PgBackend::connect("host=localhost").await?);
//!
//! let mut user = User { name: "alice".into(), ..Default::default() };
//! db.model::<User>().insert(&mut user).await?;
//!
//! let mut users = Vec::new();
//! db.model::<User>()
//!     .where_("? LIKE ?", [Arg::ident("name"), "a%".into()])
//!     .order("id DESC")
//!     .limit(10)
//!     .select(&mut users)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! | Database   | Driver         | Feature Flag     |
//! |------------|----------------|------------------|
//! | PostgreSQL | tokio-postgres | `tokio-postgres` |
//!
//! Any other connection can be plugged in by implementing [`Backend`].

// =============================================================================
// Root-level exports
// =============================================================================

pub use relata_core::{
    Arg, Backend, BackendError, CancelHandle, Column, ColumnBuilder, ColumnInfo, ColumnScanner,
    ColumnType, Context, CopyFormat, CopyRowCounter, CreateTableOptions, Db, Decimal, Discard,
    DropTableOptions, Format, Fragment, FromValue, IntoArgs, Json, Model, Query, QueryResult,
    Registry, Relation, RelationBuilder, RelationKind, RelationSlot, RelataError, Result, Row,
    RowFn, RowSink, RowStream, SQL, SQLChunk, Scalars, TableBuilder, TableModel, ToValue, Type,
    Value, resolve,
};

/// Identifier and literal quoting.
pub use relata_core::dialect;

/// Error types
pub mod error {
    pub use relata_core::error::{BackendError, RelataError, Result};
}

// =============================================================================
// PostgreSQL drivers
// =============================================================================

/// The `tokio-postgres` backend.
#[cfg(feature = "tokio-postgres")]
pub mod postgres {
    pub use relata_postgres::PgBackend;
}

/// Everything needed to declare models and run queries.
pub mod prelude {
    pub use relata_core::{
        Arg, Context, Db, Fragment, Json, Model, Query, QueryResult, RelataError, TableBuilder,
        Value,
    };
}
