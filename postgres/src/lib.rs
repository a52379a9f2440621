//! PostgreSQL backends for relata.
//!
//! Enable the `tokio-postgres` feature (on by default) for [`PgBackend`].

#[cfg(feature = "tokio-postgres")]
mod backend;

#[cfg(feature = "tokio-postgres")]
pub use backend::PgBackend;
