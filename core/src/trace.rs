//! Tracing utilities for statement and relation-load observability.
//!
//! Enable the `tracing` feature to emit events via the `tracing` crate.
//! These macros no-op when the feature is disabled, avoiding `#[cfg]` boilerplate
//! at every call site.

/// Emit a debug-level tracing event for a row-returning statement.
///
/// ```ignore
/// relata_trace_query!(&sql_str, params.len());
/// ```
#[macro_export]
macro_rules! relata_trace_query {
    ($sql:expr, $param_count:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(sql = %$sql, params = $param_count, "relata.query");
    };
}

/// Emit a debug-level tracing event for a statement run for its row count.
#[macro_export]
macro_rules! relata_trace_exec {
    ($sql:expr, $param_count:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(sql = %$sql, params = $param_count, "relata.exec");
    };
}

/// Emit a debug-level tracing event for one eager-loading batch.
///
/// ```ignore
/// relata_trace_relation!("posts", keys.len());
/// ```
#[macro_export]
macro_rules! relata_trace_relation {
    ($relation:expr, $key_count:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(relation = %$relation, keys = $key_count, "relata.relation");
    };
}

/// Emit a warn-level tracing event when a best-effort backend cancel fails.
#[macro_export]
macro_rules! relata_trace_cancel_failed {
    ($err:expr) => {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %$err, "relata.cancel_failed");
    };
}
