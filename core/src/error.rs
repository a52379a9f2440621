use std::sync::Arc;

use thiserror::Error;

/// Boxed error produced by a [`Backend`](crate::exec::Backend) implementation.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Error)]
pub enum RelataError {
    /// A record type could not be turned into a table model
    #[error("Schema error: {0}")]
    Schema(String),

    /// The query is missing a piece required to render it
    #[error("Build error: {0}")]
    Build(String),

    /// A column value cannot be represented in the destination without loss
    #[error("Conversion error on column {column:?}: {message}")]
    Conversion { column: String, message: String },

    /// NULL arrived for a destination that cannot hold it
    #[error("Column {column:?} is NULL but the destination is not nullable")]
    Nullability { column: String },

    /// Decoding failed for one row; the row was discarded
    #[error("Failed to decode row {row}: {source}")]
    Decode {
        row: usize,
        #[source]
        source: Box<RelataError>,
    },

    /// UPDATE or DELETE without any condition
    #[error("Refusing to run {0} without a WHERE clause; call all_rows() to affect every row")]
    UnsafeOperation(&'static str),

    /// The context was cancelled or its deadline passed
    #[error("Query cancelled")]
    Cancelled,

    /// No rows returned when exactly one was expected
    #[error("No rows found")]
    NotFound,

    /// More than one row returned when exactly one was expected
    #[error("Multiple rows returned when one was expected")]
    MultipleRows,

    /// The backend rejected or failed the statement
    #[error("Backend error executing {statement:?} ({param_count} params): {source}")]
    Backend {
        statement: String,
        param_count: usize,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// The backend could not open a connection
    #[error("Connection error: {0}")]
    Connect(Arc<dyn std::error::Error + Send + Sync>),

    /// Reading or writing a copy stream failed
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl RelataError {
    pub(crate) fn conversion(message: impl Into<String>) -> Self {
        RelataError::Conversion {
            column: String::new(),
            message: message.into(),
        }
    }

    pub(crate) fn backend(statement: &str, param_count: usize, source: BackendError) -> Self {
        RelataError::Backend {
            statement: statement.to_owned(),
            param_count,
            source: Arc::from(source),
        }
    }

    /// Wraps a driver failure raised while opening a connection.
    pub fn connect(source: impl Into<BackendError>) -> Self {
        RelataError::Connect(Arc::from(source.into()))
    }

    /// Attaches a column name to conversion and nullability errors that lack one.
    pub fn with_column(self, name: &str) -> Self {
        match self {
            RelataError::Conversion { column, message } if column.is_empty() => {
                RelataError::Conversion {
                    column: name.to_owned(),
                    message,
                }
            }
            RelataError::Nullability { column } if column.is_empty() => RelataError::Nullability {
                column: name.to_owned(),
            },
            other => other,
        }
    }

    /// The error with any [`RelataError::Decode`] wrapping removed.
    pub fn root(&self) -> &RelataError {
        match self {
            RelataError::Decode { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_conversion(&self) -> bool {
        matches!(self.root(), RelataError::Conversion { .. })
    }

    pub fn is_nullability(&self) -> bool {
        matches!(self.root(), RelataError::Nullability { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), RelataError::Cancelled)
    }
}

impl From<std::io::Error> for RelataError {
    fn from(err: std::io::Error) -> Self {
        RelataError::Io(Arc::new(err))
    }
}

/// Result type for database operations
pub type Result<T> = std::result::Result<T, RelataError>;
