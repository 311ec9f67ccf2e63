//! Unified error type for the query pipeline.
//!
//! One `QueryError` enum plus the `QueryResult` alias. Only `Embedding` and a
//! `Search` raised during the global search abort a whole query; everything
//! else is caught at the owning stage and recorded in the report.

use thiserror::Error;

/// Pipeline error taxonomy
#[derive(Debug, Error)]
pub enum QueryError {
    /// Query image could not be read or embedded. Fatal to the query.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Vector index search failed. Fatal for the global collection,
    /// candidate-scoped for per-stream collections.
    #[error("search failed in '{collection}': {message}")]
    Search { collection: String, message: String },

    /// Batched point lookup returned an error, too few entries, or entries
    /// out of the requested order. Candidate-scoped.
    #[error("index lookup failed in '{collection}': {message}")]
    IndexLookup { collection: String, message: String },

    /// Fragment export failed. Scoped to the offending fragment task.
    #[error("export failed for '{stream_id}' frames [{start}, {end}]: {message}")]
    Export {
        stream_id: String,
        start: i64,
        end: i64,
        message: String,
    },

    /// Media probe of an exported artifact failed. Recorded in the report,
    /// never fatal.
    #[error("probe failed: {0}")]
    Probe(String),

    /// Filesystem error while preparing directories or writing the report.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unloadable run configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl QueryError {
    pub fn search(collection: impl Into<String>, message: impl ToString) -> Self {
        QueryError::Search {
            collection: collection.into(),
            message: message.to_string(),
        }
    }

    pub fn lookup(collection: impl Into<String>, message: impl ToString) -> Self {
        QueryError::IndexLookup {
            collection: collection.into(),
            message: message.to_string(),
        }
    }
}

/// Pipeline result alias
pub type QueryResult<T> = Result<T, QueryError>;
