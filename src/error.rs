// src/error.rs

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the pipeline can surface. Nothing is retried or recovered
/// locally; the first error aborts the run.
#[derive(Debug, Error)]
pub enum Error {
    /// Source unreachable, or credentials missing/rejected.
    #[error("fetching {target} failed: {reason}")]
    Fetch { target: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// A required source column is missing, or the column set is unusable.
    #[error("schema error: {0}")]
    Schema(String),

    /// Strict-mode rejection of a value.
    #[error("validation error: {0}")]
    Validation(String),

    /// Store open, write or close failure.
    #[error("loading {context} failed: {source}")]
    Load {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("query `{query}` failed: {source}")]
    Query {
        query: &'static str,
        #[source]
        source: duckdb::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("reading CSV failed: {0}")]
    Read(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl Error {
    pub(crate) fn fetch(target: impl Into<String>, reason: impl ToString) -> Self {
        Error::Fetch {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn load(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::Load {
            context: context.into(),
            source: source.into(),
        }
    }
}
