//! Error taxonomy of the retrieval core.
//!
//! A hint that matches nothing is not an error (resolution yields `None`) and
//! neither is an empty fused result (it renders an explicit marker).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// No index has been built for the requested scope yet.
    #[error("no index is available for scope '{0}'")]
    IndexUnavailable(String),

    /// A stored chunk lacks a field needed for citation. Callers skip the chunk.
    #[error("chunk is missing required metadata field '{field}'")]
    MalformedMetadata { field: &'static str },

    /// Fusion weights that are negative, non-finite or do not sum to 1.0.
    #[error("fusion weights must be non-negative and sum to 1.0 (got semantic={semantic}, lexical={lexical})")]
    InvalidWeights { semantic: f32, lexical: f32 },

    /// Any fatal index read failure; aborts the query.
    #[error("retrieval unavailable: {0}")]
    Backend(String),
}

impl From<tantivy::TantivyError> for RetrievalError {
    fn from(err: tantivy::TantivyError) -> Self {
        RetrievalError::Backend(err.to_string())
    }
}

impl From<anyhow::Error> for RetrievalError {
    fn from(err: anyhow::Error) -> Self {
        RetrievalError::Backend(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
