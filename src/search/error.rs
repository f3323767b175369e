use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("vector store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("embedding backend request failed: {0}")]
    Backend(String),

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("corrupt record '{id}': {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("dimension mismatch for '{id}': expected {expected}, found {found}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        found: usize,
    },

    #[error("store was built with model '{stored}' but backend is '{configured}'; rebuild the index")]
    ModelMismatch { stored: String, configured: String },

    #[error("query must be at least {min} characters")]
    QueryTooShort { min: usize },
}

pub type Result<T> = std::result::Result<T, SearchError>;
