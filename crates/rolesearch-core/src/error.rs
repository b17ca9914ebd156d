use thiserror::Error;

/// Errors raised while building, loading or saving a [`VectorIndex`](crate::VectorIndex).
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid index configuration: {0}")]
    InvalidConfig(String),

    #[error("corpus chunk #{0} has an empty id")]
    EmptyChunkId(usize),

    #[error("duplicate chunk id in corpus: {0}")]
    DuplicateChunkId(String),

    #[error("invalid index bundle: {0}")]
    InvalidBundle(String),

    #[error("unsupported index format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by [`Searcher`](crate::Searcher) for malformed calls.
///
/// Unknown users, empty queries and empty indexes are *not* errors; they are
/// expressed as normal [`SearchOutcome`](crate::SearchOutcome) values.
#[derive(Debug, Error, PartialEq)]
pub enum SearchError {
    #[error("invalid search argument: {0}")]
    InvalidArgument(String),
}
