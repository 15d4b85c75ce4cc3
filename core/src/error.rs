use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the build and query pipelines.
#[derive(Error, Debug)]
pub enum Error {
    #[error("missing {kind}: {}", path.display())]
    MissingInput { kind: &'static str, path: PathBuf },

    /// More spill segments than the open-handle budget allows.
    #[error("segment capacity exceeded: {requested} open segments requested, limit is {limit}")]
    SegmentCapacity { requested: usize, limit: usize },

    #[error("malformed {what} at {}:{line}: {reason}", path.display())]
    Malformed {
        what: &'static str,
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("unknown index type: {0}")]
    UnknownIndexType(String),

    #[error("unknown retrieval model: {0}")]
    UnknownModel(String),

    #[error("invalid posting list: {0}")]
    InvalidPostings(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn missing(kind: &'static str, path: impl Into<PathBuf>) -> Self {
        Error::MissingInput { kind, path: path.into() }
    }

    /// True for the resource-exhaustion failure of the external merge.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Error::SegmentCapacity { .. })
    }
}
