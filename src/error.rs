//! Error types for the Graph RAG pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Inference backend error: {0}")]
    Inference(String),

    #[error("Rate limiter unavailable: {0}")]
    LimiterUnavailable(String),

    #[error("Rate limit exceeded for bucket {0}")]
    RateLimited(String),

    #[error("Partitioning failed: {0}")]
    Partition(String),

    #[error("Document {path} failed: {message}")]
    DocumentFailed { path: String, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Admission exhaustion is the only condition a caller should retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited(_))
    }

    /// Wrap an error raised while processing one document of a corpus.
    pub fn document(path: impl Into<String>, err: &Error) -> Self {
        Error::DocumentFailed {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<neo4rs::Error> for Error {
    fn from(err: neo4rs::Error) -> Self {
        Error::Store(err.to_string())
    }
}
