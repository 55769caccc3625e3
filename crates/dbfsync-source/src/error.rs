use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source file not found: {0}")]
    NotFound(String),

    #[error("memo file missing for {0}")]
    MissingMemo(String),

    #[error("failed to decode {path}: {message}")]
    Decode { path: String, message: String },
}

/// Raised when a source file cannot be stat'ed.
#[derive(Debug, Error)]
#[error("cannot access {path}: {source}")]
pub struct FileAccessError {
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

pub type SourceResult<T> = Result<T, SourceError>;
