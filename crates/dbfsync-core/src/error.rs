use thiserror::Error;

/// Errors that can occur in dbfsync-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid priority '{0}': expected one of high, medium, low")]
    InvalidPriority(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a single record was rejected before delivery. Never fatal to a tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordMappingError {
    #[error("identifier field '{field}' is empty")]
    MissingIdentifier { field: String },

    #[error("sequence field '{field}' is missing or not an integer: {value:?}")]
    InvalidSequence { field: String, value: String },
}
