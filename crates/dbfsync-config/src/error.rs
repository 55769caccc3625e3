use thiserror::Error;

/// Errors that can occur when parsing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("sequence diff requires 'diff.field'")]
    MissingSequenceField,

    #[error("invalid priority '{value}': expected one of high, medium, low")]
    InvalidPriority { value: String },

    #[error("constant '{name}' cannot be represented as JSON: {message}")]
    InvalidConstant { name: String, message: String },

    #[error("quantity rule needs at least one candidate field")]
    EmptyQuantityCandidates,

    #[error("duplicate feed name '{0}'")]
    DuplicateFeed(String),

    #[error("feeds '{first}' and '{second}' read the same source {source_path}")]
    DuplicateSource {
        first: String,
        second: String,
        source_path: String,
    },
}

impl From<dbfsync_core::Error> for ConfigError {
    fn from(e: dbfsync_core::Error) -> Self {
        match e {
            dbfsync_core::Error::MissingField(field) => ConfigError::MissingField { field },
            dbfsync_core::Error::InvalidPriority(value) => ConfigError::InvalidPriority { value },
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_keep_their_message() {
        let err = ConfigError::from(dbfsync_core::Error::MissingField("key".into()));
        assert_eq!(err.to_string(), "missing required field: key");

        let err = ConfigError::from(dbfsync_core::Error::InvalidPriority("urgent".into()));
        assert!(matches!(err, ConfigError::InvalidPriority { ref value } if value == "urgent"));
    }
}
