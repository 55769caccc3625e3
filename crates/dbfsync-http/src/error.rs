use thiserror::Error;

/// Errors from the remote delivery API.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("validation error: {body}")]
    Validation { body: String },
}

impl DeliveryError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::Network(_) | DeliveryError::Timeout | DeliveryError::Status { .. }
        )
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: u16, url: &str, body: String) -> Self {
        match status {
            404 => DeliveryError::EndpointNotFound(url.to_string()),
            422 => DeliveryError::Validation { body },
            _ => DeliveryError::Status { status, body },
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DeliveryError::Timeout
        } else {
            DeliveryError::Network(e.to_string())
        }
    }
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let url = "http://api/production_orders/batch";
        assert!(matches!(
            DeliveryError::from_status(404, url, String::new()),
            DeliveryError::EndpointNotFound(_)
        ));
        assert!(matches!(
            DeliveryError::from_status(422, url, "bad".into()),
            DeliveryError::Validation { .. }
        ));
        assert!(DeliveryError::from_status(500, url, String::new()).is_retryable());
        assert!(DeliveryError::from_status(429, url, String::new()).is_retryable());
        assert!(!DeliveryError::from_status(404, url, String::new()).is_retryable());
        assert!(!DeliveryError::from_status(422, url, String::new()).is_retryable());
        assert!(DeliveryError::Timeout.is_retryable());
    }
}
