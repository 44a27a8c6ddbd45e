//! SBI error types

use thiserror::Error;

/// Errors raised by SBI client and server operations.
#[derive(Error, Debug)]
pub enum SbiError {
    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("request timeout")]
    Timeout,

    #[error("invalid URI: {0}")]
    InvalidUri(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    /// NRF discovery answered 307; the AUSF is a direct NRF consumer and
    /// never follows the redirect.
    #[error("temporary redirect for non NRF consumer")]
    TemporaryRedirect,

    #[error("server error: {0}")]
    ServerError(String),

    #[error("client error: {0}")]
    ClientError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl SbiError {
    /// Create an HTTP error from a status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::HttpError {
            status,
            message: message.into(),
        }
    }

    /// The HTTP status code, when this error carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpError { status, .. } => Some(*status),
            Self::TemporaryRedirect => Some(307),
            Self::Timeout => Some(408),
            _ => None,
        }
    }
}

/// Result type for SBI operations.
pub type SbiResult<T> = Result<T, SbiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_code() {
        let err = SbiError::from_status(404, "not found");
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(SbiError::TemporaryRedirect.status_code(), Some(307));
        assert_eq!(SbiError::Timeout.status_code(), Some(408));
        assert_eq!(SbiError::ConnectionError("x".into()).status_code(), None);
    }

    #[test]
    fn test_redirect_message() {
        assert_eq!(
            SbiError::TemporaryRedirect.to_string(),
            "temporary redirect for non NRF consumer"
        );
    }
}
