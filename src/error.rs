//! Error types for mailhog.

use thiserror::Error;

use crate::release::ForwardError;

/// Common error type for mailhog.
#[derive(Error, Debug)]
pub enum MailhogError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Message store error.
    ///
    /// Raised when the persisted representation cannot be written or read
    /// back. The store stays usable; only the failed operation is lost.
    #[error("storage error: {0}")]
    Storage(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Release of a message to an upstream SMTP server failed.
    #[error("release failed: {0}")]
    Forward(#[from] ForwardError),
}

impl From<serde_json::Error> for MailhogError {
    fn from(e: serde_json::Error) -> Self {
        MailhogError::Storage(e.to_string())
    }
}

/// Result type alias for mailhog operations.
pub type Result<T> = std::result::Result<T, MailhogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = MailhogError::Storage("journal truncated".to_string());
        assert_eq!(err.to_string(), "storage error: journal truncated");
    }

    #[test]
    fn test_not_found_error_display() {
        let err = MailhogError::NotFound("message 1234".to_string());
        assert_eq!(err.to_string(), "message 1234 not found");
    }

    #[test]
    fn test_validation_error_display() {
        let err = MailhogError::Validation("bad id".to_string());
        assert_eq!(err.to_string(), "validation error: bad id");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: MailhogError = io_err.into();
        assert!(matches!(err, MailhogError::Io(_)));
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_forward_error_conversion() {
        let err: MailhogError = ForwardError::Unreachable("connection refused".to_string()).into();
        assert!(matches!(err, MailhogError::Forward(_)));
        assert!(err.to_string().starts_with("release failed"));
    }

    #[test]
    fn test_json_error_is_storage() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: MailhogError = json_err.into();
        assert!(matches!(err, MailhogError::Storage(_)));
    }
}
