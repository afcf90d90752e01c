//! Error types for millwork extraction and sync.

use thiserror::Error;

/// Result type alias using millwork's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for millwork operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Job, review, cabinet or project missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Review was already approved or rejected
    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    /// Malformed request payload or out-of-range correction
    #[error("Validation error: {0}")]
    Validation(String),

    /// CAD tool or reasoning service unreachable, timed out, or returned garbage
    #[error("External boundary error: {0}")]
    ExternalBoundary(String),

    /// Sync detected divergent state that needs a forced resolution
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Capability check denied the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short machine-readable tag for the variant, used in API bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::AlreadyProcessed(_) => "already_processed",
            Error::Validation(_) => "validation_error",
            Error::ExternalBoundary(_) => "external_boundary_error",
            Error::Conflict(_) => "conflict",
            Error::Forbidden(_) => "forbidden",
            Error::Database(_) => "database_error",
            Error::Serialization(_) => "serialization_error",
            Error::Config(_) => "config_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::ExternalBoundary(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("review 42".to_string());
        assert_eq!(err.to_string(), "Not found: review 42");
    }

    #[test]
    fn test_error_display_already_processed() {
        let err = Error::AlreadyProcessed("review 7 is approved".to_string());
        assert_eq!(err.to_string(), "Already processed: review 7 is approved");
    }

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("width must be between 6 and 96".to_string());
        assert_eq!(
            err.to_string(),
            "Validation error: width must be between 6 and 96"
        );
    }

    #[test]
    fn test_error_display_external_boundary() {
        let err = Error::ExternalBoundary("rpc timeout".to_string());
        assert_eq!(err.to_string(), "External boundary error: rpc timeout");
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("cabinet 3 has a pending sync conflict".to_string());
        assert!(err.to_string().starts_with("Conflict:"));
    }

    #[test]
    fn test_error_kind_tags() {
        assert_eq!(Error::NotFound(String::new()).kind(), "not_found");
        assert_eq!(
            Error::AlreadyProcessed(String::new()).kind(),
            "already_processed"
        );
        assert_eq!(Error::Validation(String::new()).kind(), "validation_error");
        assert_eq!(
            Error::ExternalBoundary(String::new()).kind(),
            "external_boundary_error"
        );
        assert_eq!(Error::Conflict(String::new()).kind(), "conflict");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_serde_yaml_error_is_config() {
        let yaml_err = serde_yaml::from_str::<Vec<i32>>("a: [").unwrap_err();
        let err: Error = yaml_err.into();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
