use thiserror::Error;

/// Top-level error type for the clarify service.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for ClarifyError` so that `?` works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClarifyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for ClarifyError {
    fn from(err: toml::de::Error) -> Self {
        ClarifyError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ClarifyError {
    fn from(err: toml::ser::Error) -> Self {
        ClarifyError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ClarifyError {
    fn from(err: serde_json::Error) -> Self {
        ClarifyError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for clarify operations.
pub type Result<T> = std::result::Result<T, ClarifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClarifyError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ClarifyError = io_err.into();
        assert!(matches!(err, ClarifyError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ClarifyError = json_err.into();
        assert!(matches!(err, ClarifyError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: ClarifyError = toml_err.into();
        assert!(matches!(err, ClarifyError::Config(_)));
    }
}
