use thiserror::Error;

/// Top-level error type for the Haven system.
///
/// The variants split into two groups. `Validation` and `StoreUnavailable`
/// are fatal to a chat request and are surfaced to the caller. Embedding and
/// vector-store failures are degradable: the chat pipeline records them as a
/// step outcome and keeps going (see [`HavenError::is_degradable`]).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HavenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Message store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector backend error: {0}")]
    VectorBackend(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl HavenError {
    /// True for failures the chat pipeline may swallow into degraded mode.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            HavenError::Embedding(_)
                | HavenError::VectorBackend(_)
                | HavenError::DimensionMismatch { .. }
                | HavenError::UnknownCollection(_)
        )
    }
}

impl From<toml::de::Error> for HavenError {
    fn from(err: toml::de::Error) -> Self {
        HavenError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for HavenError {
    fn from(err: toml::ser::Error) -> Self {
        HavenError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for HavenError {
    fn from(err: serde_json::Error) -> Self {
        HavenError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Haven operations.
pub type Result<T> = std::result::Result<T, HavenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HavenError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = HavenError::DimensionMismatch {
            expected: 1536,
            actual: 3,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 1536, got 3");
    }

    #[test]
    fn test_degradable_classification() {
        assert!(HavenError::Embedding("model down".into()).is_degradable());
        assert!(HavenError::VectorBackend("timeout".into()).is_degradable());
        assert!(HavenError::UnknownCollection("chat".into()).is_degradable());
        assert!(HavenError::DimensionMismatch {
            expected: 4,
            actual: 2
        }
        .is_degradable());

        assert!(!HavenError::Validation("empty".into()).is_degradable());
        assert!(!HavenError::StoreUnavailable("locked".into()).is_degradable());
        assert!(!HavenError::Config("bad".into()).is_degradable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HavenError = io_err.into();
        assert!(matches!(err, HavenError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let haven_err: HavenError = err.unwrap_err().into();
        assert!(matches!(haven_err, HavenError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let haven_err: HavenError = err.unwrap_err().into();
        assert!(matches!(haven_err, HavenError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
