use thiserror::Error;

/// Top-level error type for the ragline workspace.
///
/// Refresh-time variants (`Fetch`, `Embedding`, `EmptyCorpus`) are contained
/// by the refresh controller; query-time variants are returned to the caller
/// of that query only.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RaglineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch failed for {identifier}: {reason}")]
    Fetch { identifier: String, reason: String },

    #[error("Embedding failed for {text:?}: {reason}")]
    Embedding { text: String, reason: String },

    #[error("Corpus is empty: no documents survived normalization and embedding")]
    EmptyCorpus,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("No snapshot has been published yet")]
    NoSnapshot,

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RaglineError {
    /// Build an embedding failure naming the offending text.
    pub fn embedding(text: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        RaglineError::Embedding {
            text: text.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a fetch failure for a single corpus identifier.
    pub fn fetch(identifier: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        RaglineError::Fetch {
            identifier: identifier.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<toml::de::Error> for RaglineError {
    fn from(err: toml::de::Error) -> Self {
        RaglineError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for RaglineError {
    fn from(err: toml::ser::Error) -> Self {
        RaglineError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for RaglineError {
    fn from(err: serde_json::Error) -> Self {
        RaglineError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for ragline operations.
pub type Result<T> = std::result::Result<T, RaglineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RaglineError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(RaglineError, &str)> = vec![
            (
                RaglineError::fetch("https://a.example", "status 404"),
                "Fetch failed for https://a.example: status 404",
            ),
            (
                RaglineError::embedding("hello", "model crashed"),
                "Embedding failed for \"hello\": model crashed",
            ),
            (
                RaglineError::EmptyCorpus,
                "Corpus is empty: no documents survived normalization and embedding",
            ),
            (
                RaglineError::DimensionMismatch {
                    expected: 384,
                    actual: 256,
                },
                "Dimension mismatch: expected 384, got 256",
            ),
            (
                RaglineError::CorruptIndex("truncated".to_string()),
                "Corrupt index: truncated",
            ),
            (
                RaglineError::InvalidQuery("k must be at least 1".to_string()),
                "Invalid query: k must be at least 1",
            ),
            (
                RaglineError::NoSnapshot,
                "No snapshot has been published yet",
            ),
            (
                RaglineError::Delivery("502".to_string()),
                "Delivery error: 502",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RaglineError = io_err.into();
        assert!(matches!(err, RaglineError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: RaglineError = err.unwrap_err().into();
        assert!(matches!(err, RaglineError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: RaglineError = err.unwrap_err().into();
        assert!(matches!(err, RaglineError::Serialization(_)));
    }

    #[test]
    fn test_embedding_error_keeps_text() {
        match RaglineError::embedding("offending text", "boom") {
            RaglineError::Embedding { text, reason } => {
                assert_eq!(text, "offending text");
                assert_eq!(reason, "boom");
            }
            other => panic!("Expected Embedding variant, got {:?}", other),
        }
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let _value = io_result?;
            Ok("success".to_string())
        }

        assert_eq!(inner().unwrap(), "success");
    }
}
