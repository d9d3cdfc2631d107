use thiserror::Error;

/// Main error type for RAGBench
#[derive(Error, Debug)]
pub enum RagbenchError {
    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database-related errors (FTS5 index retriever)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP transport errors (HTTP retriever)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Benchmark parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Retriever invocation errors
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Retriever returned a document the adapter cannot score
    #[error("Malformed retriever result: {0}")]
    MalformedResult(String),

    /// Retriever did not answer within the per-query budget
    #[error("Retrieval timed out after {0}ms")]
    Timeout(u64),

    /// Metric computation errors
    #[error("Metric error: {0}")]
    Metric(String),
}

/// Convenient Result type using RagbenchError
pub type Result<T> = std::result::Result<T, RagbenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RagbenchError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_timeout_display() {
        let err = RagbenchError::Timeout(30);
        assert_eq!(err.to_string(), "Retrieval timed out after 30ms");
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: RagbenchError = json_err.into();
        assert!(matches!(err, RagbenchError::Json(_)));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: RagbenchError = rusqlite_err.into();
        assert!(matches!(err, RagbenchError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RagbenchError = io_err.into();
        assert!(matches!(err, RagbenchError::Io(_)));
    }
}
