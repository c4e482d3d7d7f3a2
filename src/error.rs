//! Error types for A3S Graph

use thiserror::Error;

pub type Result<T> = std::result::Result<T, A3SError>;

#[derive(Error, Debug)]
pub enum A3SError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector extension unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl A3SError {
    /// Whether this error comes from the infrastructure underneath a backend
    /// (store unreachable, disk, network) rather than from the caller's data.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            A3SError::Storage(_)
                | A3SError::Database(_)
                | A3SError::Io(_)
                | A3SError::Http(_)
        )
    }
}

impl From<String> for A3SError {
    fn from(s: String) -> Self {
        A3SError::Internal(s)
    }
}

impl From<&str> for A3SError {
    fn from(s: &str) -> Self {
        A3SError::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = A3SError::Storage("connection refused".to_string());
        assert_eq!(err.to_string(), "Storage error: connection refused");

        let err = A3SError::Backup("disk full".to_string());
        assert_eq!(err.to_string(), "Backup error: disk full");
    }

    #[test]
    fn test_error_from_string() {
        let err: A3SError = "test error".into();
        assert!(matches!(err, A3SError::Internal(_)));
        assert_eq!(err.to_string(), "Internal error: test error");

        let err: A3SError = String::from("owned error").into();
        assert!(matches!(err, A3SError::Internal(_)));
    }

    #[test]
    fn test_infrastructure_classification() {
        assert!(A3SError::Storage("down".into()).is_infrastructure());

        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(A3SError::from(io_err).is_infrastructure());

        assert!(!A3SError::Embedding("bad vector".into()).is_infrastructure());
        assert!(!A3SError::Config("missing key".into()).is_infrastructure());
        assert!(!A3SError::Backup("denied".into()).is_infrastructure());
    }

    #[test]
    fn test_error_from_sqlite() {
        let err: A3SError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, A3SError::Database(_)));
        assert!(err.is_infrastructure());
    }
}
