//! Error types for the CarSync core

use thiserror::Error;

/// Main error type for vehicle store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Storage could not be opened or created; fatal for this store instance
    #[error("Store initialization failed: {0}")]
    Initialization(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Background storage task failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transport-level HTTP error while talking to the record service
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote record service answered with a non-success status
    #[error("Remote service error: {0}")]
    Remote(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using StoreError
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::Remote("upsert of AB12CDE failed: HTTP 503".to_string());
        assert_eq!(
            format!("{}", err),
            "Remote service error: upsert of AB12CDE failed: HTTP 503"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let store_err: StoreError = io_err.into();
        assert!(matches!(store_err, StoreError::Io(_)));
    }
}
