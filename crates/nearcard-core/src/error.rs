//! Error types for Nearcard

use thiserror::Error;

/// Main error type for Nearcard operations
#[derive(Error, Debug)]
pub enum CardError {
    /// Advertiser or browser failed to start - fatal for the session,
    /// requires an explicit restart
    #[error("Discovery start failed: {0}")]
    DiscoveryStart(String),

    /// A received payload could not be decoded as a card (non-fatal,
    /// the message is dropped)
    #[error("Payload decode failed: {0}")]
    DecodePayload(String),

    /// Transport-level failure (session lost, send failed)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

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

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid operation for current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type alias using CardError
pub type CardResult<T> = Result<T, CardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CardError::DiscoveryStart("browser unavailable".to_string());
        assert_eq!(
            format!("{}", err),
            "Discovery start failed: browser unavailable"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let card_err: CardError = io_err.into();
        assert!(matches!(card_err, CardError::Io(_)));
    }
}
