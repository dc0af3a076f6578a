//! Error types for docshelf.

use thiserror::Error;

/// Result type alias using docshelf's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for docshelf operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No store connection is currently established
    #[error("Database not connected")]
    NotConnected,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(uuid::Uuid),

    /// Folder referenced by name does not exist
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// A uniquely named resource already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The extraction collaborator failed for the whole batch
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for every "no matching row" flavour of error.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::DocumentNotFound(_) | Error::FolderNotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::Serialization(format!("invalid base64 payload: {}", e))
    }
}
