//! Error types for the catalog.

use crate::types::ProductId;
use thiserror::Error;

/// Main error type for catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid product ID: {0}")]
    InvalidIdentifier(String),

    #[error("Product not found: {0}")]
    NotFound(ProductId),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Store is locked by another process")]
    Locked,
}

/// Coarse classification used by transports to pick a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before reaching the store.
    BadRequest,
    /// Well-formed identifier with no matching record.
    NotFound,
    /// Temporary store failure; the caller may retry.
    Unavailable,
    /// Any other store failure.
    Internal,
}

impl CatalogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::Validation(_) | CatalogError::InvalidIdentifier(_) => {
                ErrorKind::BadRequest
            }
            CatalogError::NotFound(_) => ErrorKind::NotFound,
            CatalogError::StoreUnavailable(_) => ErrorKind::Unavailable,
            _ => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }
}

impl From<rmp_serde::encode::Error> for CatalogError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        CatalogError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CatalogError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        CatalogError::Deserialization(e.to_string())
    }
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
