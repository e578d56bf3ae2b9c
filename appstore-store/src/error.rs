//! Error taxonomy of the package store.
//!
//! `NotFound`, `InvalidInput` and `Conflict` are client errors whose messages
//! are safe to show. `Storage` and `Catalog` carry internal detail (paths,
//! SQL) and must be logged rather than surfaced.

use appstore_catalog::CatalogError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(CatalogError),
}

impl StoreError {
    /// True for errors caused by the caller rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::InvalidInput(_) | StoreError::Conflict(_)
        )
    }
}

impl From<CatalogError> for StoreError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(msg) => StoreError::NotFound(msg),
            CatalogError::Conflict(msg) => StoreError::Conflict(msg),
            CatalogError::InvalidInput(msg) => StoreError::InvalidInput(msg),
            CatalogError::Io(e) => StoreError::Storage(e),
            other => StoreError::Catalog(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
