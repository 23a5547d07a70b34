use std::error::Error as StdError;

use thiserror::Error;

/// Result alias for record store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failure reported by a record store backend.
///
/// Every variant maps to degraded mode at the service layer; the source error is kept for logs.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or refused the operation.
    #[error("{backend} store unavailable: {source}")]
    Unavailable {
        /// Short backend name, e.g. `mongodb`.
        backend: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl StorageError {
    /// Wrap a backend failure.
    pub fn unavailable(
        backend: &'static str,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        StorageError::Unavailable {
            backend,
            source: Box::new(source),
        }
    }

    /// Name of the backend that failed.
    pub fn backend(&self) -> &'static str {
        match self {
            StorageError::Unavailable { backend, .. } => backend,
        }
    }
}
