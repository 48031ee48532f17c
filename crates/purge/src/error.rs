//! Error types for batch planning

/// Errors from batch planning.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("batch size must be greater than zero")]
    InvalidBatchSize,
}

/// Result alias for purge operations.
pub type Result<T> = std::result::Result<T, Error>;
