use thiserror::Error;

/// A dynamic error type for encapsulating low-level backend errors.
///
/// Used as the source for [`StorageError`] variants so different database
/// backends can be wrapped uniformly.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that may occur while interacting with slice storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to read from the backing store.
    #[error("database read failed")]
    Read(#[source] SourceError),

    /// Failed to write to the backing store.
    #[error("database write failed")]
    Write(#[source] SourceError),

    /// A stored value failed to decode.
    #[error("stored value decoding failed")]
    Decode(#[from] alloy_rlp::Error),
}
