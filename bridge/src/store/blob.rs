//! The blob store capability and its error taxonomy.

use async_trait::async_trait;
use thiserror::Error;

use super::content_id::ContentId;

/// Errors a blob store can report.
///
/// The split matters to the mint pipeline: `Unavailable` is retried with
/// backoff inside a bounded budget, everything else fails the request
/// terminally.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No blob exists under this id.
    #[error("content not found: {0}")]
    NotFound(ContentId),

    /// The store could not be reached or answered with a transient fault.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A content id string failed to parse.
    #[error("malformed content id: {0}")]
    MalformedId(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Content-addressed blob storage.
///
/// Implementations must be idempotent on `put`: storing the same payload
/// twice returns the same id and leaves one copy.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores a payload and returns its content id.
    async fn put(&self, payload: Vec<u8>) -> Result<ContentId, StoreError>;

    /// Fetches the payload stored under `id`.
    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(StoreError::Unavailable("timeout".into()).is_retryable());
        assert!(!StoreError::NotFound(ContentId::for_bytes(b"x")).is_retryable());
        assert!(!StoreError::MalformedId("bad".into()).is_retryable());
    }
}
