//! Chunk store abstraction trait
//!
//! This module defines the ChunkStore trait that all byte storage backends
//! must implement. The protocol engine only ever appends, finalizes or
//! discards; it never reads bytes back.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

/// Chunk storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Append failed: {0}")]
    AppendFailed(String),

    #[error("Finalize failed: {0}")]
    FinalizeFailed(String),

    #[error("Discard failed: {0}")]
    DiscardFailed(String),

    #[error("No stored bytes for upload: {0}")]
    NotFound(Uuid),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for chunk store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Append-only byte storage keyed by upload identity.
///
/// Implementations must make `append` atomic from the caller's perspective:
/// either the whole chunk is durably stored and the new total size
/// returned, or an error is returned and the stored size is unchanged.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Append `chunk` to the bytes stored for `id` and return the new total
    /// size in bytes.
    async fn append(&self, id: Uuid, chunk: Bytes) -> StorageResult<u64>;

    /// Total bytes currently stored for `id`. Zero when nothing has been
    /// appended yet.
    async fn size(&self, id: Uuid) -> StorageResult<u64>;

    /// Mark the bytes for `id` as complete. Called once, after the final
    /// chunk has been appended.
    async fn finalize(&self, id: Uuid) -> StorageResult<()>;

    /// Remove any bytes stored for `id`, partial or complete. Discarding an
    /// id with no stored bytes is not an error.
    async fn discard(&self, id: Uuid) -> StorageResult<()>;
}
