use crate::traits::{ChunkStore, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Local filesystem chunk store.
///
/// Bytes for an in-progress upload accumulate in `{base_path}/{id}.part`;
/// finalize renames the staging file to `{base_path}/{id}`. Upload ids are
/// UUIDs, so keys never traverse outside the base directory.
#[derive(Clone)]
pub struct LocalChunkStore {
    base_path: PathBuf,
}

impl LocalChunkStore {
    /// Create a new LocalChunkStore rooted at `base_path`
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create chunk store directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalChunkStore { base_path })
    }

    fn part_path(&self, id: Uuid) -> PathBuf {
        self.base_path.join(format!("{}.part", id))
    }

    fn final_path(&self, id: Uuid) -> PathBuf {
        self.base_path.join(id.to_string())
    }
}

#[async_trait]
impl ChunkStore for LocalChunkStore {
    async fn append(&self, id: Uuid, chunk: Bytes) -> StorageResult<u64> {
        let path = self.part_path(id);
        let chunk_len = chunk.len();
        let start = std::time::Instant::now();

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                StorageError::AppendFailed(format!(
                    "Failed to open {}: {}",
                    path.display(),
                    e
                ))
            })?;

        file.write_all(&chunk).await.map_err(|e| {
            StorageError::AppendFailed(format!("Failed to write {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::AppendFailed(format!("Failed to sync {}: {}", path.display(), e))
        })?;

        let new_size = file
            .metadata()
            .await
            .map_err(|e| {
                StorageError::AppendFailed(format!("Failed to stat {}: {}", path.display(), e))
            })?
            .len();

        tracing::debug!(
            id = %id,
            chunk_bytes = chunk_len,
            total_bytes = new_size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Chunk appended to local store"
        );

        Ok(new_size)
    }

    async fn size(&self, id: Uuid) -> StorageResult<u64> {
        for path in [self.part_path(id), self.final_path(id)] {
            match fs::metadata(&path).await {
                Ok(meta) => return Ok(meta.len()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::IoError(e)),
            }
        }
        Ok(0)
    }

    async fn finalize(&self, id: Uuid) -> StorageResult<()> {
        let part = self.part_path(id);
        let dest = self.final_path(id);

        // An upload with declared length zero never appends; give it an
        // empty object so finalize still produces a complete file.
        if !fs::try_exists(&part).await.unwrap_or(false) {
            fs::File::create(&dest).await.map_err(|e| {
                StorageError::FinalizeFailed(format!(
                    "Failed to create {}: {}",
                    dest.display(),
                    e
                ))
            })?;
            return Ok(());
        }

        fs::rename(&part, &dest).await.map_err(|e| {
            StorageError::FinalizeFailed(format!(
                "Failed to rename {} to {}: {}",
                part.display(),
                dest.display(),
                e
            ))
        })?;

        tracing::info!(id = %id, path = %dest.display(), "Upload finalized in local store");

        Ok(())
    }

    async fn discard(&self, id: Uuid) -> StorageResult<()> {
        for path in [self.part_path(id), self.final_path(id)] {
            match fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!(id = %id, path = %path.display(), "Discarded stored bytes");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StorageError::DiscardFailed(format!(
                        "Failed to remove {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        Ok(())
    }
}
