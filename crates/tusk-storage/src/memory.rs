use crate::traits::{ChunkStore, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-memory chunk store for tests and single-process development runs.
#[derive(Default)]
pub struct MemoryChunkStore {
    objects: Mutex<HashMap<Uuid, Vec<u8>>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the bytes stored for `id`, for assertions in tests.
    pub async fn stored_bytes(&self, id: Uuid) -> Option<Vec<u8>> {
        self.objects.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn append(&self, id: Uuid, chunk: Bytes) -> StorageResult<u64> {
        let mut objects = self.objects.lock().await;
        let buffer = objects.entry(id).or_default();
        buffer.extend_from_slice(&chunk);
        Ok(buffer.len() as u64)
    }

    async fn size(&self, id: Uuid) -> StorageResult<u64> {
        let objects = self.objects.lock().await;
        Ok(objects.get(&id).map(|b| b.len() as u64).unwrap_or(0))
    }

    async fn finalize(&self, id: Uuid) -> StorageResult<()> {
        let mut objects = self.objects.lock().await;
        objects.entry(id).or_default();
        Ok(())
    }

    async fn discard(&self, id: Uuid) -> StorageResult<()> {
        let mut objects = self.objects.lock().await;
        objects.remove(&id);
        Ok(())
    }
}
