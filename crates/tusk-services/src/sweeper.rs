//! Background expiry sweep
//!
//! Every operation already self-checks expiry, so this task is purely
//! reclamation: it deletes expired records and their stored bytes so they
//! stop taking up space. Nothing is allowed to depend on it for
//! correctness.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use tusk_db::UploadRepository;
use tusk_storage::ChunkStore;

#[derive(Clone)]
pub struct ExpirySweeper {
    repository: Arc<dyn UploadRepository>,
    chunk_store: Arc<dyn ChunkStore>,
    sweep_interval: Duration,
}

impl ExpirySweeper {
    pub fn new(
        repository: Arc<dyn UploadRepository>,
        chunk_store: Arc<dyn ChunkStore>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            repository,
            chunk_store,
            sweep_interval,
        }
    }

    /// Start the periodic sweep task.
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval = interval(self.sweep_interval);

            loop {
                sweep_interval.tick().await;

                match self.sweep_expired().await {
                    Ok(0) => {}
                    Ok(count) => {
                        tracing::info!(reclaimed = count, "Expiry sweep reclaimed uploads")
                    }
                    Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
                }
            }
        })
    }

    /// Reclaim every upload whose deadline has passed. Returns how many
    /// records were removed.
    pub async fn sweep_expired(&self) -> Result<usize, anyhow::Error> {
        let expired = self.repository.list_expired(Utc::now()).await?;
        let mut reclaimed = 0usize;

        for id in expired {
            if let Err(e) = self.chunk_store.discard(id).await {
                tracing::warn!(id = %id, error = %e, "Failed to discard bytes of expired upload");
                continue;
            }
            self.repository.delete(id).await?;
            reclaimed += 1;
        }

        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Duration as ChronoDuration;
    use tusk_core::models::{Upload, UploadMetadata};
    use tusk_db::MemoryUploadRepository;
    use tusk_storage::MemoryChunkStore;

    #[tokio::test]
    async fn test_sweep_reclaims_only_expired_uploads() {
        let repository = Arc::new(MemoryUploadRepository::new());
        let chunk_store = Arc::new(MemoryChunkStore::new());
        let now = Utc::now();

        let expired = Upload::new(
            100,
            UploadMetadata::new(),
            Some(now - ChronoDuration::seconds(10)),
        );
        let live = Upload::new(
            100,
            UploadMetadata::new(),
            Some(now + ChronoDuration::seconds(3600)),
        );
        repository.create(&expired).await.unwrap();
        repository.create(&live).await.unwrap();
        chunk_store
            .append(expired.id, Bytes::from_static(b"stale bytes"))
            .await
            .unwrap();

        let sweeper = ExpirySweeper::new(
            repository.clone(),
            chunk_store.clone(),
            Duration::from_secs(3600),
        );
        let reclaimed = sweeper.sweep_expired().await.unwrap();

        assert_eq!(reclaimed, 1);
        assert!(repository.load(expired.id).await.unwrap().is_none());
        assert!(chunk_store.stored_bytes(expired.id).await.is_none());
        assert!(repository.load(live.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_with_nothing_expired_is_a_noop() {
        let repository = Arc::new(MemoryUploadRepository::new());
        let chunk_store = Arc::new(MemoryChunkStore::new());
        let upload = Upload::new(100, UploadMetadata::new(), None);
        repository.create(&upload).await.unwrap();

        let sweeper = ExpirySweeper::new(
            repository.clone(),
            chunk_store,
            Duration::from_secs(3600),
        );
        assert_eq!(sweeper.sweep_expired().await.unwrap(), 0);
        assert!(repository.load(upload.id).await.unwrap().is_some());
    }
}
