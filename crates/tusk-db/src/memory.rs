use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tusk_core::models::Upload;
use tusk_core::UploadError;
use uuid::Uuid;

use crate::repository::UploadRepository;

/// In-memory upload repository for tests and single-process development
/// runs. Records do not survive a restart.
#[derive(Default)]
pub struct MemoryUploadRepository {
    records: RwLock<HashMap<Uuid, Upload>>,
}

impl MemoryUploadRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UploadRepository for MemoryUploadRepository {
    async fn load(&self, id: Uuid) -> Result<Option<Upload>, UploadError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn create(&self, upload: &Upload) -> Result<(), UploadError> {
        let mut records = self.records.write().await;
        if records.contains_key(&upload.id) {
            return Err(UploadError::Repository(format!(
                "duplicate upload id {}",
                upload.id
            )));
        }
        records.insert(upload.id, upload.clone());
        Ok(())
    }

    async fn save(&self, upload: &Upload) -> Result<(), UploadError> {
        let mut records = self.records.write().await;
        match records.get_mut(&upload.id) {
            Some(existing) => {
                *existing = upload.clone();
                Ok(())
            }
            None => Err(UploadError::Repository(format!(
                "cannot save unknown upload {}",
                upload.id
            ))),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), UploadError> {
        self.records.write().await.remove(&id);
        Ok(())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, UploadError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|u| u.is_expired(now))
            .map(|u| u.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tusk_core::models::UploadMetadata;

    #[tokio::test]
    async fn test_create_load_save_delete_round_trip() {
        let repo = MemoryUploadRepository::new();
        let mut upload = Upload::new(100, UploadMetadata::new(), None);
        repo.create(&upload).await.unwrap();

        let loaded = repo.load(upload.id).await.unwrap().unwrap();
        assert_eq!(loaded, upload);

        upload.begin_saving().unwrap();
        upload.apply_chunk(40);
        repo.save(&upload).await.unwrap();
        let loaded = repo.load(upload.id).await.unwrap().unwrap();
        assert_eq!(loaded.offset, 40);

        repo.delete(upload.id).await.unwrap();
        assert!(repo.load(upload.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let repo = MemoryUploadRepository::new();
        let upload = Upload::new(100, UploadMetadata::new(), None);
        repo.create(&upload).await.unwrap();
        assert!(matches!(
            repo.create(&upload).await,
            Err(UploadError::Repository(_))
        ));
    }

    #[tokio::test]
    async fn test_save_unknown_record_fails() {
        let repo = MemoryUploadRepository::new();
        let upload = Upload::new(100, UploadMetadata::new(), None);
        assert!(matches!(
            repo.save(&upload).await,
            Err(UploadError::Repository(_))
        ));
    }

    #[tokio::test]
    async fn test_list_expired_only_returns_past_deadlines() {
        let repo = MemoryUploadRepository::new();
        let now = Utc::now();

        let expired = Upload::new(10, UploadMetadata::new(), Some(now - Duration::seconds(5)));
        let live = Upload::new(10, UploadMetadata::new(), Some(now + Duration::seconds(3600)));
        let eternal = Upload::new(10, UploadMetadata::new(), None);

        repo.create(&expired).await.unwrap();
        repo.create(&live).await.unwrap();
        repo.create(&eternal).await.unwrap();

        let ids = repo.list_expired(now).await.unwrap();
        assert_eq!(ids, vec![expired.id]);
    }
}
