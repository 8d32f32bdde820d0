//! Upload record persistence trait
//!
//! The protocol engine loads, creates, saves and deletes upload records
//! through this interface. Implementations must apply `save` atomically
//! per id; cross-id ordering is irrelevant because uploads are independent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tusk_core::models::Upload;
use tusk_core::UploadError;
use uuid::Uuid;

#[async_trait]
pub trait UploadRepository: Send + Sync {
    /// Load the record for `id`, or `None` when no such record exists.
    /// Expiry is the engine's concern: an expired-but-undeleted record is
    /// still returned here.
    async fn load(&self, id: Uuid) -> Result<Option<Upload>, UploadError>;

    /// Persist a newly created record.
    async fn create(&self, upload: &Upload) -> Result<(), UploadError>;

    /// Persist the current state of an existing record.
    async fn save(&self, upload: &Upload) -> Result<(), UploadError>;

    /// Remove the record for `id`. Deleting a missing id is not an error.
    async fn delete(&self, id: Uuid) -> Result<(), UploadError>;

    /// Ids of records whose expiry deadline has passed, for the background
    /// sweep.
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, UploadError>;
}
