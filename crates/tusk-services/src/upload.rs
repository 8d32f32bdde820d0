//! Upload protocol engine
//!
//! `UploadService` owns every protocol invariant: offset validation,
//! checksum gating, the state machine around chunk writes, completion
//! detection and expiry. The HTTP layer parses requests into the typed
//! commands below and maps the typed outcomes back onto the wire; nothing
//! protocol-relevant happens outside this module.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use tusk_core::models::{Upload, UploadMetadata, DEFERRED_LENGTH};
use tusk_core::{ChecksumVerifier, CompletionHook, ExpiryPolicy, UploadError};
use tusk_db::UploadRepository;
use tusk_storage::ChunkStore;

/// Request to create a new upload.
#[derive(Debug)]
pub struct CreateUpload {
    /// Total size in bytes; `None` when the client did not declare one.
    pub declared_length: Option<i64>,
    /// Explicit signal that the length will be declared by a later append.
    pub defer_length: bool,
    pub metadata: UploadMetadata,
}

/// Declared integrity digest for one chunk.
#[derive(Debug, Clone)]
pub struct DeclaredChecksum {
    /// Algorithm name as the client spelled it (e.g. "sha1").
    pub algorithm: String,
    pub digest: Vec<u8>,
}

/// Request to append one chunk to an upload.
#[derive(Debug)]
pub struct AppendChunk {
    pub id: Uuid,
    /// The offset the client believes is current. Must match exactly.
    pub expected_offset: i64,
    pub chunk: Bytes,
    pub checksum: Option<DeclaredChecksum>,
    /// Finalizes a deferred length; ignored when equal to the known length.
    pub declared_length: Option<i64>,
}

/// Outcome of a successful create.
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub id: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of a successful inspect.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadInfo {
    pub offset: i64,
    /// `None` while the length is deferred.
    pub declared_length: Option<i64>,
    pub metadata: UploadMetadata,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of a successful append.
#[derive(Debug, Clone, PartialEq)]
pub struct Appended {
    pub offset: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub completed: bool,
}

/// The protocol engine.
///
/// Operations on different upload ids run fully in parallel. Operations on
/// the same id are serialized by a per-id async mutex held across the
/// chunk-store write, which is what makes check-offset, write,
/// advance-offset safe against concurrent appends.
pub struct UploadService {
    repository: Arc<dyn UploadRepository>,
    chunk_store: Arc<dyn ChunkStore>,
    verifier: ChecksumVerifier,
    expiry: ExpiryPolicy,
    hook: Arc<dyn CompletionHook>,
    max_upload_size: i64,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl UploadService {
    pub fn new(
        repository: Arc<dyn UploadRepository>,
        chunk_store: Arc<dyn ChunkStore>,
        verifier: ChecksumVerifier,
        expiry: ExpiryPolicy,
        hook: Arc<dyn CompletionHook>,
        max_upload_size: i64,
    ) -> Self {
        Self {
            repository,
            chunk_store,
            verifier,
            expiry,
            hook,
            max_upload_size,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id).or_default().clone()
    }

    async fn drop_lock(&self, id: Uuid) {
        self.locks.lock().await.remove(&id);
    }

    /// Load a record, treating unknown, terminated and expired ids
    /// identically: callers cannot tell a stale record from one that never
    /// existed.
    async fn load_live(&self, id: Uuid) -> Result<Upload, UploadError> {
        let upload = self
            .repository
            .load(id)
            .await?
            .ok_or_else(|| UploadError::NotFound(id.to_string()))?;

        if upload.is_expired(Utc::now())
            || upload.state == tusk_core::models::UploadState::Terminated
        {
            return Err(UploadError::NotFound(id.to_string()));
        }

        Ok(upload)
    }

    /// Create a new upload record.
    pub async fn create(&self, cmd: CreateUpload) -> Result<Created, UploadError> {
        let declared_length = match cmd.declared_length {
            Some(length) if length >= 0 => {
                if length > self.max_upload_size {
                    return Err(UploadError::PayloadTooLarge {
                        declared: length,
                        max: self.max_upload_size,
                    });
                }
                length
            }
            // No usable length: the client must have said so explicitly.
            _ if cmd.defer_length => DEFERRED_LENGTH,
            _ => {
                return Err(UploadError::BadRequest(
                    "upload length missing and length deferral not indicated".to_string(),
                ))
            }
        };

        let expires_at = self.expiry.expires_at(Utc::now());
        let upload = Upload::new(declared_length, cmd.metadata, expires_at);
        self.repository.create(&upload).await?;

        tracing::info!(
            id = %upload.id,
            declared_length,
            deferred = upload.is_deferred(),
            filename = upload.metadata.filename().unwrap_or(""),
            "Upload created"
        );

        Ok(Created {
            id: upload.id,
            expires_at,
        })
    }

    /// Report the current offset and immutable attributes of an upload.
    pub async fn inspect(&self, id: Uuid) -> Result<UploadInfo, UploadError> {
        let upload = self.load_live(id).await?;

        Ok(UploadInfo {
            offset: upload.offset,
            declared_length: upload.length_known().then_some(upload.declared_length),
            metadata: upload.metadata,
            expires_at: upload.expires_at,
        })
    }

    /// Append one chunk. All validation happens before any mutation; a
    /// failed storage write leaves the record exactly as it was.
    pub async fn append(&self, cmd: AppendChunk) -> Result<Appended, UploadError> {
        let lock = self.lock_for(cmd.id).await;
        let _guard = lock.lock().await;

        let mut upload = self.load_live(cmd.id).await?;

        if cmd.expected_offset != upload.offset {
            return Err(UploadError::Conflict(format!(
                "expected offset {} does not match current offset {}",
                cmd.expected_offset, upload.offset
            )));
        }

        if !upload.accepts_chunks() {
            return Err(UploadError::Conflict(format!(
                "upload in state \"{}\" cannot accept chunks",
                upload.state
            )));
        }

        let mut length_declared = false;
        if let Some(length) = cmd.declared_length {
            if length > self.max_upload_size {
                return Err(UploadError::PayloadTooLarge {
                    declared: length,
                    max: self.max_upload_size,
                });
            }
            let was_deferred = upload.is_deferred();
            upload.declare_length(length)?;
            length_declared = was_deferred;
        }

        if let Some(ref checksum) = cmd.checksum {
            if !self
                .verifier
                .verify(&checksum.algorithm, &checksum.digest, &cmd.chunk)?
            {
                return Err(UploadError::ChecksumMismatch);
            }
        }

        let chunk_len = cmd.chunk.len() as i64;
        if let Some(remaining) = upload.remaining() {
            if chunk_len > remaining {
                return Err(UploadError::BadRequest(format!(
                    "chunk of {} bytes exceeds the {} bytes remaining",
                    chunk_len, remaining
                )));
            }
        } else if upload.offset + chunk_len > self.max_upload_size {
            // A deferred-length upload is still bounded by the configured
            // maximum.
            return Err(UploadError::PayloadTooLarge {
                declared: upload.offset + chunk_len,
                max: self.max_upload_size,
            });
        }

        // Zero-length probe: confirms the offset (and may complete a
        // zero-length upload) without ever touching the chunk store.
        if cmd.chunk.is_empty() {
            let completed = upload.apply_chunk(0);
            if completed {
                self.chunk_store
                    .finalize(upload.id)
                    .await
                    .map_err(|e| UploadError::WriteFailed(e.to_string()))?;
            }
            if completed || length_declared {
                self.repository.save(&upload).await?;
            }
            if completed {
                self.notify_completed(upload.id).await;
            }
            return Ok(Appended {
                offset: upload.offset,
                expires_at: upload.expires_at,
                completed,
            });
        }

        // Enter the transient write state and persist it, so a crash or a
        // concurrent observer sees the write in flight.
        let prior = upload.begin_saving()?;
        self.repository.save(&upload).await?;

        let new_size = match self.chunk_store.append(upload.id, cmd.chunk).await {
            Ok(size) => size,
            Err(e) => {
                upload.revert_saving(prior);
                if let Err(save_err) = self.repository.save(&upload).await {
                    tracing::error!(
                        id = %upload.id,
                        error = %save_err,
                        "Failed to roll back record state after failed write"
                    );
                }
                return Err(UploadError::WriteFailed(e.to_string()));
            }
        };

        let completed = upload.apply_chunk(chunk_len);

        if new_size != upload.offset as u64 {
            tracing::warn!(
                id = %upload.id,
                stored_bytes = new_size,
                offset = upload.offset,
                "Chunk store size diverges from record offset"
            );
        }

        if completed {
            if let Err(e) = self.chunk_store.finalize(upload.id).await {
                tracing::error!(id = %upload.id, error = %e, "Failed to finalize stored bytes");
            }
        }

        self.repository.save(&upload).await?;

        tracing::debug!(
            id = %upload.id,
            chunk_bytes = chunk_len,
            offset = upload.offset,
            completed,
            "Chunk accepted"
        );

        if completed {
            self.notify_completed(upload.id).await;
        }

        Ok(Appended {
            offset: upload.offset,
            expires_at: upload.expires_at,
            completed,
        })
    }

    /// Terminate an upload, discarding any stored bytes.
    pub async fn terminate(&self, id: Uuid) -> Result<(), UploadError> {
        let lock = self.lock_for(id).await;
        // An in-flight append holds the per-id lock across its write; do not
        // wait for it, refuse to terminate mid-write.
        let _guard = lock.try_lock().map_err(|_| {
            UploadError::Conflict("cannot terminate upload while a chunk write is in flight".to_string())
        })?;

        let mut upload = self.load_live(id).await?;
        upload.terminate()?;

        self.chunk_store
            .discard(id)
            .await
            .map_err(|e| UploadError::Internal(format!("failed to discard stored bytes: {}", e)))?;

        self.repository.delete(id).await?;
        self.drop_lock(id).await;

        tracing::info!(id = %id, "Upload terminated");

        Ok(())
    }

    async fn notify_completed(&self, id: Uuid) {
        tracing::info!(id = %id, "Upload completed");
        self.hook.upload_received(id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tusk_core::models::UploadState;
    use tusk_core::{ChecksumAlgorithm, NoOpCompletionHook};
    use tusk_db::MemoryUploadRepository;
    use tusk_storage::{MemoryChunkStore, StorageError, StorageResult};

    const MAX_SIZE: i64 = 1024 * 1024;

    struct CountingHook {
        completions: AtomicUsize,
    }

    #[async_trait]
    impl CompletionHook for CountingHook {
        async fn upload_received(&self, _id: Uuid) {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Chunk store whose next append fails, for write-failure rollback tests.
    struct FlakyChunkStore {
        inner: MemoryChunkStore,
        fail_next: AtomicBool,
    }

    impl FlakyChunkStore {
        fn new() -> Self {
            Self {
                inner: MemoryChunkStore::new(),
                fail_next: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ChunkStore for FlakyChunkStore {
        async fn append(&self, id: Uuid, chunk: Bytes) -> StorageResult<u64> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(StorageError::AppendFailed("injected failure".to_string()));
            }
            self.inner.append(id, chunk).await
        }

        async fn size(&self, id: Uuid) -> StorageResult<u64> {
            self.inner.size(id).await
        }

        async fn finalize(&self, id: Uuid) -> StorageResult<()> {
            self.inner.finalize(id).await
        }

        async fn discard(&self, id: Uuid) -> StorageResult<()> {
            self.inner.discard(id).await
        }
    }

    /// Chunk store that signals when an append starts and then blocks until
    /// released, for mid-write concurrency tests.
    struct GatedChunkStore {
        inner: MemoryChunkStore,
        started: Notify,
        release: Notify,
    }

    impl GatedChunkStore {
        fn new() -> Self {
            Self {
                inner: MemoryChunkStore::new(),
                started: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl ChunkStore for GatedChunkStore {
        async fn append(&self, id: Uuid, chunk: Bytes) -> StorageResult<u64> {
            self.started.notify_one();
            self.release.notified().await;
            self.inner.append(id, chunk).await
        }

        async fn size(&self, id: Uuid) -> StorageResult<u64> {
            self.inner.size(id).await
        }

        async fn finalize(&self, id: Uuid) -> StorageResult<()> {
            self.inner.finalize(id).await
        }

        async fn discard(&self, id: Uuid) -> StorageResult<()> {
            self.inner.discard(id).await
        }
    }

    fn service_with(
        chunk_store: Arc<dyn ChunkStore>,
        expiry: ExpiryPolicy,
        hook: Arc<dyn CompletionHook>,
    ) -> UploadService {
        UploadService::new(
            Arc::new(MemoryUploadRepository::new()),
            chunk_store,
            ChecksumVerifier::default(),
            expiry,
            hook,
            MAX_SIZE,
        )
    }

    fn service() -> UploadService {
        service_with(
            Arc::new(MemoryChunkStore::new()),
            ExpiryPolicy::default(),
            Arc::new(NoOpCompletionHook),
        )
    }

    fn create_cmd(declared_length: Option<i64>, defer_length: bool) -> CreateUpload {
        CreateUpload {
            declared_length,
            defer_length,
            metadata: UploadMetadata::new(),
        }
    }

    fn append_cmd(id: Uuid, expected_offset: i64, chunk: &'static [u8]) -> AppendChunk {
        AppendChunk {
            id,
            expected_offset,
            chunk: Bytes::from_static(chunk),
            checksum: None,
            declared_length: None,
        }
    }

    #[tokio::test]
    async fn test_create_append_to_completion() {
        // Create 100 bytes, append 40 then 60; offsets and states follow.
        let service = service();
        let created = service.create(create_cmd(Some(100), false)).await.unwrap();

        let appended = service
            .append(append_cmd(created.id, 0, &[7u8; 40]))
            .await
            .unwrap();
        assert_eq!(appended.offset, 40);
        assert!(!appended.completed);

        let info = service.inspect(created.id).await.unwrap();
        assert_eq!(info.offset, 40);
        assert_eq!(info.declared_length, Some(100));

        let appended = service
            .append(append_cmd(created.id, 40, &[7u8; 60]))
            .await
            .unwrap();
        assert_eq!(appended.offset, 100);
        assert!(appended.completed);

        let info = service.inspect(created.id).await.unwrap();
        assert_eq!(info.offset, 100);
    }

    #[tokio::test]
    async fn test_stale_offset_returns_conflict_without_mutation() {
        let service = service();
        let created = service.create(create_cmd(Some(10), false)).await.unwrap();

        service
            .append(append_cmd(created.id, 0, b"12345"))
            .await
            .unwrap();

        // Replay of the first chunk with a stale offset.
        let result = service.append(append_cmd(created.id, 0, b"12345")).await;
        assert!(matches!(result, Err(UploadError::Conflict(_))));

        let info = service.inspect(created.id).await.unwrap();
        assert_eq!(info.offset, 5);
    }

    #[tokio::test]
    async fn test_create_requires_length_or_defer_signal() {
        let service = service();

        let result = service.create(create_cmd(None, false)).await;
        assert!(matches!(result, Err(UploadError::BadRequest(_))));

        let result = service.create(create_cmd(Some(-1), false)).await;
        assert!(matches!(result, Err(UploadError::BadRequest(_))));

        let created = service.create(create_cmd(None, true)).await.unwrap();
        let info = service.inspect(created.id).await.unwrap();
        assert_eq!(info.declared_length, None);
    }

    #[tokio::test]
    async fn test_create_rejects_oversized_declared_length() {
        let service = service();
        let result = service.create(create_cmd(Some(MAX_SIZE + 1), false)).await;
        assert!(matches!(result, Err(UploadError::PayloadTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_checksum_gates_the_write() {
        let store = Arc::new(MemoryChunkStore::new());
        let service = service_with(
            store.clone(),
            ExpiryPolicy::default(),
            Arc::new(NoOpCompletionHook),
        );
        let created = service.create(create_cmd(None, true)).await.unwrap();

        let mut cmd = append_cmd(created.id, 0, &[1u8; 20]);
        cmd.checksum = Some(DeclaredChecksum {
            algorithm: "sha1".to_string(),
            digest: ChecksumAlgorithm::Sha1.digest(b"different bytes"),
        });
        let result = service.append(cmd).await;
        assert!(matches!(result, Err(UploadError::ChecksumMismatch)));

        // Chunk never reached the store, offset never advanced.
        assert!(store.stored_bytes(created.id).await.is_none());
        assert_eq!(service.inspect(created.id).await.unwrap().offset, 0);

        // Same chunk with the right digest goes through.
        let mut cmd = append_cmd(created.id, 0, &[1u8; 20]);
        cmd.checksum = Some(DeclaredChecksum {
            algorithm: "sha1".to_string(),
            digest: ChecksumAlgorithm::Sha1.digest(&[1u8; 20]),
        });
        assert_eq!(service.append(cmd).await.unwrap().offset, 20);
    }

    #[tokio::test]
    async fn test_unsupported_checksum_algorithm_is_distinct() {
        let service = service();
        let created = service.create(create_cmd(Some(10), false)).await.unwrap();

        let mut cmd = append_cmd(created.id, 0, b"12345");
        cmd.checksum = Some(DeclaredChecksum {
            algorithm: "crc32".to_string(),
            digest: vec![0; 4],
        });
        let result = service.append(cmd).await;
        assert!(matches!(
            result,
            Err(UploadError::UnsupportedChecksumAlgorithm(_))
        ));
        assert_eq!(service.inspect(created.id).await.unwrap().offset, 0);
    }

    #[tokio::test]
    async fn test_failed_write_reverts_record() {
        let store = Arc::new(FlakyChunkStore::new());
        let service = UploadService::new(
            Arc::new(MemoryUploadRepository::new()),
            store.clone(),
            ChecksumVerifier::default(),
            ExpiryPolicy::default(),
            Arc::new(NoOpCompletionHook),
            MAX_SIZE,
        );
        let created = service.create(create_cmd(Some(100), false)).await.unwrap();

        store.fail_next.store(true, Ordering::SeqCst);
        let result = service.append(append_cmd(created.id, 0, &[9u8; 30])).await;
        assert!(matches!(result, Err(UploadError::WriteFailed(_))));

        // Atomic from the caller's view: nothing advanced, upload usable.
        let info = service.inspect(created.id).await.unwrap();
        assert_eq!(info.offset, 0);

        let appended = service
            .append(append_cmd(created.id, 0, &[9u8; 30]))
            .await
            .unwrap();
        assert_eq!(appended.offset, 30);
    }

    #[tokio::test]
    async fn test_zero_length_chunk_is_accepted_probe() {
        let service = service();
        let created = service.create(create_cmd(Some(100), false)).await.unwrap();

        service
            .append(append_cmd(created.id, 0, &[2u8; 10]))
            .await
            .unwrap();

        let appended = service.append(append_cmd(created.id, 10, b"")).await.unwrap();
        assert_eq!(appended.offset, 10);
        assert!(!appended.completed);
    }

    #[tokio::test]
    async fn test_zero_declared_length_completes_via_empty_probe() {
        let hook = Arc::new(CountingHook {
            completions: AtomicUsize::new(0),
        });
        let service = service_with(
            Arc::new(MemoryChunkStore::new()),
            ExpiryPolicy::default(),
            hook.clone(),
        );
        let created = service.create(create_cmd(Some(0), false)).await.unwrap();

        let appended = service.append(append_cmd(created.id, 0, b"")).await.unwrap();
        assert!(appended.completed);
        assert_eq!(appended.offset, 0);
        assert_eq!(hook.completions.load(Ordering::SeqCst), 1);

        // Completed uploads accept nothing further, probes included.
        let result = service.append(append_cmd(created.id, 0, b"")).await;
        assert!(matches!(result, Err(UploadError::Conflict(_))));
        assert_eq!(hook.completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_completion_hook_fires_exactly_once() {
        let hook = Arc::new(CountingHook {
            completions: AtomicUsize::new(0),
        });
        let service = service_with(
            Arc::new(MemoryChunkStore::new()),
            ExpiryPolicy::default(),
            hook.clone(),
        );
        let created = service.create(create_cmd(Some(8), false)).await.unwrap();

        service
            .append(append_cmd(created.id, 0, b"1234"))
            .await
            .unwrap();
        assert_eq!(hook.completions.load(Ordering::SeqCst), 0);

        let appended = service
            .append(append_cmd(created.id, 4, b"5678"))
            .await
            .unwrap();
        assert!(appended.completed);
        assert_eq!(hook.completions.load(Ordering::SeqCst), 1);

        let result = service.append(append_cmd(created.id, 8, b"x")).await;
        assert!(matches!(result, Err(UploadError::Conflict(_))));
        assert_eq!(hook.completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_chunk_beyond_declared_length_rejected() {
        let service = service();
        let created = service.create(create_cmd(Some(10), false)).await.unwrap();

        let result = service.append(append_cmd(created.id, 0, &[0u8; 11])).await;
        assert!(matches!(result, Err(UploadError::BadRequest(_))));
        assert_eq!(service.inspect(created.id).await.unwrap().offset, 0);
    }

    #[tokio::test]
    async fn test_deferred_upload_still_bounded_by_max_size() {
        let service = UploadService::new(
            Arc::new(MemoryUploadRepository::new()),
            Arc::new(MemoryChunkStore::new()),
            ChecksumVerifier::default(),
            ExpiryPolicy::default(),
            Arc::new(NoOpCompletionHook),
            16,
        );
        let created = service.create(create_cmd(None, true)).await.unwrap();

        service
            .append(append_cmd(created.id, 0, &[0u8; 10]))
            .await
            .unwrap();

        let result = service.append(append_cmd(created.id, 10, &[0u8; 10])).await;
        assert!(matches!(result, Err(UploadError::PayloadTooLarge { .. })));
        assert_eq!(service.inspect(created.id).await.unwrap().offset, 10);
    }

    #[tokio::test]
    async fn test_deferred_length_finalized_by_append() {
        let service = service();
        let created = service.create(create_cmd(None, true)).await.unwrap();

        service
            .append(append_cmd(created.id, 0, &[5u8; 20]))
            .await
            .unwrap();

        let mut cmd = append_cmd(created.id, 20, &[5u8; 10]);
        cmd.declared_length = Some(30);
        let appended = service.append(cmd).await.unwrap();
        assert!(appended.completed);
        assert_eq!(appended.offset, 30);
        assert_eq!(
            service.inspect(created.id).await.unwrap().declared_length,
            Some(30)
        );
    }

    #[tokio::test]
    async fn test_deferred_length_conflicts_once_set() {
        let service = service();
        let created = service.create(create_cmd(Some(50), false)).await.unwrap();

        let mut cmd = append_cmd(created.id, 0, &[5u8; 10]);
        cmd.declared_length = Some(60);
        let result = service.append(cmd).await;
        assert!(matches!(result, Err(UploadError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_expired_upload_behaves_as_never_created() {
        let service = service_with(
            Arc::new(MemoryChunkStore::new()),
            ExpiryPolicy::from_secs(Some(0)),
            Arc::new(NoOpCompletionHook),
        );
        let created = service.create(create_cmd(Some(10), false)).await.unwrap();
        assert!(created.expires_at.is_some());

        assert!(matches!(
            service.inspect(created.id).await,
            Err(UploadError::NotFound(_))
        ));
        assert!(matches!(
            service.append(append_cmd(created.id, 0, b"12345")).await,
            Err(UploadError::NotFound(_))
        ));
        assert!(matches!(
            service.terminate(created.id).await,
            Err(UploadError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_terminate_then_everything_is_not_found() {
        let store = Arc::new(MemoryChunkStore::new());
        let service = service_with(
            store.clone(),
            ExpiryPolicy::default(),
            Arc::new(NoOpCompletionHook),
        );
        let created = service.create(create_cmd(Some(100), false)).await.unwrap();
        service
            .append(append_cmd(created.id, 0, &[3u8; 10]))
            .await
            .unwrap();

        service.terminate(created.id).await.unwrap();

        // Partial bytes are gone and the id never resolves again.
        assert!(store.stored_bytes(created.id).await.is_none());
        assert!(matches!(
            service.inspect(created.id).await,
            Err(UploadError::NotFound(_))
        ));
        assert!(matches!(
            service.terminate(created.id).await,
            Err(UploadError::NotFound(_))
        ));
        assert!(matches!(
            service.append(append_cmd(created.id, 10, b"x")).await,
            Err(UploadError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_terminate_on_completed_upload_succeeds() {
        let service = service();
        let created = service.create(create_cmd(Some(4), false)).await.unwrap();
        service
            .append(append_cmd(created.id, 0, b"done"))
            .await
            .unwrap();

        service.terminate(created.id).await.unwrap();
        assert!(matches!(
            service.inspect(created.id).await,
            Err(UploadError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_terminate_mid_write_conflicts_then_succeeds() {
        let store = Arc::new(GatedChunkStore::new());
        let service = Arc::new(UploadService::new(
            Arc::new(MemoryUploadRepository::new()),
            store.clone(),
            ChecksumVerifier::default(),
            ExpiryPolicy::default(),
            Arc::new(NoOpCompletionHook),
            MAX_SIZE,
        ));
        let created = service.create(create_cmd(Some(100), false)).await.unwrap();

        let appender = {
            let service = service.clone();
            let id = created.id;
            tokio::spawn(async move { service.append(append_cmd(id, 0, &[8u8; 40])).await })
        };

        // Wait until the append holds the per-id lock inside its write.
        store.started.notified().await;

        let result = service.terminate(created.id).await;
        assert!(matches!(result, Err(UploadError::Conflict(_))));

        // Release the write; the append completes normally.
        store.release.notify_one();
        let appended = appender.await.unwrap().unwrap();
        assert_eq!(appended.offset, 40);

        service.terminate(created.id).await.unwrap();
        assert!(matches!(
            service.inspect(created.id).await,
            Err(UploadError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_appends_serialize_one_wins() {
        let store = Arc::new(GatedChunkStore::new());
        let service = Arc::new(UploadService::new(
            Arc::new(MemoryUploadRepository::new()),
            store.clone(),
            ChecksumVerifier::default(),
            ExpiryPolicy::default(),
            Arc::new(NoOpCompletionHook),
            MAX_SIZE,
        ));
        let created = service.create(create_cmd(Some(100), false)).await.unwrap();

        let first = {
            let service = service.clone();
            let id = created.id;
            tokio::spawn(async move { service.append(append_cmd(id, 0, &[1u8; 30])).await })
        };
        store.started.notified().await;

        let second = {
            let service = service.clone();
            let id = created.id;
            tokio::spawn(async move { service.append(append_cmd(id, 0, &[2u8; 30])).await })
        };

        // Both claim offset 0; the second waits on the per-id lock and must
        // lose the offset check once the first lands.
        store.release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.offset, 30);

        store.release.notify_one();
        let second = second.await.unwrap();
        assert!(matches!(second, Err(UploadError::Conflict(_))));

        let info = service.inspect(created.id).await.unwrap();
        assert_eq!(info.offset, 30);
        assert_eq!(store.inner.stored_bytes(created.id).await.unwrap().len(), 30);
    }

    #[tokio::test]
    async fn test_offset_accumulates_sum_of_chunks() {
        let service = service();
        let created = service.create(create_cmd(None, true)).await.unwrap();

        let mut expected = 0i64;
        for chunk in [&[0u8; 13][..], &[0u8; 1][..], &[0u8; 29][..]] {
            let appended = service
                .append(AppendChunk {
                    id: created.id,
                    expected_offset: expected,
                    chunk: Bytes::copy_from_slice(chunk),
                    checksum: None,
                    declared_length: None,
                })
                .await
                .unwrap();
            expected += chunk.len() as i64;
            assert_eq!(appended.offset, expected);
        }
    }

    #[tokio::test]
    async fn test_metadata_is_returned_verbatim() {
        let service = service();
        let metadata = UploadMetadata::from_pairs(vec![
            ("filename".to_string(), b"cat.png".to_vec()),
            ("owner".to_string(), b"alice".to_vec()),
        ]);
        let created = service
            .create(CreateUpload {
                declared_length: Some(10),
                defer_length: false,
                metadata: metadata.clone(),
            })
            .await
            .unwrap();

        let info = service.inspect(created.id).await.unwrap();
        assert_eq!(info.metadata, metadata);
    }

    #[tokio::test]
    async fn test_saving_state_visible_during_write() {
        let store = Arc::new(GatedChunkStore::new());
        let repository = Arc::new(MemoryUploadRepository::new());
        let service = Arc::new(UploadService::new(
            repository.clone(),
            store.clone(),
            ChecksumVerifier::default(),
            ExpiryPolicy::default(),
            Arc::new(NoOpCompletionHook),
            MAX_SIZE,
        ));
        let created = service.create(create_cmd(Some(100), false)).await.unwrap();

        let appender = {
            let service = service.clone();
            let id = created.id;
            tokio::spawn(async move { service.append(append_cmd(id, 0, &[4u8; 10])).await })
        };
        store.started.notified().await;

        let record = repository.load(created.id).await.unwrap().unwrap();
        assert_eq!(record.state, UploadState::Saving);
        assert_eq!(record.offset, 0);

        store.release.notify_one();
        appender.await.unwrap().unwrap();

        let record = repository.load(created.id).await.unwrap().unwrap();
        assert_eq!(record.state, UploadState::Receiving);
        assert_eq!(record.offset, 10);
    }
}
