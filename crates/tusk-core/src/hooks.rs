//! Completion notification hook
//!
//! The engine fires a single "received" event when an upload transitions
//! into `Completed`. Downstream processing (virus scanning, ingestion,
//! webhooks) implements this trait; the engine never depends on it doing
//! anything.

use async_trait::async_trait;
use uuid::Uuid;

/// Observer invoked exactly once per upload completion transition.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    /// Called after the final chunk of `id` has been durably accepted and
    /// the record marked `Completed`. Fire-and-forget: errors are the
    /// implementor's to handle, the upload is already complete.
    async fn upload_received(&self, id: Uuid);
}

/// No-op implementation for when nothing listens for completions
pub struct NoOpCompletionHook;

#[async_trait]
impl CompletionHook for NoOpCompletionHook {
    async fn upload_received(&self, _id: Uuid) {}
}
