//! Error types module
//!
//! This module provides the core error types used throughout tusk. All
//! protocol failures are unified under the `UploadError` enum, which every
//! operation returns as a typed outcome; nothing crosses into the adapter
//! layer as a panic or an untyped error.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like offset conflicts
    Debug,
    /// Warning level - for recoverable issues like failed writes
    Warn,
    /// Error level - for unexpected failures
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Declared length {declared} exceeds maximum {max}")]
    PayloadTooLarge { declared: i64, max: i64 },

    #[error("Upload not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unsupported checksum algorithm: {0}")]
    UnsupportedChecksumAlgorithm(String),

    #[error("Checksum mismatch")]
    ChecksumMismatch,

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Static metadata for each variant: (http_status, error_code, recoverable, log_level).
/// Reduces duplication in the accessor methods; messages stay per-variant.
fn upload_error_static_metadata(err: &UploadError) -> (u16, &'static str, bool, LogLevel) {
    match err {
        UploadError::BadRequest(_) => (400, "BAD_REQUEST", false, LogLevel::Debug),
        UploadError::PayloadTooLarge { .. } => (413, "PAYLOAD_TOO_LARGE", false, LogLevel::Debug),
        UploadError::NotFound(_) => (404, "NOT_FOUND", false, LogLevel::Debug),
        UploadError::Conflict(_) => (409, "CONFLICT", false, LogLevel::Debug),
        UploadError::UnsupportedChecksumAlgorithm(_) => {
            (400, "UNSUPPORTED_CHECKSUM_ALGORITHM", false, LogLevel::Debug)
        }
        // 460 matches what established resumable-upload servers send for a
        // failed integrity check, so clients can tell it apart from a 400.
        UploadError::ChecksumMismatch => (460, "CHECKSUM_MISMATCH", false, LogLevel::Debug),
        UploadError::WriteFailed(_) => (500, "WRITE_FAILED", true, LogLevel::Warn),
        UploadError::Repository(_) => (500, "REPOSITORY_ERROR", true, LogLevel::Error),
        UploadError::Internal(_) => (500, "INTERNAL_ERROR", true, LogLevel::Error),
    }
}

impl UploadError {
    /// HTTP status code the adapter layer should surface this error as
    pub fn http_status_code(&self) -> u16 {
        upload_error_static_metadata(self).0
    }

    /// Machine-readable error code (e.g., "CHECKSUM_MISMATCH")
    pub fn error_code(&self) -> &'static str {
        upload_error_static_metadata(self).1
    }

    /// Whether a client may retry the same request unchanged.
    /// A checksum mismatch is never retryable without re-sending correct
    /// bytes; a failed storage write is.
    pub fn is_recoverable(&self) -> bool {
        upload_error_static_metadata(self).2
    }

    /// Log level for this error
    pub fn log_level(&self) -> LogLevel {
        upload_error_static_metadata(self).3
    }
}
