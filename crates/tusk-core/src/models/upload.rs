use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::UploadError;

/// Sentinel declared length for uploads whose total size is not yet known.
pub const DEFERRED_LENGTH: i64 = -1;

/// Lifecycle state of an upload.
///
/// `Saving` is transient: it marks the window during which a chunk write is
/// in flight against the chunk store, so a concurrent Terminate can be
/// refused instead of pulling the bytes out from under the writer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Initial,
    Receiving,
    Saving,
    Completed,
    Terminated,
}

impl Display for UploadState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadState::Initial => write!(f, "initial"),
            UploadState::Receiving => write!(f, "receiving"),
            UploadState::Saving => write!(f, "saving"),
            UploadState::Completed => write!(f, "completed"),
            UploadState::Terminated => write!(f, "terminated"),
        }
    }
}

impl FromStr for UploadState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(UploadState::Initial),
            "receiving" => Ok(UploadState::Receiving),
            "saving" => Ok(UploadState::Saving),
            "completed" => Ok(UploadState::Completed),
            "terminated" => Ok(UploadState::Terminated),
            _ => Err(anyhow::anyhow!("Invalid upload state: {}", s)),
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// One metadata key/value pair. Values are opaque bytes; they are base64 in
/// JSON so the persisted form survives non-UTF-8 values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataEntry {
    pub key: String,
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
}

/// Insertion-ordered metadata bag, set once at upload creation and immutable
/// thereafter. The core never interprets values beyond reading `filename`
/// for logging.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadMetadata(Vec<MetadataEntry>);

impl UploadMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: Vec<(String, Vec<u8>)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| MetadataEntry { key, value })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// First value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0
            .iter()
            .map(|entry| (entry.key.as_str(), entry.value.as_slice()))
    }

    /// The `filename` value when present and valid UTF-8. Non-authoritative,
    /// used only for logging.
    pub fn filename(&self) -> Option<&str> {
        self.get("filename").and_then(|v| std::str::from_utf8(v).ok())
    }
}

/// The durable record describing one upload.
///
/// The record owns only bookkeeping (identity, declared length, accepted
/// offset, lifecycle state); the chunk store owns the byte payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Upload {
    pub id: Uuid,
    /// Total upload size in bytes, or [`DEFERRED_LENGTH`] until a later
    /// append declares it. Fixed once known.
    pub declared_length: i64,
    /// Bytes durably accepted so far. Monotonically non-decreasing; advanced
    /// only after the chunk store acknowledges a write.
    pub offset: i64,
    pub metadata: UploadMetadata,
    pub state: UploadState,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Upload {
    pub fn new(
        declared_length: i64,
        metadata: UploadMetadata,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            declared_length,
            offset: 0,
            metadata,
            state: UploadState::Initial,
            expires_at,
            created_at: Utc::now(),
        }
    }

    pub fn is_deferred(&self) -> bool {
        self.declared_length == DEFERRED_LENGTH
    }

    pub fn length_known(&self) -> bool {
        self.declared_length >= 0
    }

    pub fn is_completed(&self) -> bool {
        self.state == UploadState::Completed
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        crate::expiry::ExpiryPolicy::is_expired(self.expires_at, now)
    }

    /// Whether the record can accept another chunk at all.
    pub fn accepts_chunks(&self) -> bool {
        matches!(self.state, UploadState::Initial | UploadState::Receiving)
    }

    /// Bytes still outstanding, when the total length is known.
    pub fn remaining(&self) -> Option<i64> {
        self.length_known().then(|| self.declared_length - self.offset)
    }

    /// Declare the final length of a deferred upload. Callable once.
    pub fn declare_length(&mut self, length: i64) -> Result<(), UploadError> {
        if !self.is_deferred() {
            if self.declared_length == length {
                return Ok(());
            }
            return Err(UploadError::Conflict(format!(
                "upload length already declared as {}",
                self.declared_length
            )));
        }
        if length < self.offset {
            return Err(UploadError::Conflict(format!(
                "declared length {} is less than current offset {}",
                length, self.offset
            )));
        }
        self.declared_length = length;
        Ok(())
    }

    /// Enter the transient `Saving` state for the duration of one chunk
    /// write. Returns the prior state so a failed write can revert.
    pub fn begin_saving(&mut self) -> Result<UploadState, UploadError> {
        if !self.accepts_chunks() {
            return Err(UploadError::Conflict(format!(
                "upload in state \"{}\" cannot accept chunks",
                self.state
            )));
        }
        let prior = self.state;
        self.state = UploadState::Saving;
        Ok(prior)
    }

    /// Roll back to the state captured by [`Self::begin_saving`] after a
    /// failed write. The offset is untouched.
    pub fn revert_saving(&mut self, prior: UploadState) {
        debug_assert_eq!(self.state, UploadState::Saving);
        self.state = prior;
    }

    /// Advance the offset after `len` bytes were durably written (or for a
    /// zero-length probe that wrote nothing). Returns `true` when this
    /// chunk completed the upload.
    ///
    /// A zero-length chunk leaves a not-yet-complete record's state alone:
    /// it confirms the offset without starting reception.
    pub fn apply_chunk(&mut self, len: i64) -> bool {
        debug_assert!(len >= 0);
        self.offset += len;
        if self.length_known() && self.offset == self.declared_length {
            self.state = UploadState::Completed;
            return true;
        }
        if len > 0 || self.state == UploadState::Saving {
            self.state = UploadState::Receiving;
        }
        false
    }

    pub fn terminate(&mut self) -> Result<(), UploadError> {
        if self.state == UploadState::Saving {
            return Err(UploadError::Conflict(
                "cannot terminate upload while a chunk write is in flight".to_string(),
            ));
        }
        self.state = UploadState::Terminated;
        Ok(())
    }
}
