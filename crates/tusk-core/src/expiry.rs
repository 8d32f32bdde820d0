//! Upload expiry policy
//!
//! An upload may be given a lifetime at creation. Once the deadline passes
//! the record is treated as gone by every operation, whether or not the
//! background sweeper has physically reclaimed it yet.

use chrono::{DateTime, Duration, Utc};

/// Computes and checks upload expiration deadlines.
///
/// With no configured lifetime, uploads never expire.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpiryPolicy {
    ttl: Option<Duration>,
}

impl ExpiryPolicy {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self { ttl }
    }

    pub fn from_secs(secs: Option<u64>) -> Self {
        Self {
            ttl: secs.map(|s| Duration::seconds(s as i64)),
        }
    }

    /// Deadline for an upload created at `now`, if expiry is configured.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.ttl.map(|ttl| now + ttl)
    }

    /// Whether a record with the given deadline is past it.
    pub fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        matches!(expires_at, Some(deadline) if now >= deadline)
    }
}
