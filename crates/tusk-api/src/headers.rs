//! Wire codec for protocol headers
//!
//! All header parsing and encoding lives here, at the adapter boundary.
//! The engine only ever sees typed commands.

use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use tusk_core::models::UploadMetadata;
use tusk_core::UploadError;
use tusk_services::DeclaredChecksum;

use crate::constants::HEADER_TUS_RESUMABLE;

/// Every request must carry the protocol version header.
pub fn require_tus_header(headers: &HeaderMap) -> Result<(), UploadError> {
    if headers.contains_key(HEADER_TUS_RESUMABLE) {
        Ok(())
    } else {
        Err(UploadError::BadRequest(format!(
            "Missing \"{}\" header",
            HEADER_TUS_RESUMABLE
        )))
    }
}

/// Read an optional header as a string, rejecting non-ASCII values.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, UploadError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| UploadError::BadRequest(format!("Invalid \"{}\" header", name))),
    }
}

/// Read an optional integer header.
pub fn header_i64(headers: &HeaderMap, name: &str) -> Result<Option<i64>, UploadError> {
    match header_str(headers, name)? {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| UploadError::BadRequest(format!("Invalid \"{}\" header: {}", name, raw))),
    }
}

/// Decode the metadata header: comma-separated `key base64(value)` pairs,
/// value optional. Order is preserved.
pub fn parse_upload_metadata(header: &str) -> Result<UploadMetadata, UploadError> {
    let mut pairs = Vec::new();

    for part in header.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let mut fields = part.splitn(2, ' ');
        let key = fields.next().unwrap_or_default().to_string();
        if key.is_empty() {
            return Err(UploadError::BadRequest(
                "Metadata key must not be empty".to_string(),
            ));
        }

        let value = match fields.next().map(str::trim) {
            Some(encoded) if !encoded.is_empty() => {
                STANDARD.decode(encoded.as_bytes()).map_err(|_| {
                    UploadError::BadRequest(format!(
                        "Metadata value for \"{}\" is not valid base64",
                        key
                    ))
                })?
            }
            _ => Vec::new(),
        };

        pairs.push((key, value));
    }

    Ok(UploadMetadata::from_pairs(pairs))
}

/// Encode metadata back into its header form, preserving order.
pub fn encode_upload_metadata(metadata: &UploadMetadata) -> String {
    metadata
        .iter()
        .map(|(key, value)| {
            if value.is_empty() {
                key.to_string()
            } else {
                format!("{} {}", key, STANDARD.encode(value))
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse the checksum header: `<algorithm> <base64 digest>`.
pub fn parse_upload_checksum(header: &str) -> Result<DeclaredChecksum, UploadError> {
    let mut fields = header.trim().splitn(2, ' ');
    let algorithm = fields.next().unwrap_or_default().to_string();
    let encoded = fields.next().map(str::trim).unwrap_or_default();

    if algorithm.is_empty() || encoded.is_empty() {
        return Err(UploadError::BadRequest(
            "Checksum header must be \"<algorithm> <base64 digest>\"".to_string(),
        ));
    }

    let digest = STANDARD.decode(encoded.as_bytes()).map_err(|_| {
        UploadError::BadRequest("Checksum digest is not valid base64".to_string())
    })?;

    Ok(DeclaredChecksum { algorithm, digest })
}

/// Format an expiry deadline the way clients expect it (RFC 7231 date).
pub fn format_expires(expires_at: &DateTime<Utc>) -> String {
    expires_at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
