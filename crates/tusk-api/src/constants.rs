//! Protocol constants and header names

/// Protocol version advertised and accepted by this server.
pub const TUS_VERSION: &str = "1.0.0";

/// Protocol extensions this server implements.
pub const TUS_EXTENSIONS: &str = "creation,creation-defer-length,checksum,expiration,termination";

/// Required content type for append requests.
pub const OFFSET_CONTENT_TYPE: &str = "application/offset+octet-stream";

pub const HEADER_TUS_RESUMABLE: &str = "Tus-Resumable";
pub const HEADER_TUS_VERSION: &str = "Tus-Version";
pub const HEADER_TUS_EXTENSION: &str = "Tus-Extension";
pub const HEADER_TUS_MAX_SIZE: &str = "Tus-Max-Size";
pub const HEADER_TUS_CHECKSUM_ALGORITHM: &str = "Tus-Checksum-Algorithm";
pub const HEADER_UPLOAD_OFFSET: &str = "Upload-Offset";
pub const HEADER_UPLOAD_LENGTH: &str = "Upload-Length";
pub const HEADER_UPLOAD_DEFER_LENGTH: &str = "Upload-Defer-Length";
pub const HEADER_UPLOAD_METADATA: &str = "Upload-Metadata";
pub const HEADER_UPLOAD_CHECKSUM: &str = "Upload-Checksum";
pub const HEADER_UPLOAD_EXPIRES: &str = "Upload-Expires";
