//! Upload lifecycle handlers
//!
//! Thin adapters: each handler parses headers into a typed command, calls
//! the protocol engine, and maps the typed outcome onto status and headers.
//! No invariant is enforced here.

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use axum::http::HeaderMap;
use tusk_core::UploadError;
use tusk_services::{AppendChunk, CreateUpload};

use crate::constants::{
    HEADER_TUS_CHECKSUM_ALGORITHM, HEADER_TUS_EXTENSION, HEADER_TUS_MAX_SIZE,
    HEADER_TUS_RESUMABLE, HEADER_TUS_VERSION, HEADER_UPLOAD_CHECKSUM,
    HEADER_UPLOAD_DEFER_LENGTH, HEADER_UPLOAD_EXPIRES, HEADER_UPLOAD_LENGTH,
    HEADER_UPLOAD_METADATA, HEADER_UPLOAD_OFFSET, OFFSET_CONTENT_TYPE, TUS_EXTENSIONS,
    TUS_VERSION,
};
use crate::error::HttpUploadError;
use crate::headers::{
    encode_upload_metadata, format_expires, header_i64, header_str, parse_upload_checksum,
    parse_upload_metadata, require_tus_header,
};
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct CreatedResponse {
    id: Uuid,
    location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct AppendedResponse {
    offset: i64,
}

fn insert_tus_version(response: &mut Response) {
    response
        .headers_mut()
        .insert(HEADER_TUS_RESUMABLE, HeaderValue::from_static(TUS_VERSION));
}

fn insert_header(response: &mut Response, name: &'static str, value: String) {
    if let Ok(value) = HeaderValue::from_str(&value) {
        response.headers_mut().insert(name, value);
    }
}

/// OPTIONS /files - advertise server capabilities.
pub async fn upload_capabilities(State(state): State<Arc<AppState>>) -> Response {
    let algorithms = state
        .config
        .checksum_algorithms
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");

    let mut response = StatusCode::NO_CONTENT.into_response();
    insert_tus_version(&mut response);
    insert_header(&mut response, HEADER_TUS_VERSION, TUS_VERSION.to_string());
    insert_header(
        &mut response,
        HEADER_TUS_EXTENSION,
        TUS_EXTENSIONS.to_string(),
    );
    insert_header(
        &mut response,
        HEADER_TUS_MAX_SIZE,
        state.config.max_upload_size_bytes.to_string(),
    );
    insert_header(&mut response, HEADER_TUS_CHECKSUM_ALGORITHM, algorithms);
    response
}

/// POST /files - create a new upload.
pub async fn create_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, HttpUploadError> {
    require_tus_header(&headers)?;

    let declared_length = header_i64(&headers, HEADER_UPLOAD_LENGTH)?;

    let defer_length = match header_str(&headers, HEADER_UPLOAD_DEFER_LENGTH)? {
        None => false,
        Some("1") => true,
        Some(other) => {
            return Err(UploadError::BadRequest(format!(
                "Invalid \"{}\" header: {} (must be 1)",
                HEADER_UPLOAD_DEFER_LENGTH, other
            ))
            .into())
        }
    };

    let metadata = header_str(&headers, HEADER_UPLOAD_METADATA)?
        .map(parse_upload_metadata)
        .transpose()?
        .unwrap_or_default();

    let created = state
        .service
        .create(CreateUpload {
            declared_length,
            defer_length,
            metadata,
        })
        .await?;

    let location = format!("/files/{}", created.id);

    let mut response = if state.config.response_body_enabled {
        (
            StatusCode::CREATED,
            Json(CreatedResponse {
                id: created.id,
                location: location.clone(),
                expires_at: created.expires_at,
            }),
        )
            .into_response()
    } else {
        StatusCode::CREATED.into_response()
    };

    insert_tus_version(&mut response);
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    if let Some(expires_at) = created.expires_at {
        insert_header(
            &mut response,
            HEADER_UPLOAD_EXPIRES,
            format_expires(&expires_at),
        );
    }

    Ok(response)
}

/// HEAD /files/{id} - report current offset and upload attributes.
pub async fn upload_info(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, HttpUploadError> {
    require_tus_header(&headers)?;

    let info = state.service.inspect(id).await?;

    let mut response = StatusCode::OK.into_response();
    insert_tus_version(&mut response);
    insert_header(&mut response, HEADER_UPLOAD_OFFSET, info.offset.to_string());
    if let Some(length) = info.declared_length {
        insert_header(&mut response, HEADER_UPLOAD_LENGTH, length.to_string());
    }
    if !info.metadata.is_empty() {
        insert_header(
            &mut response,
            HEADER_UPLOAD_METADATA,
            encode_upload_metadata(&info.metadata),
        );
    }
    if let Some(expires_at) = info.expires_at {
        insert_header(
            &mut response,
            HEADER_UPLOAD_EXPIRES,
            format_expires(&expires_at),
        );
    }
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    Ok(response)
}

/// PATCH /files/{id} - append one chunk at the declared offset.
pub async fn append_chunk(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpUploadError> {
    require_tus_header(&headers)?;

    match header_str(&headers, header::CONTENT_TYPE.as_str())? {
        Some(OFFSET_CONTENT_TYPE) => {}
        other => {
            return Err(UploadError::BadRequest(format!(
                "Invalid value for \"Content-Type\" header: {}. Expected \"{}\"",
                other.unwrap_or(""),
                OFFSET_CONTENT_TYPE
            ))
            .into())
        }
    }

    let expected_offset = header_i64(&headers, HEADER_UPLOAD_OFFSET)?.ok_or_else(|| {
        UploadError::BadRequest(format!("Missing \"{}\" header", HEADER_UPLOAD_OFFSET))
    })?;

    let checksum = header_str(&headers, HEADER_UPLOAD_CHECKSUM)?
        .map(parse_upload_checksum)
        .transpose()?;

    let declared_length = header_i64(&headers, HEADER_UPLOAD_LENGTH)?;

    let appended = state
        .service
        .append(AppendChunk {
            id,
            expected_offset,
            chunk: body,
            checksum,
            declared_length,
        })
        .await?;

    // A 204 cannot carry a body; when bodies are enabled the append
    // response downgrades to a plain 200.
    let mut response = if state.config.response_body_enabled {
        (
            StatusCode::OK,
            Json(AppendedResponse {
                offset: appended.offset,
            }),
        )
            .into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    };

    insert_tus_version(&mut response);
    insert_header(
        &mut response,
        HEADER_UPLOAD_OFFSET,
        appended.offset.to_string(),
    );
    if let Some(expires_at) = appended.expires_at {
        insert_header(
            &mut response,
            HEADER_UPLOAD_EXPIRES,
            format_expires(&expires_at),
        );
    }

    Ok(response)
}

/// DELETE /files/{id} - terminate an upload and discard its bytes.
pub async fn terminate_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, HttpUploadError> {
    require_tus_header(&headers)?;

    state.service.terminate(id).await?;

    let mut response = StatusCode::NO_CONTENT.into_response();
    insert_tus_version(&mut response);
    Ok(response)
}
