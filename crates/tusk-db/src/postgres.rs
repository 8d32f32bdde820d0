use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use tusk_core::models::{Upload, UploadMetadata, UploadState};
use tusk_core::UploadError;
use uuid::Uuid;

use crate::repository::UploadRepository;

/// Postgres-backed upload repository.
///
/// Row updates go through single-statement writes keyed by primary key, so
/// `save` is atomic per id as the engine requires.
#[derive(Clone)]
pub struct PostgresUploadRepository {
    pool: PgPool,
}

impl PostgresUploadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(pool: &PgPool) -> Result<(), anyhow::Error> {
        sqlx::migrate!("./migrations").run(pool).await?;
        Ok(())
    }
}

fn repo_err(e: sqlx::Error) -> UploadError {
    UploadError::Repository(e.to_string())
}

fn row_to_upload(row: &sqlx::postgres::PgRow) -> Result<Upload, UploadError> {
    let metadata: serde_json::Value = row.get("metadata");
    let metadata: UploadMetadata = serde_json::from_value(metadata)
        .map_err(|e| UploadError::Repository(format!("corrupt metadata column: {}", e)))?;

    let state: String = row.get("state");
    let state = UploadState::from_str(&state)
        .map_err(|e| UploadError::Repository(format!("corrupt state column: {}", e)))?;

    Ok(Upload {
        id: row.get("id"),
        declared_length: row.get("declared_length"),
        offset: row.get("upload_offset"),
        metadata,
        state,
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    })
}

fn metadata_json(upload: &Upload) -> Result<serde_json::Value, UploadError> {
    serde_json::to_value(&upload.metadata)
        .map_err(|e| UploadError::Repository(format!("unencodable metadata: {}", e)))
}

#[async_trait]
impl UploadRepository for PostgresUploadRepository {
    async fn load(&self, id: Uuid) -> Result<Option<Upload>, UploadError> {
        // Dynamic SQLx queries to avoid requiring DATABASE_URL/sqlx prepare
        let row = sqlx::query(
            r#"
            SELECT id, declared_length, upload_offset, metadata, state, expires_at, created_at
            FROM uploads
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(repo_err)?;

        row.as_ref().map(row_to_upload).transpose()
    }

    async fn create(&self, upload: &Upload) -> Result<(), UploadError> {
        sqlx::query(
            r#"
            INSERT INTO uploads (id, declared_length, upload_offset, metadata, state, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(upload.id)
        .bind(upload.declared_length)
        .bind(upload.offset)
        .bind(metadata_json(upload)?)
        .bind(upload.state.to_string())
        .bind(upload.expires_at)
        .bind(upload.created_at)
        .execute(&self.pool)
        .await
        .map_err(repo_err)?;

        Ok(())
    }

    async fn save(&self, upload: &Upload) -> Result<(), UploadError> {
        let result = sqlx::query(
            r#"
            UPDATE uploads
            SET declared_length = $2, upload_offset = $3, state = $4, expires_at = $5
            WHERE id = $1
            "#,
        )
        .bind(upload.id)
        .bind(upload.declared_length)
        .bind(upload.offset)
        .bind(upload.state.to_string())
        .bind(upload.expires_at)
        .execute(&self.pool)
        .await
        .map_err(repo_err)?;

        if result.rows_affected() == 0 {
            return Err(UploadError::Repository(format!(
                "cannot save unknown upload {}",
                upload.id
            )));
        }

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), UploadError> {
        sqlx::query("DELETE FROM uploads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(repo_err)?;

        Ok(())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, UploadError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM uploads
            WHERE expires_at IS NOT NULL AND expires_at <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(repo_err)?;

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }
}
