//! Repository for the `files` table.

use crate::db::errors::Result;
use crate::db::models::files::{FileContent, FileCreateDBRequest, FileDBResponse, FileMeta, TopFile};
use crate::types::FileId;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use tracing::instrument;

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct File {
    pub id: FileId,
    pub filename: String,
    #[sqlx(rename = "type")]
    pub content_type: String,
    pub hits: i64,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl From<File> for FileDBResponse {
    fn from(file: File) -> Self {
        Self {
            id: file.id,
            filename: file.filename,
            content_type: file.content_type,
            hits: file.hits,
            size_bytes: file.size_bytes,
            created_at: file.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct FileMetaRow {
    filename: String,
    #[sqlx(rename = "type")]
    content_type: String,
}

#[derive(Debug, FromRow)]
struct FileContentRow {
    filename: String,
    #[sqlx(rename = "type")]
    content_type: String,
    data: Vec<u8>,
}

#[derive(Debug, FromRow)]
struct TopFileRow {
    id: FileId,
    filename: String,
    hits: i64,
    #[sqlx(rename = "type")]
    content_type: String,
}

pub struct Files<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> Files<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Insert a new file. A colliding id surfaces as [`DbError::UniqueViolation`]; the
    /// caller is expected to pick a new id and try again.
    ///
    /// [`DbError::UniqueViolation`]: crate::db::errors::DbError::UniqueViolation
    #[instrument(skip(self, request), fields(file_id = %request.id, size = request.data.len()), err)]
    pub async fn create(&mut self, request: &FileCreateDBRequest) -> Result<FileDBResponse> {
        let file = sqlx::query_as::<_, File>(
            r#"
            INSERT INTO files (id, filename, type, data, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, filename, type, hits, length(data) AS size_bytes, created_at
            "#,
        )
        .bind(&request.id)
        .bind(&request.filename)
        .bind(&request.content_type)
        .bind(request.data.as_ref())
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(file.into())
    }

    #[instrument(skip(self), fields(file_id = %id), err)]
    pub async fn get_by_id(&mut self, id: &FileId) -> Result<Option<FileDBResponse>> {
        let file = sqlx::query_as::<_, File>(
            "SELECT id, filename, type, hits, length(data) AS size_bytes, created_at FROM files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(file.map(Into::into))
    }

    /// Look up a file without touching its payload.
    #[instrument(skip(self), fields(file_id = %id), err)]
    pub async fn get_meta(&mut self, id: &FileId) -> Result<Option<FileMeta>> {
        let meta = sqlx::query_as::<_, FileMetaRow>("SELECT filename, type FROM files WHERE id = ? LIMIT 1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(meta.map(|row| FileMeta {
            filename: row.filename,
            content_type: row.content_type,
        }))
    }

    #[instrument(skip(self), fields(file_id = %id), err)]
    pub async fn get_full(&mut self, id: &FileId) -> Result<Option<FileContent>> {
        let content = sqlx::query_as::<_, FileContentRow>("SELECT filename, type, data FROM files WHERE id = ? LIMIT 1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(content.map(|row| FileContent {
            filename: row.filename,
            content_type: row.content_type,
            data: Bytes::from(row.data),
        }))
    }

    /// Count one hit. Returns `false` when the file no longer exists.
    #[instrument(skip(self), fields(file_id = %id), err)]
    pub async fn increment_hits(&mut self, id: &FileId) -> Result<bool> {
        let result = sqlx::query("UPDATE files SET hits = hits + 1 WHERE id = ?")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Most downloaded files first. Equal hit counts keep storage order.
    #[instrument(skip(self), err)]
    pub async fn list_top_by_hits(&mut self, limit: i64) -> Result<Vec<TopFile>> {
        let rows = sqlx::query_as::<_, TopFileRow>(
            "SELECT id, filename, hits, type FROM files ORDER BY hits DESC, rowid ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TopFile {
                id: row.id,
                filename: row.filename,
                hits: row.hits,
                content_type: row.content_type,
            })
            .collect())
    }

    /// Delete every file whose id contains `fragment` anywhere. Matching is literal and
    /// case-sensitive.
    #[instrument(skip(self), err)]
    pub async fn delete_where_id_contains(&mut self, fragment: &str) -> Result<u64> {
        if fragment.is_empty() {
            // instr() with an empty needle matches every row
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM files WHERE instr(id, ?) > 0")
            .bind(fragment)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    pub async fn count(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }
}
