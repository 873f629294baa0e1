use crate::types::FileId;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Database request for storing a freshly uploaded file
#[derive(Debug, Clone)]
pub struct FileCreateDBRequest {
    pub id: FileId,
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Database response for a stored file, without its payload
#[derive(Debug, Clone, PartialEq)]
pub struct FileDBResponse {
    pub id: FileId,
    pub filename: String,
    pub content_type: String,
    pub hits: i64,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// What the canonical-redirect lookup needs: no payload is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub filename: String,
    pub content_type: String,
}

/// A stored file including its payload, for serving downloads.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// One row of the hit ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopFile {
    pub id: FileId,
    pub filename: String,
    pub hits: i64,
    pub content_type: String,
}
