//! Upload, canonical redirect and download of shared files.
//!
//! - `PUT /` stores the multipart `file` field when the `key` field is accepted and answers
//!   with the canonical link `<base>/<id>/<filename>`.
//! - `GET /{id}` answers `301` to `/{id}/{filename}`.
//! - `GET /{id}/{filename}` serves the payload when `filename` is exactly the stored name
//!   and otherwise answers `302` to the canonical path. The hit counter is bumped only once
//!   the whole body has been handed to the transport.
//! - `POST /{id}` and `POST /{id}/{filename}` answer `303` to the GET routes when
//!   `redirect_post_to_get` is enabled.

use crate::AppState;
use crate::config::Config;
use crate::db::errors::DbError;
use crate::db::handlers::Files;
use crate::db::models::files::{FileCreateDBRequest, FileDBResponse};
use crate::errors::{Error, Result};
use crate::types::FileId;
use axum::{
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Redirect, Response},
};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error, info, warn};
use url::Url;

/// How many fresh ids an upload tries before giving up.
pub const MAX_ID_ATTEMPTS: usize = 5;

/// Content type stored when the uploader did not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// The `file` multipart field, fully read.
struct PendingUpload {
    filename: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

fn multipart_error(err: MultipartError, limit: u64) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { limit }
    } else {
        Error::BadRequest {
            message: format!("Failed to parse multipart data: {}", err.body_text()),
        }
    }
}

pub async fn upload_file(State(state): State<AppState>, headers: HeaderMap, uri: Uri, mut multipart: Multipart) -> Result<String> {
    let limit = state.config.limits.max_upload_size;
    let mut key: Option<String> = None;
    let mut upload: Option<PendingUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(e, limit))? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "key" => {
                let presented = field.text().await.map_err(|e| multipart_error(e, limit))?;
                // No point reading a file we are going to refuse
                if !state.authorizer.authorize(Some(&presented)) {
                    return Err(Error::Forbidden);
                }
                key = Some(presented);
            }
            "file" => {
                let filename = field.file_name().map(|s| s.to_string());
                let content_type = field.content_type().map(|s| s.to_string());
                let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                upload = Some(PendingUpload {
                    filename,
                    content_type,
                    data,
                });
            }
            other => {
                debug!(field = other, "Ignoring unexpected multipart field");
            }
        }
    }

    if !state.authorizer.authorize(key.as_deref()) {
        return Err(Error::Forbidden);
    }

    let upload = upload.ok_or_else(|| Error::BadRequest {
        message: "Missing 'file' field".to_string(),
    })?;
    let filename = upload.filename.filter(|name| !name.is_empty()).ok_or_else(|| Error::BadRequest {
        message: "The 'file' field must carry a filename".to_string(),
    })?;
    if is_dot_segment(&filename) {
        return Err(Error::BadRequest {
            message: format!("'{filename}' is not a usable filename"),
        });
    }
    let content_type = upload
        .content_type
        .filter(|ct| !ct.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let file = insert_with_fresh_id(&mut conn, filename, content_type, upload.data, FileId::generate).await?;
    drop(conn);

    info!(
        file_id = %file.id,
        filename = %file.filename,
        content_type = %file.content_type,
        size_bytes = file.size_bytes,
        "File uploaded"
    );

    canonical_url(&state.config, &headers, &uri, &file.id, &file.filename)
}

/// Insert the upload under the first id from `next_id` that is not taken yet, trying at
/// most [`MAX_ID_ATTEMPTS`] ids.
pub(crate) async fn insert_with_fresh_id<F>(
    conn: &mut SqliteConnection,
    filename: String,
    content_type: String,
    data: Bytes,
    mut next_id: F,
) -> Result<FileDBResponse>
where
    F: FnMut() -> FileId,
{
    let mut repo = Files::new(conn);

    for attempt in 1..=MAX_ID_ATTEMPTS {
        let request = FileCreateDBRequest {
            id: next_id(),
            filename: filename.clone(),
            content_type: content_type.clone(),
            data: data.clone(),
        };

        match repo.create(&request).await {
            Ok(file) => return Ok(file),
            Err(e) if e.is_unique_violation() => {
                warn!(file_id = %request.id, attempt, "Generated file id is already taken, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::Internal {
        operation: format!("allocate an unused file id after {MAX_ID_ATTEMPTS} attempts"),
    })
}

/// `GET /{id}`
pub async fn redirect_to_canonical(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let id = parse_id(&id)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let meta = Files::new(&mut conn).get_meta(&id).await?.ok_or_else(|| not_found(&id))?;

    let location = encoded_path(&[id.as_str(), &meta.filename])?;
    Ok(redirect(StatusCode::MOVED_PERMANENTLY, &location))
}

/// `GET /{id}/{*filename}`
pub async fn download_file(State(state): State<AppState>, Path((id, filename)): Path<(String, String)>) -> Result<Response> {
    serve_file(state, &id, Some(&filename)).await
}

/// `GET /{id}/` - no filename segment, which always ends in a redirect for existing ids.
pub async fn download_unnamed(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    serve_file(state, &id, None).await
}

async fn serve_file(state: AppState, id: &str, requested: Option<&str>) -> Result<Response> {
    let id = parse_id(id)?;

    let file = {
        let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Files::new(&mut conn).get_full(&id).await?.ok_or_else(|| not_found(&id))?
    };

    if requested != Some(file.filename.as_str()) {
        let location = encoded_path(&[id.as_str(), &file.filename])?;
        return Ok(redirect(StatusCode::FOUND, &location));
    }

    let content_type = HeaderValue::from_str(&file.content_type)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    let body = Body::from_stream(counted_body(state.db.clone(), id, file.data));
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// The payload in chunks, followed by the hit being recorded once the last chunk has been
/// taken. If the response is dropped before that, nothing is counted.
fn counted_body(db: SqlitePool, id: FileId, data: Bytes) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    let mut chunks = Vec::with_capacity(data.len() / DOWNLOAD_CHUNK_SIZE + 1);
    let mut rest = data;
    while !rest.is_empty() {
        let len = rest.len().min(DOWNLOAD_CHUNK_SIZE);
        chunks.push(rest.split_to(len));
    }

    let finished = stream::once(async move { record_hit(&db, &id).await }).filter_map(|()| async { None });
    stream::iter(chunks.into_iter().map(Ok)).chain(finished)
}

async fn record_hit(db: &SqlitePool, id: &FileId) {
    let result = async {
        let mut conn = db.acquire().await.map_err(DbError::from)?;
        Files::new(&mut conn).increment_hits(id).await
    }
    .await;

    match result {
        Ok(true) => debug!(file_id = %id, "Hit recorded"),
        Ok(false) => warn!(file_id = %id, "File was deleted before its hit could be recorded"),
        Err(e) => error!(file_id = %id, "Failed to record hit: {:#}", e),
    }
}

/// `POST /{id}` and `POST /{id}/`, when enabled
pub async fn redirect_post_unnamed(Path(id): Path<String>) -> Result<Redirect> {
    Ok(Redirect::to(&encoded_path(&[&id])?))
}

/// `POST /{id}/{*filename}`, when enabled
pub async fn redirect_post_named(Path((id, filename)): Path<(String, String)>) -> Result<Redirect> {
    Ok(Redirect::to(&encoded_path(&[&id, &filename])?))
}

fn parse_id(raw: &str) -> Result<FileId> {
    raw.parse().map_err(|_| Error::NotFound {
        resource: "File".to_string(),
        id: raw.to_string(),
    })
}

fn not_found(id: &FileId) -> Error {
    Error::NotFound {
        resource: "File".to_string(),
        id: id.to_string(),
    }
}

fn redirect(status: StatusCode, location: &str) -> Response {
    (status, [(header::LOCATION, location.to_string())]).into_response()
}

/// Absolute path made of the given segments, each percent-encoded as a single segment.
fn encoded_path(segments: &[&str]) -> Result<String> {
    let mut url = Url::parse("http://localhost/").map_err(|e| Error::Other(e.into()))?;
    push_segments(&mut url, segments)?;
    Ok(url.path().to_string())
}

/// `.` and `..` cannot be carried in a URL path: they are resolved away instead of being
/// kept as a segment, even when percent-encoded.
pub(crate) fn is_dot_segment(segment: &str) -> bool {
    segment == "." || segment == ".."
}

fn push_segments(url: &mut Url, segments: &[&str]) -> Result<()> {
    if let Some(dot) = segments.iter().find(|segment| is_dot_segment(segment)) {
        return Err(Error::BadRequest {
            message: format!("'{dot}' cannot be used as a path segment"),
        });
    }

    let rendered = url.to_string();
    let mut path = url.path_segments_mut().map_err(|_| Error::Internal {
        operation: format!("build a path below '{rendered}'"),
    })?;
    path.pop_if_empty();
    for segment in segments {
        path.push(segment);
    }
    Ok(())
}

/// The link handed back to the uploader. The base is `public_url` when configured,
/// otherwise whatever host the client used to reach us.
fn canonical_url(config: &Config, headers: &HeaderMap, uri: &Uri, id: &FileId, filename: &str) -> Result<String> {
    let mut base = match &config.public_url {
        Some(url) => url.clone(),
        None => {
            let host = headers
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .filter(|host| !host.is_empty())
                .map(str::to_string)
                .or_else(|| uri.authority().map(|authority| authority.to_string()))
                .ok_or_else(|| Error::BadRequest {
                    message: "Missing Host header".to_string(),
                })?;
            Url::parse(&format!("http://{host}/")).map_err(|_| Error::BadRequest {
                message: format!("Invalid Host header '{host}'"),
            })?
        }
    };

    push_segments(&mut base, &[id.as_str(), filename])?;
    Ok(base.to_string())
}
