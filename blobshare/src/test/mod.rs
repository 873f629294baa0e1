//! End-to-end tests through the full router.

use crate::console::{Console, PROMPT};
use crate::test_utils::{TEST_KEY, create_test_app, create_test_app_with_config, create_test_config, hits_of, insert_test_file};
use axum::http::StatusCode;
use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use futures::stream;
use sqlx::SqlitePool;
use std::collections::HashSet;
use url::Url;

fn upload_form(key: &str, filename: &str, content_type: &str, data: &[u8]) -> MultipartForm {
    MultipartForm::new()
        .add_text("key", key.to_string())
        .add_part("file", Part::bytes(data.to_vec()).file_name(filename.to_string()).mime_type(content_type.to_string()))
}

/// Upload and return the canonical link
async fn upload(server: &TestServer, filename: &str, content_type: &str, data: &[u8]) -> String {
    let response = server.put("/").multipart(upload_form(TEST_KEY, filename, content_type, data)).await;
    response.assert_status_ok();
    response.text()
}

/// `(id, path)` of a canonical link
fn split_link(link: &str) -> (String, String) {
    let url = Url::parse(link).expect("upload should return an absolute URL");
    let id = url
        .path_segments()
        .and_then(|mut segments| segments.next())
        .expect("link should have an id segment")
        .to_string();
    (id, url.path().to_string())
}

async fn file_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM files").fetch_one(pool).await.unwrap()
}

async fn console_output(pool: &SqlitePool, lines: &[&str]) -> Vec<String> {
    let input = stream::iter(lines.iter().map(|line| line.to_string()).collect::<Vec<_>>());
    let mut output = Vec::new();
    Console::new(pool.clone()).run(input, &mut output).await.unwrap();
    String::from_utf8(output)
        .unwrap()
        .replace(PROMPT, "")
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Upload notes.txt, fetch it three times through both URL shapes and read the count back
/// from the console.
#[sqlx::test]
#[test_log::test]
async fn test_notes_scenario(pool: SqlitePool) {
    let server = create_test_app(pool.clone()).await;

    let link = upload(&server, "notes.txt", "text/plain", b"remember the milk").await;
    let (id, path) = split_link(&link);

    assert!(link.starts_with("http://share.test:8082/"), "unexpected link {link}");
    assert!(link.ends_with("/notes.txt"));
    assert_eq!(id.len(), 6);
    assert!(id.chars().all(|c| c.is_ascii_alphabetic()));

    for _ in 0..3 {
        let response = server.get(&path).await;
        response.assert_status_ok();
        assert_eq!(response.as_bytes().as_ref(), b"remember the milk");
        assert_eq!(response.header("content-type"), "text/plain");
    }

    let response = server.get(&format!("/{id}")).await;
    response.assert_status(StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.header("location"), path.as_str());

    assert_eq!(hits_of(&pool, &id).await, Some(3));
    let lines = console_output(&pool, &["top 1"]).await;
    assert_eq!(lines, vec![format!("File {id}/notes.txt - 3 hits (text/plain)")]);
}

#[sqlx::test]
async fn test_uploads_get_fresh_ids(pool: SqlitePool) {
    let server = create_test_app(pool.clone()).await;

    let mut ids = HashSet::new();
    for i in 0..10 {
        let filename = format!("file-{i}.bin");
        let payload = vec![i as u8; 100 + i];
        let (id, path) = split_link(&upload(&server, &filename, "application/x-test", &payload).await);
        assert!(ids.insert(id), "ids must not repeat");

        let response = server.get(&path).await;
        response.assert_status_ok();
        assert_eq!(response.as_bytes().as_ref(), payload.as_slice());
        assert_eq!(response.header("content-type"), "application/x-test");
    }

    assert_eq!(file_count(&pool).await, 10);
}

#[sqlx::test]
async fn test_filenames_are_kept_verbatim(pool: SqlitePool) {
    let server = create_test_app(pool.clone()).await;

    let link = upload(&server, "Quarterly Report FINAL.PDF", "application/pdf", b"%PDF-1.4").await;
    let (id, path) = split_link(&link);
    assert_eq!(path, format!("/{id}/Quarterly%20Report%20FINAL.PDF"));

    let response = server.get(&format!("/{id}")).await;
    response.assert_status(StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.header("location"), path.as_str());

    let response = server.get(&path).await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), b"%PDF-1.4");
}

#[sqlx::test]
async fn test_wrong_filename_redirects_without_counting(pool: SqlitePool) {
    let server = create_test_app(pool.clone()).await;
    let (id, path) = split_link(&upload(&server, "notes.txt", "text/plain", b"secret").await);

    for wrong in ["notes.txT", "notes.tx", "notes.txt2", "other.txt", "notes.txt/extra"] {
        let response = server.get(&format!("/{id}/{wrong}")).await;
        response.assert_status(StatusCode::FOUND);
        assert_eq!(response.header("location"), path.as_str());
        assert_ne!(response.text(), "secret");
    }

    let response = server.get(&format!("/{id}/")).await;
    response.assert_status(StatusCode::FOUND);
    assert_eq!(response.header("location"), path.as_str());

    server.get(&format!("/{id}")).await.assert_status(StatusCode::MOVED_PERMANENTLY);

    assert_eq!(hits_of(&pool, &id).await, Some(0));
}

#[sqlx::test]
async fn test_unknown_ids_are_not_found(pool: SqlitePool) {
    let server = create_test_app(pool.clone()).await;

    let response = server.get("/ZZZZZZ").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.text(), "Not found");

    server.get("/ZZZZZZ/notes.txt").await.assert_status(StatusCode::NOT_FOUND);
    server.get("/ZZZZZZ/").await.assert_status(StatusCode::NOT_FOUND);
}

#[sqlx::test]
#[test_log::test]
async fn test_upload_without_valid_key_is_refused(pool: SqlitePool) {
    let server = create_test_app(pool.clone()).await;

    for key in ["wrong", "", "superdupersecret", "ABC123"] {
        let response = server.put("/").multipart(upload_form(key, "a.txt", "text/plain", b"data")).await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.text(), "Forbidden");
    }

    // File before the key, then no key at all
    let form = MultipartForm::new()
        .add_part("file", Part::bytes(b"data".to_vec()).file_name("a.txt").mime_type("text/plain"))
        .add_text("key", "nope");
    server.put("/").multipart(form).await.assert_status(StatusCode::FORBIDDEN);

    let form = MultipartForm::new().add_part("file", Part::bytes(b"data".to_vec()).file_name("a.txt"));
    server.put("/").multipart(form).await.assert_status(StatusCode::FORBIDDEN);

    assert_eq!(file_count(&pool).await, 0);
}

#[sqlx::test]
async fn test_upload_needs_a_named_file(pool: SqlitePool) {
    let server = create_test_app(pool.clone()).await;

    let form = MultipartForm::new().add_text("key", TEST_KEY);
    server.put("/").multipart(form).await.assert_status(StatusCode::BAD_REQUEST);

    let form = MultipartForm::new().add_text("key", TEST_KEY).add_text("file", "no filename here");
    server.put("/").multipart(form).await.assert_status(StatusCode::BAD_REQUEST);

    assert_eq!(file_count(&pool).await, 0);
}

/// A link ending in `.` or `..` would be resolved away by clients and never reach the file.
#[sqlx::test]
async fn test_dot_filenames_are_refused(pool: SqlitePool) {
    let server = create_test_app(pool.clone()).await;

    for filename in [".", ".."] {
        let response = server.put("/").multipart(upload_form(TEST_KEY, filename, "text/plain", b"dots")).await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
    assert_eq!(file_count(&pool).await, 0);

    let link = upload(&server, "...", "text/plain", b"dots").await;
    let (_, path) = split_link(&link);
    assert!(path.ends_with("/..."), "unexpected path {path}");
    server.get(&path).await.assert_status_ok();
}

#[sqlx::test]
async fn test_upload_over_limit_is_refused(pool: SqlitePool) {
    let mut config = create_test_config();
    config.limits.max_upload_size = 1024;
    let server = create_test_app_with_config(pool.clone(), config).await;

    let response = server
        .put("/")
        .multipart(upload_form(TEST_KEY, "big.bin", "application/octet-stream", &vec![0u8; 8 * 1024]))
        .await;
    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(file_count(&pool).await, 0);

    // Small uploads still go through
    upload(&server, "small.bin", "application/octet-stream", b"tiny").await;
    assert_eq!(file_count(&pool).await, 1);
}

#[sqlx::test]
#[test_log::test]
async fn test_concurrent_downloads_all_count(pool: SqlitePool) {
    let server = create_test_app(pool.clone()).await;
    let payload = vec![42u8; 200 * 1024];
    let (id, path) = split_link(&upload(&server, "shared.bin", "application/octet-stream", &payload).await);

    let downloads = (0..16).map(|_| async {
        let response = server.get(&path).await;
        response.assert_status_ok();
        response.as_bytes().len()
    });
    let sizes = futures::future::join_all(downloads).await;

    assert!(sizes.iter().all(|&size| size == payload.len()));
    assert_eq!(hits_of(&pool, &id).await, Some(16));
}

#[sqlx::test]
async fn test_post_redirects(pool: SqlitePool) {
    insert_test_file(&pool, "PoStMe", "notes.txt", b"hi").await;

    let server = create_test_app(pool.clone()).await;
    server.post("/PoStMe").await.assert_status(StatusCode::METHOD_NOT_ALLOWED);

    let mut config = create_test_config();
    config.redirect_post_to_get = true;
    let server = create_test_app_with_config(pool.clone(), config).await;

    let response = server.post("/PoStMe").await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/PoStMe");

    let response = server.post("/PoStMe/notes.txt").await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/PoStMe/notes.txt");

    let response = server.post("/PoStMe/").await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/PoStMe");

    assert_eq!(hits_of(&pool, "PoStMe").await, Some(0));
}

#[sqlx::test]
async fn test_console_delete_by_substring(pool: SqlitePool) {
    insert_test_file(&pool, "abcXYZ", "one.txt", b"1").await;
    insert_test_file(&pool, "XYZabc", "two.txt", b"2").await;
    insert_test_file(&pool, "qwerty", "three.txt", b"3").await;
    let server = create_test_app(pool.clone()).await;

    let lines = console_output(&pool, &["rm XYZ", "delete nomatch"]).await;
    assert_eq!(
        lines,
        vec!["Deleting XYZ -> 2 affected rows", "Deleting nomatch -> 0 affected rows"]
    );

    server.get("/abcXYZ/one.txt").await.assert_status(StatusCode::NOT_FOUND);
    server.get("/XYZabc/two.txt").await.assert_status(StatusCode::NOT_FOUND);
    server.get("/qwerty/three.txt").await.assert_status_ok();
    assert_eq!(file_count(&pool).await, 1);
}

#[sqlx::test]
async fn test_downloads_are_compressed_when_accepted(pool: SqlitePool) {
    let server = create_test_app(pool.clone()).await;
    let text = "all work and no play makes jack a dull boy\n".repeat(200);
    let (_, path) = split_link(&upload(&server, "jack.txt", "text/plain", text.as_bytes()).await);

    let response = server.get(&path).add_header("accept-encoding", "gzip").await;
    response.assert_status_ok();
    assert_eq!(response.header("content-encoding"), "gzip");
    assert!(response.as_bytes().len() < text.len());

    let response = server.get(&path).await;
    assert_eq!(response.text(), text);
}

#[tokio::test]
async fn test_setup_database_creates_store_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config();
    config.database.path = dir.path().join("share.db");

    let pool = crate::setup_database(&config).await.unwrap();
    assert!(config.database.path.exists());

    let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode").fetch_one(&pool).await.unwrap();
    assert_eq!(journal_mode.to_lowercase(), "wal");
    assert_eq!(file_count(&pool).await, 0);
    pool.close().await;

    // Reopening keeps the data and does not re-run migrations destructively
    let pool = crate::setup_database(&config).await.unwrap();
    insert_test_file(&pool, "kept01", "a.txt", b"a").await;
    pool.close().await;

    let pool = crate::setup_database(&config).await.unwrap();
    assert_eq!(file_count(&pool).await, 1);
    pool.close().await;
}
