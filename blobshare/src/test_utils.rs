//! Test utilities for integration testing.

use crate::config::{Config, ConsoleConfig, PoolSettings};
use crate::db::handlers::Files;
use crate::db::models::files::FileCreateDBRequest;
use crate::types::FileId;
use axum_test::TestServer;
use bytes::Bytes;
use sqlx::SqlitePool;

/// Key accepted by [`create_test_config`].
pub const TEST_KEY: &str = "abc123";

/// Base of the links returned by apps built from [`create_test_config`].
pub const TEST_PUBLIC_URL: &str = "http://share.test:8082/";

pub async fn create_test_app(pool: SqlitePool) -> TestServer {
    create_test_app_with_config(pool, create_test_config()).await
}

pub async fn create_test_app_with_config(pool: SqlitePool, config: Config) -> TestServer {
    let app = crate::Application::new_with_pool(config, Some(pool))
        .await
        .expect("Failed to create application");

    app.into_test_server()
}

pub fn create_test_config() -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        public_url: Some(TEST_PUBLIC_URL.parse().expect("valid test URL")),
        keys: vec![TEST_KEY.to_string()],
        console: ConsoleConfig { enabled: false },
        ..Default::default()
    };
    config.database.pool = PoolSettings {
        max_connections: 4,
        min_connections: 1,
        ..Default::default()
    };
    config
}

/// Insert a `text/plain` file straight into the store.
pub async fn insert_test_file(pool: &SqlitePool, id: &str, filename: &str, data: &[u8]) -> FileId {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let request = FileCreateDBRequest {
        id: id.parse().expect("valid test file id"),
        filename: filename.to_string(),
        content_type: "text/plain".to_string(),
        data: Bytes::copy_from_slice(data),
    };

    Files::new(&mut conn)
        .create(&request)
        .await
        .expect("Failed to insert test file")
        .id
}

/// Current hit count of `id`, or `None` once it has been deleted.
pub async fn hits_of(pool: &SqlitePool, id: &str) -> Option<i64> {
    sqlx::query_scalar("SELECT hits FROM files WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .expect("Failed to read hits")
}
