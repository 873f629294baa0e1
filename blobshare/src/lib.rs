//! # blobshare: a small file sharing service
//!
//! `blobshare` stores uploaded files in a single SQLite database and hands out short,
//! unguessable links to them. Uploads require one of the configured keys; downloads are
//! open to anyone with the link, and every completed download is counted.
//!
//! ## Overview
//!
//! A client uploads with a multipart `PUT /` carrying a `key` field and a `file` field.
//! The service picks a fresh six-letter id, stores the payload together with its original
//! filename and content type, and answers with the canonical link
//! `http://<host>/<id>/<filename>`. Fetching that link returns the bytes with the stored
//! content type. `GET /<id>` and links with the wrong filename redirect to the canonical
//! one, so a shortened id is enough to share a file.
//!
//! Next to the HTTP server runs an operator console on stdin. It lists the most downloaded
//! files, deletes files by id fragment, runs arbitrary SQL against the store and can shut
//! the whole service down.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); persistence is SQLite via
//! sqlx, opened in WAL mode so downloads keep reading while uploads and hit updates write.
//!
//! The **API layer** ([`api`]) holds the transfer handlers. Uploads are authorized against
//! the [`auth::KeyAuthorizer`] built from `keys` at startup. Downloads stream the payload in
//! chunks and record the hit only once the last chunk has been taken by the transport, so
//! aborted transfers are not counted.
//!
//! The **database layer** ([`db`]) uses the repository pattern: [`db::handlers::Files`]
//! wraps a connection and exposes every query the service needs, and
//! [`db::handlers::run_raw_query`] backs the console's `sql` commands.
//!
//! The **console** ([`console`]) is a single sequential task sharing the pool with the
//! request handlers.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use blobshare::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = blobshare::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     blobshare::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     }).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Database Setup
//!
//! The database file is created on first start and migrations run automatically:
//!
//! ```no_run
//! # use sqlx::SqlitePool;
//! # async fn example(pool: SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
//! blobshare::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
pub mod console;
pub mod db;
pub mod errors;
mod request_logging;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use api::handlers::files::{
    download_file, download_unnamed, redirect_post_named, redirect_post_unnamed, redirect_to_canonical, upload_file,
};
use auth::KeyAuthorizer;
use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post, put},
};
use bon::Builder;
pub use config::Config;
use console::{Console, ConsoleExit};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, error, info, instrument};

pub use types::FileId;

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .authorizer(Arc::new(KeyAuthorizer::new(keys)))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub authorizer: Arc<KeyAuthorizer>,
}

/// Get the blobshare database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Open the store described by `config.database` and bring its schema up to date.
#[instrument(skip_all, fields(path = %config.database.path.display()), err)]
pub async fn setup_database(config: &Config) -> anyhow::Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::new()
        .filename(&config.database.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(config.database.busy_timeout());

    let settings = &config.database.pool;
    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout())
        .idle_timeout(settings.idle_timeout())
        .max_lifetime(settings.max_lifetime())
        .connect_with(connect_options)
        .await?;

    migrator().run(&pool).await?;
    info!("Database ready");

    Ok(pool)
}

/// Build the application router.
///
/// The POST redirects are only mounted when `redirect_post_to_get` is set; without them a
/// POST on a file route answers `405`.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = usize::try_from(state.config.limits.max_upload_size).unwrap_or(usize::MAX);

    let mut router = Router::new()
        .route("/", put(upload_file).layer(DefaultBodyLimit::max(upload_limit)))
        .route("/{id}", get(redirect_to_canonical))
        .route("/{id}/", get(download_unnamed))
        .route("/{id}/{*filename}", get(download_file));

    if state.config.redirect_post_to_get {
        router = router
            .route("/{id}", post(redirect_post_unnamed))
            .route("/{id}/", post(redirect_post_unnamed))
            .route("/{id}/{*filename}", post(redirect_post_named));
    }

    router
        .with_state(state)
        .layer(from_fn(request_logging::access_log))
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
}

/// Main application struct that owns all resources and handles lifecycle.
///
/// 1. **Create**: [`Application::new`] opens the store, runs migrations and builds the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port, starts the console and handles
///    requests
/// 3. **Shutdown**: when the shutdown signal arrives or the console asks for it, in-flight
///    requests are drained, then the console stops and the pool is closed
pub struct Application {
    router: Router,
    app_state: AppState,
    config: Config,
    pool: SqlitePool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Create an application on top of an existing pool (migrations are still run).
    pub async fn new_with_pool(config: Config, pool: Option<SqlitePool>) -> anyhow::Result<Self> {
        debug!("Starting blobshare with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => {
                migrator().run(&pool).await?;
                pool
            }
            None => setup_database(&config).await?,
        };

        let authorizer = Arc::new(KeyAuthorizer::new(config.keys.iter().cloned()));
        info!("Accepting uploads with {} configured key(s)", authorizer.len());

        let app_state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .authorizer(authorizer)
            .build();

        let router = build_router(app_state.clone());

        Ok(Self {
            router,
            app_state,
            config,
            pool,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// State handed to the request handlers
    pub fn state(&self) -> &AppState {
        &self.app_state
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "blobshare listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        let shutdown_token = CancellationToken::new();

        let console_task = if self.config.console.enabled {
            let input = console::spawn_stdin_reader()?;
            let console = Console::new(self.pool.clone());
            let token = shutdown_token.clone();
            Some(tokio::spawn(async move {
                match console.run(input, tokio::io::stdout()).await {
                    Ok(ConsoleExit::Shutdown) => token.cancel(),
                    Ok(ConsoleExit::EndOfInput) => debug!("Console input closed, continuing without console"),
                    Err(e) => error!("Console stopped: {:#}", e),
                }
            }))
        } else {
            None
        };

        let token = shutdown_token.clone();
        let signal = async move {
            tokio::select! {
                _ = shutdown => {},
                _ = token.cancelled() => {},
            }
        };

        // Run the server with graceful shutdown
        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(signal)
            .await?;

        shutdown_token.cancel();
        if let Some(task) = console_task {
            task.abort();
        }

        // Close database connections
        info!("Closing database connections...");
        self.pool.close().await;

        // Shutdown telemetry
        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test;
