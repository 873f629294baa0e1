//! Database layer for data persistence and access.
//!
//! All state lives in one SQLite table, `files`, accessed through a shared
//! [`sqlx::SqlitePool`]. The HTTP handlers and the admin console both borrow connections
//! from that pool; SQLite serializes writers, and every mutation is a single statement, so
//! concurrent operations never observe or produce a half-applied change.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐
//! │  Handlers   │   │   Console   │
//! └──────┬──────┘   └──────┬──────┘
//!        │                 │
//!        ↓                 ↓
//! ┌──────────────────────────────┐
//! │ Repositories (db::handlers)  │
//! └──────────────┬───────────────┘
//!                ↓
//! ┌──────────────────────────────┐
//! │   SQLite (WAL, busy timeout) │
//! └──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: the [`handlers::Files`] repository and raw statement execution
//! - [`models`]: request/response structures for the repository
//! - [`errors`]: database-specific error types
//!
//! ## Example Usage
//!
//! ```ignore
//! use blobshare::db::handlers::Files;
//!
//! let mut conn = pool.acquire().await?;
//! let mut files = Files::new(&mut conn);
//! if let Some(meta) = files.get_meta(&id).await? {
//!     println!("{} ({})", meta.filename, meta.content_type);
//! }
//! ```
//!
//! # Migrations
//!
//! The schema is managed by SQLx migrations in the `migrations/` directory and applied on
//! startup through [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
