//! API layer for HTTP request handling.
//!
//! # API Structure
//!
//! - **Upload** (`PUT /`): multipart `key` + `file`, answers with the canonical link
//! - **Canonical redirect** (`GET /{id}`): `301` to `/{id}/{filename}`
//! - **Download** (`GET /{id}/{filename}`): the stored bytes, or `302` to the canonical path
//! - **POST redirects** (`POST /{id}`, `POST /{id}/{filename}`): `303` to the GET routes,
//!   mounted only when `redirect_post_to_get` is enabled
//!
//! Errors are returned as plain-text bodies; see [`crate::errors::Error`].

pub mod handlers;
