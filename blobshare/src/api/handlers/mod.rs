//! HTTP request handlers.
//!
//! - [`files`]: upload, download and redirects for shared files

pub mod files;
