//! Upload authorization.
//!
//! Uploads carry a shared secret in the `key` multipart field. The set of accepted keys is
//! read from configuration once at startup and frozen into a [`KeyAuthorizer`]; changing
//! keys requires a restart.
//!
//! Downloads are never authorized: anyone holding a link can fetch the file.

pub mod keys;

pub use keys::{KeyAuthorizer, PLACEHOLDER_KEY};
