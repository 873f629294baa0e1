//! Common type definitions.
//!
//! # ID Types
//!
//! - [`FileId`]: the short public token naming a stored file. Ids are six ASCII letters,
//!   case-sensitive, generated with [`FileId::generate`] at upload time.
//!
//! Ids are not meant to be unguessable beyond their length and alphabet; they are short so
//! that links stay short.

use rand::prelude::RngExt;
use rand::rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of characters in a generated id.
pub const FILE_ID_LEN: usize = 6;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Identifier of a stored file.
///
/// Lookups accept any non-empty string a client sends, so a `FileId` is not guaranteed to
/// have the generated shape. An id that was never generated simply does not exist in the
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct FileId(String);

impl FileId {
    /// Mint a fresh random id. Collisions are handled by the store, not here.
    pub fn generate() -> Self {
        let mut rng = rng();
        let id = (0..FILE_ID_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("file id cannot be empty")]
pub struct EmptyFileId;

impl FromStr for FileId {
    type Err = EmptyFileId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(EmptyFileId);
        }
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for FileId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
