//! Repositories over the shared store.

pub mod files;
pub mod raw;

pub use files::Files;
pub use raw::{RawQueryOutcome, run_raw_query};
