//! Metadata Catalog Module - the single source of truth for file and
//! block records
//!
//! The catalog owns one [`FileRecord`] and exactly three [`BlockRecord`]s
//! per logical file. Block health recorded here overrides whatever the
//! filesystem claims: the recovery path consults the catalog, never the
//! disk, to decide availability.

mod records;
mod store;

pub use records::{BlockRecord, BlockStatus, FileRecord};
pub use store::Catalog;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("File record not found: {0}")]
    NotFound(String),

    #[error("Logical path already exists: {0}")]
    DuplicatePath(String),

    #[error("Physical block path already exists: {0}")]
    DuplicateBlockPath(String),

    #[error("Invalid block set: {0}")]
    InvalidBlockSet(String),

    #[error("Catalog mutation gate is closed")]
    GateClosed,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
