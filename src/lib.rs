//! RaidStore Core - Fault-Tolerant Striped Storage Engine
//!
//! This crate provides the core functionality for a block storage engine
//! that stores each logical file as data striped across exactly three
//! physical disks, using rotating XOR parity (RAID-5 style) so the file
//! remains fully recoverable after the loss or corruption of any one disk.

pub mod catalog;
pub mod engine;
pub mod pool;
pub mod stripe;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for RaidStore operations
#[derive(Error, Debug)]
pub enum RaidStoreError {
    #[error("Pool error: {0}")]
    Pool(#[from] pool::PoolError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] catalog::CatalogError),

    #[error("Stripe error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error("Engine error: {0}")]
    Engine(#[from] engine::EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RaidStoreError>;

/// Core configuration for the storage engine
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RaidConfig {
    /// Physical disk roots the allocator stripes across (3+ required)
    pub disk_roots: Vec<PathBuf>,

    /// Directory holding the metadata catalog index
    pub catalog_path: PathBuf,

    /// Bytes per stripe, fixed per file at write time
    pub stripe_size: u64,

    /// Buffer capacity for physical file I/O (bytes)
    pub buffer_size: usize,

    /// Maximum concurrent metadata catalog mutations
    pub catalog_permits: usize,
}

impl Default for RaidConfig {
    fn default() -> Self {
        Self {
            disk_roots: vec![],
            catalog_path: PathBuf::from("./raidstore_catalog"),
            stripe_size: 64 * 1024, // 64 KiB stripes
            buffer_size: 64 * 1024,
            catalog_permits: 100,
        }
    }
}
