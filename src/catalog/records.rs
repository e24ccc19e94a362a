//! Catalog record types

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Health of one physical block. Set by an external health-check pass
/// and consulted, never recomputed, by the recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStatus {
    Normal,
    Corrupted,
    Missing,
}

/// One logical file striped across three disks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique file ID
    pub id: Uuid,

    /// Logical path, unique across the whole store
    pub relative_path: String,

    /// Bytes per stripe, fixed when the file was written
    pub stripe_size: u64,

    /// Logical size in bytes; parity and padding are physical overhead
    /// and never counted here
    pub size: u64,

    /// Reserved; never computed or verified
    pub checksum: String,

    /// Creation timestamp (UTC epoch seconds)
    pub created_at: i64,

    /// Last modification timestamp
    pub modified_at: i64,
}

impl FileRecord {
    pub fn new(relative_path: impl Into<String>, stripe_size: u64) -> Self {
        let now = Utc::now().timestamp();

        Self {
            id: Uuid::new_v4(),
            relative_path: relative_path.into(),
            stripe_size,
            size: 0,
            checksum: String::new(),
            created_at: now,
            modified_at: now,
        }
    }
}

/// One disk's physical contribution to a logical file (one of exactly 3)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Unique block ID
    pub id: Uuid,

    /// Owning file record
    pub file_id: Uuid,

    /// Physical path, unique across the whole pool
    pub absolute_path: PathBuf,

    /// Physical bytes on this disk (data and parity stripes combined)
    pub size: u64,

    /// Slot in the rotation schedule (0, 1 or 2)
    pub index: u8,

    /// Current health
    pub status: BlockStatus,

    /// Creation timestamp (UTC epoch seconds)
    pub created_at: i64,

    /// Last modification timestamp
    pub modified_at: i64,
}

impl BlockRecord {
    pub fn new(id: Uuid, file_id: Uuid, index: u8, absolute_path: PathBuf) -> Self {
        let now = Utc::now().timestamp();

        Self {
            id,
            file_id,
            absolute_path,
            size: 0,
            index,
            status: BlockStatus::Normal,
            created_at: now,
            modified_at: now,
        }
    }
}
