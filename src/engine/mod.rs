//! Engine Module - lifecycle orchestration over pool, catalog and stripes
//!
//! [`RaidEngine`] is the produced API surface: callers hand it a stream
//! and a logical path, and it owns allocation, striping, recovery and the
//! record lifecycle. Block availability always comes from the catalog;
//! a block the catalog marks unhealthy is treated as lost even when its
//! file still exists on disk.

use crate::catalog::{BlockRecord, BlockStatus, Catalog, CatalogError, FileRecord};
use crate::pool::{DiskPool, PoolError};
use crate::stripe::{self, StripeError};
use crate::RaidConfig;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("File {0} already exists")]
    AlreadyExists(String),

    #[error("File {0} not found")]
    FileNotFound(String),

    #[error("{unavailable} of 3 blocks are unavailable, data recovery is impossible")]
    UnrecoverableDataLoss { unavailable: usize },

    #[error("Recovery failed: {0}")]
    Recovery(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StripeError> for EngineError {
    fn from(err: StripeError) -> Self {
        match err {
            StripeError::UnrecoverableDataLoss { unavailable } => {
                Self::UnrecoverableDataLoss { unavailable }
            }
            StripeError::Recovery(msg) => Self::Recovery(msg),
            StripeError::Cancelled => Self::Cancelled,
            StripeError::Io(e) => Self::Io(e),
        }
    }
}

/// Result of one striped write
#[derive(Debug, Clone)]
pub struct WriteReport {
    /// Logical bytes written (parity and padding excluded)
    pub total_bytes: u64,

    /// Physical bytes written per disk, indexed by slot
    pub per_disk_bytes: [u64; 3],

    /// Reserved; always empty
    pub checksum: String,
}

/// Diagnostic view of a file's physical layout
#[derive(Debug, Clone)]
pub struct RaidFileInfo {
    /// Logical path of the file
    pub path: String,

    /// Block paths by slot; `None` where the catalog marks the block
    /// unhealthy
    pub files: [Option<PathBuf>; 3],

    /// Bytes per stripe as recorded at write time
    pub stripe_size: u64,

    /// Logical file size in bytes
    pub file_size: u64,
}

/// The storage engine: allocation, striping, recovery and lifecycle
pub struct RaidEngine {
    config: RaidConfig,
    pool: DiskPool,
    catalog: Catalog,
}

impl RaidEngine {
    /// Validate the configured layout, probe the disk roots and open the
    /// catalog. Layout errors are fatal here so a misconfigured engine
    /// never accepts writes.
    pub async fn initialize(config: RaidConfig) -> Result<Self, EngineError> {
        let pool = DiskPool::new(config.disk_roots.clone())?;
        pool.probe().await;

        let catalog = Catalog::open(&config.catalog_path, config.catalog_permits).await?;

        tracing::info!(
            "Storage engine ready: {} disk roots, {} byte stripes",
            config.disk_roots.len(),
            config.stripe_size
        );

        Ok(Self {
            config,
            pool,
            catalog,
        })
    }

    /// Stripe `input` across three freshly allocated block files and
    /// persist the file record plus its three block records as one unit.
    ///
    /// A cancelled write persists nothing; the partial block files are
    /// left on disk with no record pointing at them (known gap, there is
    /// no orphan sweep).
    pub async fn write<R>(
        &self,
        input: &mut R,
        logical_path: &str,
        cancel: &CancellationToken,
    ) -> Result<WriteReport, EngineError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if self.catalog.exists(logical_path).await {
            return Err(EngineError::AlreadyExists(logical_path.to_string()));
        }

        let mut file = FileRecord::new(logical_path, self.config.stripe_size);
        let targets = self.pool.allocate(file.id).await?;
        let paths = [
            targets[0].path.clone(),
            targets[1].path.clone(),
            targets[2].path.clone(),
        ];

        let outcome = stripe::write_striped(
            input,
            &paths,
            self.config.stripe_size as usize,
            self.config.buffer_size,
            cancel,
        )
        .await?;

        file.size = outcome.total_bytes;
        let blocks = targets
            .iter()
            .map(|target| {
                let mut block =
                    BlockRecord::new(target.block_id, file.id, target.index, target.path.clone());
                block.size = outcome.per_disk_bytes[target.index as usize];
                block
            })
            .collect();

        if cancel.is_cancelled() {
            tracing::debug!("Write of {} cancelled before record creation", logical_path);
            return Err(EngineError::Cancelled);
        }
        self.catalog.create_file_with_blocks(file, blocks).await?;

        tracing::info!(
            "Wrote {} ({} bytes across 3 disks)",
            logical_path,
            outcome.total_bytes
        );

        Ok(WriteReport {
            total_bytes: outcome.total_bytes,
            per_disk_bytes: outcome.per_disk_bytes,
            checksum: String::new(),
        })
    }

    /// Reconstruct the file at `key` into `sink`, recovering from at most
    /// one unavailable block.
    pub async fn read<W>(
        &self,
        key: &str,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let info = self.block_paths(key).await?;
        self.log_degraded(&info);

        stripe::read_striped(
            &info.files,
            info.stripe_size as usize,
            info.file_size,
            self.config.buffer_size,
            sink,
            cancel,
        )
        .await?;
        Ok(())
    }

    /// [`Self::read`], then seek the sink back to the start.
    pub async fn read_rewind<W>(
        &self,
        key: &str,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError>
    where
        W: AsyncWrite + AsyncSeek + Unpin + ?Sized,
    {
        let info = self.block_paths(key).await?;
        self.log_degraded(&info);

        stripe::read_striped_rewind(
            &info.files,
            info.stripe_size as usize,
            info.file_size,
            self.config.buffer_size,
            sink,
            cancel,
        )
        .await?;
        Ok(())
    }

    /// True iff a file record matches `key` by ID or logical path.
    pub async fn exists(&self, key: &str) -> bool {
        self.catalog.exists(key).await
    }

    /// Delete the file at `key`: best-effort removal of the physical
    /// block files, then the records as one unit. Deleting an unknown
    /// path is a no-op; deleting twice is safe.
    pub async fn delete(&self, key: &str) -> Result<(), EngineError> {
        let Some(file) = self.catalog.get_file(key).await else {
            tracing::debug!("Delete of {}: no record, nothing to do", key);
            return Ok(());
        };

        let blocks = self.catalog.blocks_for_file(file.id).await?;
        for block in &blocks {
            match tokio::fs::remove_file(&block.absolute_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        "[{}] Failed to delete block file: {}",
                        block.absolute_path.display(),
                        e
                    );
                }
            }
        }

        self.catalog.remove_file(file.id).await?;
        tracing::info!("Deleted {}", file.relative_path);
        Ok(())
    }

    /// Diagnostic view of a file's physical layout. Blocks the catalog
    /// marks unhealthy are reported as `None` even if their files exist.
    pub async fn block_paths(&self, key: &str) -> Result<RaidFileInfo, EngineError> {
        let file = self
            .catalog
            .get_file(key)
            .await
            .ok_or_else(|| EngineError::FileNotFound(key.to_string()))?;
        let blocks = self.catalog.blocks_for_file(file.id).await?;

        let mut files: [Option<PathBuf>; 3] = [None, None, None];
        for block in &blocks {
            if block.status == BlockStatus::Normal {
                files[block.index as usize] = Some(block.absolute_path.clone());
            }
        }

        Ok(RaidFileInfo {
            path: file.relative_path,
            files,
            stripe_size: file.stripe_size,
            file_size: file.size,
        })
    }

    /// Catalog access for the external health-check path and for tests.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn log_degraded(&self, info: &RaidFileInfo) {
        let unavailable = info.files.iter().filter(|f| f.is_none()).count();
        if unavailable > 0 {
            tracing::warn!(
                "Reading {} degraded: {} of 3 blocks unavailable",
                info.path,
                unavailable
            );
        }
    }
}
