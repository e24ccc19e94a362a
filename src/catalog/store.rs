//! Catalog store - JSON-backed metadata index
//!
//! Records live in an in-memory index persisted as one JSON document,
//! loaded at startup and rewritten after every mutation. Mutations pass
//! through a counting semaphore so a burst of simultaneous file
//! operations cannot overwhelm the backend; reads are not gated.

use super::{BlockRecord, BlockStatus, CatalogError, FileRecord};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::{RwLock, Semaphore};
use uuid::Uuid;

/// Serialized form of the catalog
#[derive(Default, serde::Serialize, serde::Deserialize)]
struct CatalogIndex {
    files: HashMap<Uuid, FileRecord>,
    blocks: HashMap<Uuid, Vec<BlockRecord>>,
}

struct CatalogInner {
    index: CatalogIndex,
    /// Logical path -> file ID (uniqueness of relative paths)
    by_path: HashMap<String, Uuid>,
    /// Every physical block path in the pool (uniqueness of absolute paths)
    block_paths: HashSet<PathBuf>,
}

/// Durable store of file and block records
pub struct Catalog {
    index_path: PathBuf,
    inner: RwLock<CatalogInner>,
    mutation_gate: Semaphore,
}

impl Catalog {
    /// Open the catalog under `catalog_path`, loading the existing index
    /// if one is present.
    pub async fn open(catalog_path: &Path, permits: usize) -> Result<Self, CatalogError> {
        tokio::fs::create_dir_all(catalog_path).await?;
        let index_path = catalog_path.join("index.json");

        let index: CatalogIndex = if index_path.exists() {
            let data = tokio::fs::read_to_string(&index_path).await?;
            serde_json::from_str(&data).map_err(|e| CatalogError::Serialization(e.to_string()))?
        } else {
            CatalogIndex::default()
        };

        let mut by_path = HashMap::new();
        for (id, file) in &index.files {
            by_path.insert(file.relative_path.clone(), *id);
        }

        let mut block_paths = HashSet::new();
        for blocks in index.blocks.values() {
            for block in blocks {
                block_paths.insert(block.absolute_path.clone());
            }
        }

        tracing::info!("Catalog loaded: {} file records", index.files.len());

        Ok(Self {
            index_path,
            inner: RwLock::new(CatalogInner {
                index,
                by_path,
                block_paths,
            }),
            mutation_gate: Semaphore::new(permits),
        })
    }

    /// Insert a file record and its three block records as one logical
    /// unit. Nothing is committed unless the whole set passes the
    /// uniqueness and shape checks and the index persists.
    pub async fn create_file_with_blocks(
        &self,
        file: FileRecord,
        blocks: Vec<BlockRecord>,
    ) -> Result<(), CatalogError> {
        let _permit = self
            .mutation_gate
            .acquire()
            .await
            .map_err(|_| CatalogError::GateClosed)?;
        let mut inner = self.inner.write().await;

        if blocks.len() != 3 {
            return Err(CatalogError::InvalidBlockSet(format!(
                "expected 3 blocks, got {}",
                blocks.len()
            )));
        }
        let mut seen = [false; 3];
        for block in &blocks {
            if block.file_id != file.id {
                return Err(CatalogError::InvalidBlockSet(format!(
                    "block {} belongs to file {}",
                    block.id, block.file_id
                )));
            }
            let Some(slot) = seen.get_mut(block.index as usize) else {
                return Err(CatalogError::InvalidBlockSet(format!(
                    "slot index {} out of range",
                    block.index
                )));
            };
            if *slot {
                return Err(CatalogError::InvalidBlockSet(format!(
                    "slot index {} appears twice",
                    block.index
                )));
            }
            *slot = true;
        }

        if inner.by_path.contains_key(&file.relative_path) {
            return Err(CatalogError::DuplicatePath(file.relative_path.clone()));
        }
        for block in &blocks {
            if inner.block_paths.contains(&block.absolute_path) {
                return Err(CatalogError::DuplicateBlockPath(
                    block.absolute_path.display().to_string(),
                ));
            }
        }

        let file_id = file.id;
        let path_key = file.relative_path.clone();
        let new_block_paths: Vec<PathBuf> =
            blocks.iter().map(|b| b.absolute_path.clone()).collect();

        inner.index.files.insert(file_id, file);
        inner.index.blocks.insert(file_id, blocks);

        let persisted = self.persist(&inner.index).await;
        match persisted {
            Ok(()) => {
                inner.by_path.insert(path_key, file_id);
                for path in new_block_paths {
                    inner.block_paths.insert(path);
                }
                Ok(())
            }
            Err(e) => {
                inner.index.files.remove(&file_id);
                inner.index.blocks.remove(&file_id);
                Err(e)
            }
        }
    }

    /// Remove a file record and its block records as one unit. Removing
    /// an unknown ID is a no-op.
    pub async fn remove_file(&self, file_id: Uuid) -> Result<(), CatalogError> {
        let _permit = self
            .mutation_gate
            .acquire()
            .await
            .map_err(|_| CatalogError::GateClosed)?;
        let mut inner = self.inner.write().await;

        let Some(file) = inner.index.files.remove(&file_id) else {
            return Ok(());
        };
        let blocks = inner.index.blocks.remove(&file_id).unwrap_or_default();

        let persisted = self.persist(&inner.index).await;
        match persisted {
            Ok(()) => {
                inner.by_path.remove(&file.relative_path);
                for block in &blocks {
                    inner.block_paths.remove(&block.absolute_path);
                }
                Ok(())
            }
            Err(e) => {
                inner.index.files.insert(file_id, file);
                inner.index.blocks.insert(file_id, blocks);
                Err(e)
            }
        }
    }

    /// Look up a file record by ID (if `key` parses as one) or by
    /// logical path.
    pub async fn get_file(&self, key: &str) -> Option<FileRecord> {
        let inner = self.inner.read().await;

        if let Ok(id) = Uuid::parse_str(key) {
            if let Some(file) = inner.index.files.get(&id) {
                return Some(file.clone());
            }
        }

        inner
            .by_path
            .get(key)
            .and_then(|id| inner.index.files.get(id))
            .cloned()
    }

    /// True iff a file record matches `key` by ID or logical path.
    pub async fn exists(&self, key: &str) -> bool {
        self.get_file(key).await.is_some()
    }

    /// The three block records of a file, ordered by slot index.
    pub async fn blocks_for_file(&self, file_id: Uuid) -> Result<Vec<BlockRecord>, CatalogError> {
        let inner = self.inner.read().await;

        let mut blocks = inner
            .index
            .blocks
            .get(&file_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(file_id.to_string()))?;
        blocks.sort_by_key(|b| b.index);
        Ok(blocks)
    }

    /// Record a block's health as observed by an external health check.
    pub async fn set_block_status(
        &self,
        block_id: Uuid,
        status: BlockStatus,
    ) -> Result<(), CatalogError> {
        let _permit = self
            .mutation_gate
            .acquire()
            .await
            .map_err(|_| CatalogError::GateClosed)?;
        let mut inner = self.inner.write().await;

        let mut found = false;
        for blocks in inner.index.blocks.values_mut() {
            if let Some(block) = blocks.iter_mut().find(|b| b.id == block_id) {
                block.status = status;
                block.modified_at = Utc::now().timestamp();
                found = true;
                break;
            }
        }
        if !found {
            return Err(CatalogError::NotFound(block_id.to_string()));
        }

        self.persist(&inner.index).await
    }

    async fn persist(&self, index: &CatalogIndex) -> Result<(), CatalogError> {
        let data = serde_json::to_string_pretty(index)
            .map_err(|e| CatalogError::Serialization(e.to_string()))?;
        tokio::fs::write(&self.index_path, data).await?;
        Ok(())
    }
}
