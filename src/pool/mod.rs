//! Disk Pool Module - selects physical roots and lays out block targets
//!
//! The pool owns the configured disk roots. For every incoming file it
//! shuffles the pool, picks three usable roots and creates one directory
//! per root, so load spreads across the pool over time.

use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Redundancy layout requires at least 3 distinct disk roots, got {0}")]
    InvalidLayout(usize),

    #[error("Not enough usable disk roots: have {have}, need {need}")]
    InsufficientDisks { have: usize, need: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A reserved location for one block of an incoming file
#[derive(Debug, Clone)]
pub struct BlockTarget {
    /// Slot in the rotation schedule, assigned in allocation order
    pub index: u8,

    /// Block ID, also the stem of the physical file name
    pub block_id: Uuid,

    /// Absolute path the block file will be created at
    pub path: PathBuf,
}

/// The configured set of physical disk roots
pub struct DiskPool {
    roots: Vec<PathBuf>,
}

impl DiskPool {
    /// Validate the redundancy layout. Fewer than 3 distinct roots
    /// cannot host a 2-data + 1-parity rotation.
    pub fn new(roots: Vec<PathBuf>) -> Result<Self, PoolError> {
        let mut distinct = Vec::new();
        let mut seen = HashSet::new();
        for root in roots {
            if seen.insert(root.clone()) {
                distinct.push(root);
            }
        }

        if distinct.len() < 3 {
            return Err(PoolError::InvalidLayout(distinct.len()));
        }

        Ok(Self { roots: distinct })
    }

    /// Log each configured root's availability. A missing root is skipped
    /// at allocation time; it only becomes fatal when fewer than 3 remain.
    pub async fn probe(&self) {
        for root in &self.roots {
            match tokio::fs::metadata(root).await {
                Ok(meta) if meta.is_dir() => {
                    tracing::info!("Disk root {} is available", root.display());
                }
                Ok(_) => {
                    tracing::warn!("Disk root {} is not a directory", root.display());
                }
                Err(e) => {
                    tracing::warn!("Disk root {} is not reachable: {}", root.display(), e);
                }
            }
        }
    }

    /// Pick 3 distinct usable roots (shuffled for load spread) and create
    /// the per-file directory under each, yielding slot-indexed targets.
    pub async fn allocate(&self, file_id: Uuid) -> Result<[BlockTarget; 3], PoolError> {
        let mut shuffled = self.roots.clone();
        shuffled.shuffle(&mut rand::thread_rng());

        let mut targets = Vec::with_capacity(3);
        for root in shuffled {
            if targets.len() == 3 {
                break;
            }

            match tokio::fs::metadata(&root).await {
                Ok(meta) if meta.is_dir() => {}
                _ => {
                    tracing::warn!("Skipping unusable disk root {}", root.display());
                    continue;
                }
            }

            let dir = root.join(file_id.to_string());
            tokio::fs::create_dir_all(&dir).await?;

            let block_id = Uuid::new_v4();
            targets.push(BlockTarget {
                index: targets.len() as u8,
                block_id,
                path: dir.join(format!("{}.blk", block_id)),
            });
        }

        targets
            .try_into()
            .map_err(|leftover: Vec<BlockTarget>| PoolError::InsufficientDisks {
                have: leftover.len(),
                need: 3,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_roots(dir: &TempDir, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let root = dir.path().join(format!("disk{}", i));
                std::fs::create_dir_all(&root).unwrap();
                root
            })
            .collect()
    }

    #[test]
    fn test_layout_rejects_fewer_than_three_roots() {
        let dir = TempDir::new().unwrap();
        let roots = make_roots(&dir, 2);

        assert!(matches!(
            DiskPool::new(roots),
            Err(PoolError::InvalidLayout(2))
        ));
    }

    #[test]
    fn test_layout_rejects_repeated_roots() {
        let dir = TempDir::new().unwrap();
        let mut roots = make_roots(&dir, 2);
        roots.push(roots[0].clone());

        assert!(matches!(
            DiskPool::new(roots),
            Err(PoolError::InvalidLayout(2))
        ));
    }

    #[tokio::test]
    async fn test_allocate_assigns_slots_on_distinct_roots() {
        let dir = TempDir::new().unwrap();
        let pool = DiskPool::new(make_roots(&dir, 3)).unwrap();

        let file_id = Uuid::new_v4();
        let targets = pool.allocate(file_id).await.unwrap();

        assert_eq!(
            targets.iter().map(|t| t.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        let parents: HashSet<_> = targets
            .iter()
            .map(|t| t.path.parent().unwrap().to_path_buf())
            .collect();
        assert_eq!(parents.len(), 3);
        for parent in parents {
            assert!(parent.ends_with(file_id.to_string()));
            assert!(parent.is_dir());
        }
    }

    #[tokio::test]
    async fn test_allocate_fails_when_usable_drops_below_three() {
        let dir = TempDir::new().unwrap();
        let mut roots = make_roots(&dir, 2);
        roots.push(dir.path().join("never-created"));
        let pool = DiskPool::new(roots).unwrap();

        let result = pool.allocate(Uuid::new_v4()).await;
        assert!(matches!(
            result,
            Err(PoolError::InsufficientDisks { have: 2, need: 3 })
        ));
    }

    #[tokio::test]
    async fn test_allocate_skips_unusable_roots() {
        let dir = TempDir::new().unwrap();
        let mut roots = make_roots(&dir, 3);
        roots.push(dir.path().join("gone"));
        let pool = DiskPool::new(roots).unwrap();

        let targets = pool.allocate(Uuid::new_v4()).await.unwrap();
        for target in &targets {
            assert!(!target.path.starts_with(dir.path().join("gone")));
        }
    }
}
