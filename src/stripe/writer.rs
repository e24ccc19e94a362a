//! Stripe writer - slices an input stream across three disks with
//! rotating parity.

use super::{fill_stripe, xor_parity, GroupLayout, StripeError};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

/// Byte accounting for one completed striped write
#[derive(Debug, Clone, Default)]
pub struct StripeWriteOutcome {
    /// Logical bytes consumed from the input (parity and padding excluded)
    pub total_bytes: u64,

    /// Physical bytes written to each disk, indexed by slot
    pub per_disk_bytes: [u64; 3],
}

/// Stream `input` into the three block files at `paths`, two data stripes
/// plus one rotated parity stripe per group. The three per-group writes
/// are issued together and awaited as a set; groups are sequential.
///
/// Block files are created exclusively; a pre-existing file at any target
/// path fails the write. On cancellation the partial files are left in
/// place and no outcome is produced.
pub async fn write_striped<R>(
    input: &mut R,
    paths: &[PathBuf; 3],
    stripe_size: usize,
    buffer_size: usize,
    cancel: &CancellationToken,
) -> Result<StripeWriteOutcome, StripeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut f0 = open_block(&paths[0], buffer_size).await?;
    let mut f1 = open_block(&paths[1], buffer_size).await?;
    let mut f2 = open_block(&paths[2], buffer_size).await?;

    let mut a = vec![0u8; stripe_size];
    let mut b = vec![0u8; stripe_size];
    let mut outcome = StripeWriteOutcome::default();
    let mut group: u64 = 0;

    loop {
        let len_a = fill_stripe(input, &mut a).await?;
        if len_a == 0 {
            break;
        }
        let len_b = fill_stripe(input, &mut b).await?;

        let parity = xor_parity(&a[..len_a], &b[..len_b]);
        let layout = GroupLayout::for_group(group);

        // Physical bytes per slot this group; data stripes keep their
        // real lengths, parity covers the longer of the two.
        let mut per_slot: [&[u8]; 3] = [&[]; 3];
        per_slot[layout.data_a] = &a[..len_a];
        per_slot[layout.data_b] = &b[..len_b];
        per_slot[layout.parity] = &parity;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StripeError::Cancelled),
            res = async {
                tokio::try_join!(
                    f0.write_all(per_slot[0]),
                    f1.write_all(per_slot[1]),
                    f2.write_all(per_slot[2]),
                )
            } => {
                res?;
            }
        }

        for slot in 0..3 {
            outcome.per_disk_bytes[slot] += per_slot[slot].len() as u64;
        }
        outcome.total_bytes += (len_a + len_b) as u64;
        group += 1;

        if len_b < stripe_size {
            break;
        }
    }

    tokio::try_join!(f0.flush(), f1.flush(), f2.flush())?;

    Ok(outcome)
}

async fn open_block(path: &Path, buffer_size: usize) -> std::io::Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    Ok(BufWriter::with_capacity(buffer_size, file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn block_paths(dir: &TempDir) -> [PathBuf; 3] {
        [
            dir.path().join("block0.blk"),
            dir.path().join("block1.blk"),
            dir.path().join("block2.blk"),
        ]
    }

    async fn write_bytes(paths: &[PathBuf; 3], data: &[u8], stripe_size: usize) -> StripeWriteOutcome {
        let cancel = CancellationToken::new();
        write_striped(&mut &data[..], paths, stripe_size, 4096, &cancel)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_full_groups_spread_evenly() {
        let dir = TempDir::new().unwrap();
        let paths = block_paths(&dir);
        // Three full groups of 2 stripes each, stripe size 4
        let data: Vec<u8> = (0..24).map(|i| i as u8).collect();

        let outcome = write_bytes(&paths, &data, 4).await;

        assert_eq!(outcome.total_bytes, 24);
        // Every slot receives one stripe (data or parity) per full group
        assert_eq!(outcome.per_disk_bytes, [12, 12, 12]);
        for path in &paths {
            assert_eq!(std::fs::read(path).unwrap().len(), 12);
        }
    }

    #[tokio::test]
    async fn test_partial_final_group_lengths() {
        let dir = TempDir::new().unwrap();
        let paths = block_paths(&dir);
        // Group 0 full, group 1 holds a lone 2-byte stripe; with the
        // g=1 rotation slot 1 takes the parity, slot 2 gets nothing.
        let data: Vec<u8> = (0..10).map(|i| i as u8).collect();

        let outcome = write_bytes(&paths, &data, 4).await;

        assert_eq!(outcome.total_bytes, 10);
        assert_eq!(outcome.per_disk_bytes, [6, 6, 4]);
    }

    #[tokio::test]
    async fn test_empty_input_creates_empty_blocks() {
        let dir = TempDir::new().unwrap();
        let paths = block_paths(&dir);

        let outcome = write_bytes(&paths, &[], 4).await;

        assert_eq!(outcome.total_bytes, 0);
        assert_eq!(outcome.per_disk_bytes, [0, 0, 0]);
        for path in &paths {
            assert!(std::fs::read(path).unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_parity_identity_on_disk() {
        let dir = TempDir::new().unwrap();
        let paths = block_paths(&dir);
        let data: Vec<u8> = (0..24).map(|i| (i * 31 % 256) as u8).collect();

        write_bytes(&paths, &data, 4).await;

        let disks: Vec<Vec<u8>> = paths.iter().map(|p| std::fs::read(p).unwrap()).collect();
        // Each full group contributes exactly one stripe to every slot,
        // so group g occupies [g*4..(g+1)*4) on every disk.
        for group in 0..3usize {
            let range = group * 4..(group + 1) * 4;
            for i in range {
                assert_eq!(disks[0][i] ^ disks[1][i] ^ disks[2][i], 0, "group {}", group);
            }
        }
    }

    #[tokio::test]
    async fn test_exclusive_create_rejects_existing_block() {
        let dir = TempDir::new().unwrap();
        let paths = block_paths(&dir);
        std::fs::write(&paths[1], b"stale").unwrap();

        let cancel = CancellationToken::new();
        let result = write_striped(&mut &b"payload"[..], &paths, 4, 4096, &cancel).await;

        assert!(matches!(result, Err(StripeError::Io(_))));
    }

    #[tokio::test]
    async fn test_cancelled_write_aborts_without_outcome() {
        let dir = TempDir::new().unwrap();
        let paths = block_paths(&dir);
        let data = vec![7u8; 64];

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = write_striped(&mut &data[..], &paths, 4, 4096, &cancel).await;

        assert!(matches!(result, Err(StripeError::Cancelled)));
    }
}
