//! Striping Module - parity math and the rotation schedule
//!
//! Handles slicing a logical byte stream into stripe groups of two data
//! stripes plus one XOR parity stripe, rotated across three disk slots.
//! The schedule lives here, in one place, because the write and read
//! paths must resolve it identically.

mod reader;
mod writer;

pub use reader::{read_striped, read_striped_rewind};
pub use writer::{write_striped, StripeWriteOutcome};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Error, Debug)]
pub enum StripeError {
    #[error("{unavailable} of 3 blocks are unavailable, data recovery is impossible")]
    UnrecoverableDataLoss { unavailable: usize },

    #[error("Recovery failed: {0}")]
    Recovery(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Role assignment of the three disk slots for one stripe group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupLayout {
    /// Slot holding the first data stripe of the group
    pub data_a: usize,

    /// Slot holding the second data stripe
    pub data_b: usize,

    /// Slot holding the parity stripe
    pub parity: usize,
}

impl GroupLayout {
    /// Resolve the rotation for stripe group `group`. The pattern repeats
    /// with period 3: group 0 parks parity on slot 2, group 1 on slot 1,
    /// group 2 on slot 0.
    pub fn for_group(group: u64) -> Self {
        match group % 3 {
            0 => Self { data_a: 0, data_b: 1, parity: 2 },
            1 => Self { data_a: 0, data_b: 2, parity: 1 },
            _ => Self { data_a: 1, data_b: 2, parity: 0 },
        }
    }

    /// Reorder three per-slot values into (data-A, data-B, parity) role
    /// order for this group.
    pub fn role_order<T>(self, [s0, s1, s2]: [T; 3]) -> (T, T, T) {
        match (self.data_a, self.data_b) {
            (0, 1) => (s0, s1, s2),
            (0, 2) => (s0, s2, s1),
            _ => (s1, s2, s0),
        }
    }
}

/// Byte-wise XOR of two data stripes. The shorter stripe is zero-padded
/// for the XOR only; the result has the length of the longer stripe.
pub fn xor_parity(a: &[u8], b: &[u8]) -> Vec<u8> {
    let len = a.len().max(b.len());
    let mut parity = vec![0u8; len];
    for (i, byte) in parity.iter_mut().enumerate() {
        let xa = a.get(i).copied().unwrap_or(0);
        let xb = b.get(i).copied().unwrap_or(0);
        *byte = xa ^ xb;
    }
    parity
}

/// Read from `input` until `buf` is full or the stream ends. Returns the
/// number of bytes read, which is short only at end of stream.
pub(crate) async fn fill_stripe<R>(input: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = input.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
