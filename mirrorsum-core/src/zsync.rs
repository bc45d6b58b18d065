//! zsync block checksums: parameter selection, the rsync-style weak
//! checksum, and the streaming block-sum accumulator.

use md4::{Digest, Md4};
use serde::Serialize;

/// Files above this size may use the configured large-file block size.
pub const LARGE_FILE_THRESHOLD: u64 = 1 << 30;
/// Files below this size use 2 KiB blocks, larger ones 4 KiB.
pub const SMALL_FILE_LIMIT: u64 = 100_000_000;
const SMALL_BLOCK: u64 = 2048;
const LARGE_BLOCK: u64 = 4096;
const MD4_LEN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ZsyncParameters {
    pub block_size: u64,
    pub seq_matches: u32,
    /// Trailing bytes of the rsum kept per block.
    pub rsum_len: usize,
    /// Leading bytes of the MD4 digest kept per block.
    pub checksum_len: usize,
}

impl ZsyncParameters {
    /// Bytes emitted per block in the flat checksum stream.
    pub fn entry_len(&self) -> usize {
        self.rsum_len + self.checksum_len
    }

    /// `seq_matches,rsum_len,checksum_len`, as stored with the record.
    pub fn hash_lens(&self) -> String {
        format!("{},{},{}", self.seq_matches, self.rsum_len, self.checksum_len)
    }
}

/// Pick block size and truncation lengths for a file of `size` bytes.
///
/// Same choice zsyncmake makes, so sums generated here can be consumed by
/// zsync clients directly.
pub fn select(size: u64, block_override: Option<u64>) -> ZsyncParameters {
    let block_size = match block_override {
        Some(b) if size > LARGE_FILE_THRESHOLD => b,
        _ if size < SMALL_FILE_LIMIT => SMALL_BLOCK,
        _ => LARGE_BLOCK,
    };
    let seq_matches: u32 = if size > block_size { 2 } else { 1 };
    let seq = f64::from(seq_matches);

    let log_size = (size.max(1) as f64).log2();
    let log_block = (block_size as f64).log2();
    let rsum_len = (((log_size + log_block) - 8.6) / seq / 8.0).ceil().clamp(2.0, 4.0) as usize;

    // integer division, as zsyncmake does
    let log_blocks = ((1 + size / block_size) as f64).log2();
    let strong = ((20.0 + log_size + log_blocks) / seq / 8.0).ceil();
    let floor = (7.9 + 20.0 + log_blocks) / 8.0;
    let checksum_len = (strong.max(floor).ceil() as usize).min(MD4_LEN);

    ZsyncParameters { block_size, seq_matches, rsum_len, checksum_len }
}

/// zsync 0.6 "rsum": the rsync weak checksum over one block, big endian
/// `a` followed by big endian `b`.
pub fn rsum(block: &[u8]) -> [u8; 4] {
    let mut a: u16 = 0;
    let mut b: u16 = 0;
    let mut len = block.len();
    for &c in block {
        a = a.wrapping_add(u16::from(c));
        b = b.wrapping_add((len as u16).wrapping_mul(u16::from(c)));
        len -= 1;
    }
    let mut out = [0u8; 4];
    out[..2].copy_from_slice(&a.to_be_bytes());
    out[2..].copy_from_slice(&b.to_be_bytes());
    out
}

/// Streaming producer of the flat `(rsum, md4)` sequence.
///
/// Input may arrive in pieces of any size; blocks are cut at multiples of
/// `block_size` from the start of the file and the final block is zero
/// padded.
pub struct BlockSums {
    params: ZsyncParameters,
    pending: Vec<u8>,
    out: Vec<u8>,
}

impl BlockSums {
    pub fn new(params: ZsyncParameters) -> Self {
        Self { params, pending: Vec::new(), out: Vec::new() }
    }

    pub fn params(&self) -> ZsyncParameters {
        self.params
    }

    pub fn update(&mut self, mut data: &[u8]) {
        let bs = self.params.block_size as usize;
        if !self.pending.is_empty() {
            let take = (bs - self.pending.len()).min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.pending.len() == bs {
                push_block_sum(&mut self.out, &self.params, &self.pending);
                self.pending.clear();
            }
        }
        while data.len() >= bs {
            push_block_sum(&mut self.out, &self.params, &data[..bs]);
            data = &data[bs..];
        }
        self.pending.extend_from_slice(data);
    }

    pub fn finish(mut self) -> Vec<u8> {
        if !self.pending.is_empty() {
            self.pending.resize(self.params.block_size as usize, 0);
            push_block_sum(&mut self.out, &self.params, &self.pending);
        }
        self.out
    }
}

fn push_block_sum(out: &mut Vec<u8>, params: &ZsyncParameters, block: &[u8]) {
    let r = rsum(block);
    out.extend_from_slice(&r[4 - params.rsum_len..]);
    let strong = Md4::digest(block);
    out.extend_from_slice(&strong[..params.checksum_len]);
}
