//! Single-pass digest pipeline.
//!
//! One linear read over a file feeds the whole-file MD5/SHA1/SHA256
//! accumulators, the per-piece SHA1 list, the optional per-piece rsum, and
//! the optional zsync block-sum stream.

use crate::config::HashingConfig;
use crate::error::{Error, Result};
use crate::zsync::{self, BlockSums, ZsyncParameters};
use md5::Md5;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestSet {
    /// Bytes actually read.
    pub size: u64,
    pub chunk_size: usize,
    pub md5: [u8; 16],
    pub sha1: [u8; 20],
    pub sha256: [u8; 32],
    /// SHA1 per piece, in file order. Empty when pieces are disabled.
    pub pieces: Vec<[u8; 20]>,
    /// Byte-reversed rsum of each zero-padded piece.
    pub piece_rsums: Option<Vec<[u8; 4]>>,
    pub zsync: Option<ZsyncParameters>,
    /// Flat `(rsum, md4)` block sums; empty unless zsync hashes are enabled.
    pub zsums: Vec<u8>,
    pub btih: Option<[u8; 20]>,
    /// Contents of the detached `.asc` signature, if one was accepted.
    pub signature: Option<Vec<u8>>,
}

impl DigestSet {
    pub fn md5_hex(&self) -> String {
        hex::encode(self.md5)
    }

    pub fn sha1_hex(&self) -> String {
        hex::encode(self.sha1)
    }

    pub fn sha256_hex(&self) -> String {
        hex::encode(self.sha256)
    }

    pub fn piece_hex(&self) -> Vec<String> {
        self.pieces.iter().map(hex::encode).collect()
    }

    /// All piece digests as one hex string.
    pub fn pieces_hex(&self) -> String {
        self.piece_hex().concat()
    }

    /// All piece digests as one raw byte string.
    pub fn pieces_raw(&self) -> Vec<u8> {
        self.pieces.concat()
    }

    pub fn piece_rsums_hex(&self) -> Option<Vec<String>> {
        self.piece_rsums.as_ref().map(|v| v.iter().map(hex::encode).collect())
    }

    pub fn btih_hex(&self) -> Option<String> {
        self.btih.map(hex::encode)
    }

    pub fn signature_text(&self) -> Option<String> {
        self.signature.as_ref().map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Plain-text summary, one `kind value` pair per line.
    pub fn dump_raw(&self) -> String {
        let mut r: Vec<String> = Vec::new();
        for p in self.piece_hex() {
            r.push(format!("piece {p}"));
        }
        if let Some(zs) = self.piece_rsums_hex() {
            for z in zs {
                r.push(format!("zpiece {z}"));
            }
        }
        r.push(format!("md5 {}", self.md5_hex()));
        r.push(format!("sha1 {}", self.sha1_hex()));
        r.push(format!("sha256 {}", self.sha256_hex()));
        if let Some(b) = self.btih_hex() {
            r.push(format!("btih {b}"));
        }
        r.join("\n")
    }
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Hash a byte stream in `cfg.chunk_size` reads.
///
/// `size` is the file size from metadata, used only to choose zsync
/// parameters. `path` names the source in errors. An invalid `cfg` is
/// rejected before anything is read.
pub fn hash_stream<R: Read>(
    mut reader: R,
    size: u64,
    path: &Path,
    cfg: &HashingConfig,
) -> Result<DigestSet> {
    cfg.validate()?;
    let chunk_size = cfg.chunk_size;
    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut pieces: Vec<[u8; 20]> = Vec::new();
    let mut piece_rsums: Vec<[u8; 4]> = Vec::new();
    let mut block_sums = cfg
        .compute_rolling_checksums
        .then(|| BlockSums::new(zsync::select(size, cfg.large_file_block_size_override)));

    let mut buf = vec![0u8; chunk_size];
    let mut short_read_before = false;
    let mut total = 0u64;
    loop {
        let n = read_full(&mut reader, &mut buf)
            .map_err(|source| Error::Read { path: path.to_path_buf(), source })?;
        if n == 0 {
            break;
        }
        if short_read_before {
            return Err(Error::InternalConsistency {
                path: path.to_path_buf(),
                detail: format!("{n} more bytes after a short read at offset {total}"),
            });
        }
        if n < chunk_size {
            short_read_before = true;
        }

        let chunk = &buf[..n];
        md5.update(chunk);
        sha1.update(chunk);
        sha256.update(chunk);
        if let Some(bs) = block_sums.as_mut() {
            bs.update(chunk);
        }
        if cfg.compute_pieces {
            pieces.push(Sha1::digest(chunk).into());
            if cfg.compute_piece_rolling_digest {
                buf[n..].fill(0);
                let mut r = zsync::rsum(&buf);
                r.reverse();
                piece_rsums.push(r);
            }
        }
        total += n as u64;
    }

    // An empty file still has one (empty) piece.
    if cfg.compute_pieces && pieces.is_empty() {
        pieces.push(Sha1::digest(b"").into());
        if cfg.compute_piece_rolling_digest {
            piece_rsums.push([0u8; 4]);
        }
    }

    let (zsync, zsums) = match block_sums {
        Some(bs) => {
            let params = bs.params();
            (Some(params), bs.finish())
        }
        None => (None, Vec::new()),
    };

    Ok(DigestSet {
        size: total,
        chunk_size,
        md5: md5.finalize().into(),
        sha1: sha1.finalize().into(),
        sha256: sha256.finalize().into(),
        pieces,
        piece_rsums: cfg.compute_piece_rolling_digest.then_some(piece_rsums),
        zsync,
        zsums,
        btih: None,
        signature: None,
    })
}

/// Hash the file at `path` and pick up its detached signature.
pub fn hash_file(path: &Path, size: u64, cfg: &HashingConfig) -> Result<DigestSet> {
    cfg.validate()?;
    let f = File::open(path).map_err(|source| Error::Read { path: path.to_path_buf(), source })?;
    let mut set = hash_stream(f, size, path, cfg)?;
    set.signature = read_signature(path, set.size);
    Ok(set)
}

pub fn signature_path(path: &Path) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(".asc");
    PathBuf::from(s)
}

/// Read `<path>.asc` if it exists and is strictly smaller than the file it
/// signs.
pub fn read_signature(path: &Path, file_size: u64) -> Option<Vec<u8>> {
    let sig = signature_path(path);
    let md = fs::metadata(&sig).ok()?;
    if !md.is_file() {
        return None;
    }
    if md.len() >= file_size {
        tracing::warn!(
            signature = %sig.display(),
            sig_size = md.len(),
            file_size,
            "ignoring signature file not smaller than the file it signs"
        );
        return None;
    }
    match fs::read(&sig) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(signature = %sig.display(), error = %e, "cannot read signature file");
            None
        }
    }
}
