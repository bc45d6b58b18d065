use crate::config::HashingConfig;
use crate::digest;
use crate::error::{Error, Result};
use crate::record::RecordFields;
use crate::snapshot::FileSnapshot;
use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub pieces_ok: u64,
    pub pieces_bad: u64,
    pub whole_file_ok: bool,
    /// Stored `(mtime, size)` still match the file.
    pub metadata_ok: bool,
}

impl VerifyReport {
    /// Content matches. Metadata drift alone is not a failure.
    pub fn is_ok(&self) -> bool {
        self.whole_file_ok && self.pieces_bad == 0
    }
}

/// Re-hash the file and compare it against its stored record.
///
/// Returns `None` if the path has no record or only a stub. Unlike the
/// controller this reads the content, so it catches changes that preserved
/// `(mtime, size)`.
pub fn verify<S: RecordStore>(store: &S, snapshot: &FileSnapshot) -> Result<Option<VerifyReport>> {
    let Some(fields) = store.fetch(&snapshot.key)?.and_then(|r| r.fields) else {
        return Ok(None);
    };
    compare(snapshot, &fields).map(Some)
}

fn compare(snapshot: &FileSnapshot, stored: &RecordFields) -> Result<VerifyReport> {
    let chunk_size = usize::try_from(stored.sha1_piece_size)
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| {
            Error::Configuration(format!(
                "stored piece size {} for {} is unusable",
                stored.sha1_piece_size, snapshot.key
            ))
        })?;
    let cfg = HashingConfig {
        chunk_size,
        compute_pieces: !stored.sha1_pieces.is_empty(),
        ..HashingConfig::default()
    };
    let fresh = digest::hash_file(&snapshot.path, snapshot.size, &cfg)?;

    let whole_file_ok = fresh.md5_hex() == stored.md5
        && fresh.sha1_hex() == stored.sha1
        && fresh.sha256_hex() == stored.sha256;

    let mut pieces_ok = 0u64;
    let mut pieces_bad = 0u64;
    if cfg.compute_pieces {
        let want = stored.piece_hex();
        let got = fresh.piece_hex();
        for (w, g) in want.iter().zip(&got) {
            if w == g {
                pieces_ok += 1;
            } else {
                pieces_bad += 1;
            }
        }
        pieces_bad += want.len().abs_diff(got.len()) as u64;
    }

    let metadata_ok = stored.mtime == snapshot.mtime && stored.size == snapshot.size;
    tracing::debug!(path = %snapshot.key, pieces_ok, pieces_bad, whole_file_ok, "verified");
    Ok(VerifyReport { pieces_ok, pieces_bad, whole_file_ok, metadata_ok })
}
