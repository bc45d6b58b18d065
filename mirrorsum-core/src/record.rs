use crate::digest::DigestSet;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a lookup returns: enough to decide staleness without loading digests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHead {
    pub id: RecordId,
    /// `None` for a stub that has never been hashed.
    pub mtime: Option<i64>,
    pub size: Option<u64>,
}

impl RecordHead {
    pub fn stub(id: RecordId) -> Self {
        Self { id, mtime: None, size: None }
    }

    pub fn is_stub(&self) -> bool {
        self.mtime.is_none()
    }

    pub fn matches(&self, mtime: i64, size: u64) -> bool {
        self.mtime == Some(mtime) && self.size == Some(size)
    }
}

/// The digest columns of a record, hex encoded. Always written as a unit.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RecordFields {
    pub mtime: i64,
    pub size: u64,
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
    pub sha1_piece_size: u64,
    /// Concatenated hex SHA1 of every piece.
    pub sha1_pieces: String,
    pub btih: String,
    /// Detached PGP signature text, or empty.
    pub pgp: String,
    pub zsync_block_size: Option<u64>,
    /// `seq_matches,rsum_len,checksum_len`, or empty.
    pub zsync_hash_lens: String,
}

impl RecordFields {
    /// Pair freshly computed digests with the metadata they were taken under.
    pub fn from_digests(mtime: i64, size: u64, set: &DigestSet) -> Self {
        Self {
            mtime,
            size,
            md5: set.md5_hex(),
            sha1: set.sha1_hex(),
            sha256: set.sha256_hex(),
            sha1_piece_size: set.chunk_size as u64,
            sha1_pieces: set.pieces_hex(),
            btih: set.btih_hex().unwrap_or_default(),
            pgp: set.signature_text().unwrap_or_default(),
            zsync_block_size: set.zsync.map(|z| z.block_size),
            zsync_hash_lens: set.zsync.map(|z| z.hash_lens()).unwrap_or_default(),
        }
    }

    /// Split `sha1_pieces` back into one hex digest per piece.
    pub fn piece_hex(&self) -> Vec<String> {
        self.sha1_pieces
            .as_bytes()
            .chunks(40)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect()
    }
}

/// A full persisted record, as read back from a store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VerificationRecord {
    pub id: RecordId,
    pub path: String,
    /// `None` while the record is a stub.
    pub fields: Option<RecordFields>,
    #[serde(skip)]
    pub zsums: Option<Vec<u8>>,
}

impl VerificationRecord {
    pub fn head(&self) -> RecordHead {
        match &self.fields {
            Some(f) => RecordHead { id: self.id, mtime: Some(f.mtime), size: Some(f.size) },
            None => RecordHead::stub(self.id),
        }
    }
}
