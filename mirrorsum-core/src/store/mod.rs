//! Record store abstraction.
//!
//! The controller only talks to a store through these traits. Every update
//! of a record happens inside one [`StoreTransaction`]; dropping a
//! transaction without calling [`StoreTransaction::commit`] discards it.

use crate::error::StoreResult;
use crate::record::{RecordFields, RecordHead, RecordId, VerificationRecord};

mod memory;
mod sqlite;

pub use memory::{MemoryStore, MemoryTransaction};
pub use sqlite::{SqliteStore, SqliteTransaction};

/// What the backing schema can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// Digest columns exist. Without them only stubs can be recorded.
    pub digests: bool,
}

/// Reference to a finished blob, passed to [`StoreTransaction::update_record`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobRef(pub i64);

/// Write cursor into a preallocated blob.
#[derive(Debug)]
pub struct BlobHandle {
    pub(crate) id: i64,
    pub(crate) offset: u64,
    pub(crate) capacity: u64,
}

impl BlobHandle {
    pub(crate) fn new(id: i64, capacity: u64) -> Self {
        Self { id, offset: 0, capacity }
    }

    pub fn written(&self) -> u64 {
        self.offset
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Reserve `len` bytes at the cursor and return their offset.
    pub(crate) fn advance(&mut self, len: usize) -> StoreResult<u64> {
        let end = self.offset + len as u64;
        if end > self.capacity {
            return Err(crate::error::StoreError::BlobOverflow {
                written: end,
                capacity: self.capacity,
            });
        }
        let at = self.offset;
        self.offset = end;
        Ok(at)
    }
}

pub trait StoreTransaction {
    /// Allocate a blob of exactly `len` bytes to be filled by `write_batch`.
    fn open_blob_sink(&mut self, len: u64) -> StoreResult<BlobHandle>;

    /// Append `data` at the handle's cursor.
    fn write_batch(&mut self, handle: &mut BlobHandle, data: &[u8]) -> StoreResult<()>;

    fn finalize_blob(&mut self, handle: BlobHandle) -> StoreResult<BlobRef>;

    /// Replace every digest column of record `id`. `zsums` of `None` clears
    /// any stored block sums.
    fn update_record(
        &mut self,
        id: RecordId,
        fields: &RecordFields,
        zsums: Option<BlobRef>,
    ) -> StoreResult<()>;

    fn commit(self) -> StoreResult<()>;
}

pub trait RecordStore {
    type Tx<'a>: StoreTransaction
    where
        Self: 'a;

    fn capabilities(&self) -> StoreCapabilities;

    fn lookup(&self, key: &str) -> StoreResult<Option<RecordHead>>;

    /// Create an empty record for `key`. Returns the existing id if one is
    /// already there.
    fn insert_stub(&mut self, key: &str) -> StoreResult<RecordId>;

    fn fetch(&self, key: &str) -> StoreResult<Option<VerificationRecord>>;

    fn transaction(&mut self) -> StoreResult<Self::Tx<'_>>;
}
