use super::{BlobHandle, BlobRef, RecordStore, StoreCapabilities, StoreTransaction};
use crate::error::{StoreError, StoreResult};
use crate::record::{RecordFields, RecordHead, RecordId, VerificationRecord};
use std::collections::{BTreeMap, HashMap};

/// Map-backed store. Used for `--db :memory:` runs and in tests.
#[derive(Debug)]
pub struct MemoryStore {
    records: BTreeMap<String, VerificationRecord>,
    keys: HashMap<RecordId, String>,
    next_id: i64,
    next_blob: i64,
    capabilities: StoreCapabilities,
    mutations: u64,
    batch_writes: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capabilities(StoreCapabilities { digests: true })
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capabilities(capabilities: StoreCapabilities) -> Self {
        Self {
            records: BTreeMap::new(),
            keys: HashMap::new(),
            next_id: 1,
            next_blob: 1,
            capabilities,
            mutations: 0,
            batch_writes: 0,
        }
    }

    /// Number of committed changes: stub inserts plus record updates.
    pub fn mutations(&self) -> u64 {
        self.mutations
    }

    /// Number of `write_batch` calls seen, committed or not.
    pub fn batch_writes(&self) -> u64 {
        self.batch_writes
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &VerificationRecord> {
        self.records.values()
    }
}

impl RecordStore for MemoryStore {
    type Tx<'a> = MemoryTransaction<'a>;

    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    fn lookup(&self, key: &str) -> StoreResult<Option<RecordHead>> {
        Ok(self.records.get(key).map(VerificationRecord::head))
    }

    fn insert_stub(&mut self, key: &str) -> StoreResult<RecordId> {
        if let Some(r) = self.records.get(key) {
            return Ok(r.id);
        }
        let id = RecordId(self.next_id);
        self.next_id += 1;
        self.records.insert(
            key.to_string(),
            VerificationRecord { id, path: key.to_string(), fields: None, zsums: None },
        );
        self.keys.insert(id, key.to_string());
        self.mutations += 1;
        Ok(id)
    }

    fn fetch(&self, key: &str) -> StoreResult<Option<VerificationRecord>> {
        Ok(self.records.get(key).cloned())
    }

    fn transaction(&mut self) -> StoreResult<MemoryTransaction<'_>> {
        Ok(MemoryTransaction { store: self, blobs: HashMap::new(), updates: Vec::new() })
    }
}

/// Buffers every write until commit.
pub struct MemoryTransaction<'a> {
    store: &'a mut MemoryStore,
    blobs: HashMap<i64, Vec<u8>>,
    updates: Vec<(RecordId, RecordFields, Option<i64>)>,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn open_blob_sink(&mut self, len: u64) -> StoreResult<BlobHandle> {
        let id = self.store.next_blob;
        self.store.next_blob += 1;
        self.blobs.insert(id, vec![0u8; len as usize]);
        Ok(BlobHandle::new(id, len))
    }

    fn write_batch(&mut self, handle: &mut BlobHandle, data: &[u8]) -> StoreResult<()> {
        let blob = self.blobs.get_mut(&handle.id).ok_or(StoreError::UnknownBlob(handle.id))?;
        let at = handle.advance(data.len())? as usize;
        blob[at..at + data.len()].copy_from_slice(data);
        self.store.batch_writes += 1;
        Ok(())
    }

    fn finalize_blob(&mut self, handle: BlobHandle) -> StoreResult<BlobRef> {
        if !self.blobs.contains_key(&handle.id) {
            return Err(StoreError::UnknownBlob(handle.id));
        }
        if handle.offset != handle.capacity {
            return Err(StoreError::Corrupt(format!(
                "blob {} finalized with {} of {} bytes written",
                handle.id, handle.offset, handle.capacity
            )));
        }
        Ok(BlobRef(handle.id))
    }

    fn update_record(
        &mut self,
        id: RecordId,
        fields: &RecordFields,
        zsums: Option<BlobRef>,
    ) -> StoreResult<()> {
        if !self.store.keys.contains_key(&id) {
            return Err(StoreError::NotFound(id.0));
        }
        if let Some(BlobRef(b)) = zsums {
            if !self.blobs.contains_key(&b) {
                return Err(StoreError::UnknownBlob(b));
            }
        }
        self.updates.push((id, fields.clone(), zsums.map(|b| b.0)));
        Ok(())
    }

    fn commit(mut self) -> StoreResult<()> {
        for (id, fields, blob) in std::mem::take(&mut self.updates) {
            let key = self.store.keys.get(&id).ok_or(StoreError::NotFound(id.0))?.clone();
            let zsums = blob.and_then(|b| self.blobs.remove(&b));
            if let Some(rec) = self.store.records.get_mut(&key) {
                rec.fields = Some(fields);
                rec.zsums = zsums;
                self.store.mutations += 1;
            }
        }
        Ok(())
    }
}
