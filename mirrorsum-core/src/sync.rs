//! Staleness and synchronization controller.
//!
//! Decides from `(mtime, size)` alone whether a path's stored digests are
//! still valid, and rewrites the record in a single transaction when they
//! are not.

use crate::btih::{self, InfoHashInput};
use crate::config::HashingConfig;
use crate::digest::{self, DigestSet};
use crate::error::Result;
use crate::record::{RecordFields, RecordHead, RecordId};
use crate::snapshot::{FileKind, FileSnapshot};
use crate::store::{RecordStore, StoreTransaction};
use std::path::Path;

/// Block-sum entries written per `write_batch` call.
pub const DEFAULT_BATCH_ENTRIES: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// No record for the path.
    Unknown,
    /// Record exists but was never hashed.
    Stub,
    /// Stored `(mtime, size)` match the file.
    Fresh,
    /// Stored digests are out of date, or a rehash was forced.
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    NotRegular(FileKind),
    StubCreated(RecordId),
    WouldCreateStub,
    /// `skip_metadata` run over a path that already has a record.
    Known(RecordId),
    UpToDate(RecordId),
    WouldHash(Freshness),
    Hashed { id: RecordId, previous: Freshness },
}

impl SyncOutcome {
    /// True if the outcome reflects a write to the store.
    pub fn mutated(&self) -> bool {
        matches!(self, SyncOutcome::StubCreated(_) | SyncOutcome::Hashed { .. })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Report what would happen; never write.
    pub dry_run: bool,
    /// Treat fresh records as stale.
    pub force: bool,
    /// Only track existence: stop after the stub.
    pub skip_metadata: bool,
}

pub struct Synchronizer<S: RecordStore> {
    store: S,
    config: HashingConfig,
    options: SyncOptions,
    batch_entries: usize,
}

impl<S: RecordStore> Synchronizer<S> {
    /// Fails with `Error::Configuration` if `config` is unusable.
    pub fn new(store: S, config: HashingConfig, mut options: SyncOptions) -> Result<Self> {
        config.validate()?;
        if !store.capabilities().digests && !options.skip_metadata {
            tracing::warn!("record store has no digest columns, only tracking paths");
            options.skip_metadata = true;
        }
        Ok(Self { store, config, options, batch_entries: DEFAULT_BATCH_ENTRIES })
    }

    pub fn with_batch_entries(mut self, entries: usize) -> Self {
        self.batch_entries = entries.max(1);
        self
    }

    pub fn config(&self) -> &HashingConfig {
        &self.config
    }

    pub fn options(&self) -> SyncOptions {
        self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Classify a path without touching the file contents.
    pub fn freshness(&self, snapshot: &FileSnapshot) -> Result<(Freshness, Option<RecordHead>)> {
        let head = self.store.lookup(&snapshot.key)?;
        Ok((classify(head.as_ref(), snapshot, self.options.force), head))
    }

    pub fn sync_path(&mut self, path: &Path, base_dir: Option<&Path>) -> Result<SyncOutcome> {
        let snapshot = FileSnapshot::capture(path, base_dir)?;
        self.sync(&snapshot)
    }

    pub fn sync(&mut self, snapshot: &FileSnapshot) -> Result<SyncOutcome> {
        if !snapshot.is_regular() {
            tracing::debug!(path = %snapshot.key, kind = ?snapshot.kind, "not a regular file");
            return Ok(SyncOutcome::NotRegular(snapshot.kind));
        }
        let opts = self.options;
        let (state, head) = self.freshness(snapshot)?;

        let head = match head {
            Some(h) if opts.skip_metadata => return Ok(SyncOutcome::Known(h.id)),
            Some(h) => h,
            None if opts.dry_run => {
                tracing::info!(path = %snapshot.key, "would insert stub");
                if opts.skip_metadata {
                    return Ok(SyncOutcome::WouldCreateStub);
                }
                tracing::info!(path = %snapshot.key, ?state, "would hash");
                return Ok(SyncOutcome::WouldHash(state));
            }
            None => {
                let id = self.store.insert_stub(&snapshot.key)?;
                tracing::info!(path = %snapshot.key, %id, "inserted stub");
                if opts.skip_metadata {
                    return Ok(SyncOutcome::StubCreated(id));
                }
                RecordHead::stub(id)
            }
        };

        if state == Freshness::Fresh {
            tracing::debug!(path = %snapshot.key, "up to date");
            return Ok(SyncOutcome::UpToDate(head.id));
        }
        if opts.dry_run {
            tracing::info!(path = %snapshot.key, ?state, "would hash");
            return Ok(SyncOutcome::WouldHash(state));
        }

        let set = compute_digests(snapshot, &self.config)?;
        self.persist(head.id, snapshot, &set)?;
        tracing::info!(
            path = %snapshot.key,
            id = %head.id,
            ?state,
            size = set.size,
            pieces = set.pieces.len(),
            zsums = set.zsums.len(),
            "updated record"
        );
        Ok(SyncOutcome::Hashed { id: head.id, previous: state })
    }

    fn persist(&mut self, id: RecordId, snapshot: &FileSnapshot, set: &DigestSet) -> Result<()> {
        let fields = RecordFields::from_digests(snapshot.mtime, snapshot.size, set);
        let batch_len = set.zsync.map_or(1, |z| z.entry_len()) * self.batch_entries;

        let mut tx = self.store.transaction()?;
        let blob = if set.zsums.is_empty() {
            None
        } else {
            let mut sink = tx.open_blob_sink(set.zsums.len() as u64)?;
            for batch in set.zsums.chunks(batch_len) {
                tx.write_batch(&mut sink, batch)?;
            }
            Some(tx.finalize_blob(sink)?)
        };
        tx.update_record(id, &fields, blob)?;
        tx.commit()?;
        Ok(())
    }
}

fn classify(head: Option<&RecordHead>, snapshot: &FileSnapshot, force: bool) -> Freshness {
    match head {
        None => Freshness::Unknown,
        Some(h) if h.is_stub() => Freshness::Stub,
        Some(h) if !force && h.matches(snapshot.mtime, snapshot.size) => Freshness::Fresh,
        Some(_) => Freshness::Stale,
    }
}

/// Run the digest pipeline over a snapshot and add the info-hash when
/// pieces were computed.
pub fn compute_digests(snapshot: &FileSnapshot, cfg: &HashingConfig) -> Result<DigestSet> {
    let mut set = digest::hash_file(&snapshot.path, snapshot.size, cfg)?;
    if cfg.compute_pieces {
        let pieces = set.pieces_raw();
        let md5_hex = set.md5_hex();
        let hash = btih::info_hash(&InfoHashInput {
            size: set.size,
            name: &snapshot.basename,
            piece_length: set.chunk_size,
            md5_hex: &md5_hex,
            pieces: &pieces,
            sha1: &set.sha1,
            sha256: &set.sha256,
        });
        set.btih = Some(hash);
    }
    Ok(set)
}
