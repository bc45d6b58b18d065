use super::{BlobHandle, BlobRef, RecordStore, StoreCapabilities, StoreTransaction};
use crate::error::{StoreError, StoreResult};
use crate::record::{RecordFields, RecordHead, RecordId, VerificationRecord};
use rusqlite::blob::ZeroBlob;
use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Row, Transaction};
use std::path::Path;

const FILES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS zsync_staging (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    data BLOB NOT NULL
);";

const HASHES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS hashes (
    file_id          INTEGER PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE,
    mtime            INTEGER NOT NULL,
    size             INTEGER NOT NULL,
    md5              TEXT NOT NULL,
    sha1             TEXT NOT NULL,
    sha256           TEXT NOT NULL,
    sha1_piece_size  INTEGER NOT NULL,
    sha1_pieces      TEXT NOT NULL,
    btih             TEXT NOT NULL,
    pgp              TEXT NOT NULL,
    zsync_block_size INTEGER,
    zsync_hash_lens  TEXT NOT NULL,
    zsums            BLOB
);";

/// SQLite-backed store.
///
/// `files` holds one row per path; a path without a `hashes` row is a stub.
/// zsync block sums are streamed into `zsync_staging` and moved onto the
/// `hashes` row when the record is updated.
pub struct SqliteStore {
    conn: Connection,
    capabilities: StoreCapabilities,
}

impl SqliteStore {
    /// Open or create a database with the full schema.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::bootstrap(conn, true)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::bootstrap(Connection::open_in_memory()?, true)
    }

    /// Use an existing connection without adding digest columns it lacks.
    pub fn from_connection(conn: Connection) -> StoreResult<Self> {
        Self::bootstrap(conn, false)
    }

    fn bootstrap(conn: Connection, with_digests: bool) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(FILES_SCHEMA)?;
        if with_digests {
            conn.execute_batch(HASHES_SCHEMA)?;
        }
        let digests = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'hashes'",
                [],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        tracing::debug!(digests, "sqlite store opened");
        Ok(Self { conn, capabilities: StoreCapabilities { digests } })
    }

    fn file_id(&self, key: &str) -> StoreResult<Option<RecordId>> {
        Ok(self
            .conn
            .query_row("SELECT id FROM files WHERE path = ?1", params![key], |r| r.get(0))
            .optional()?
            .map(RecordId))
    }
}

fn to_u64(v: i64, column: &str) -> StoreResult<u64> {
    u64::try_from(v).map_err(|_| StoreError::Corrupt(format!("negative {column}: {v}")))
}

fn read_fields(row: &Row<'_>) -> rusqlite::Result<(RecordFieldsRaw, Option<Vec<u8>>)> {
    Ok((
        RecordFieldsRaw {
            mtime: row.get(0)?,
            size: row.get(1)?,
            md5: row.get(2)?,
            sha1: row.get(3)?,
            sha256: row.get(4)?,
            sha1_piece_size: row.get(5)?,
            sha1_pieces: row.get(6)?,
            btih: row.get(7)?,
            pgp: row.get(8)?,
            zsync_block_size: row.get(9)?,
            zsync_hash_lens: row.get(10)?,
        },
        row.get(11)?,
    ))
}

/// Column values as SQLite hands them back, before range checks.
struct RecordFieldsRaw {
    mtime: i64,
    size: i64,
    md5: String,
    sha1: String,
    sha256: String,
    sha1_piece_size: i64,
    sha1_pieces: String,
    btih: String,
    pgp: String,
    zsync_block_size: Option<i64>,
    zsync_hash_lens: String,
}

impl RecordFieldsRaw {
    fn into_fields(self) -> StoreResult<RecordFields> {
        Ok(RecordFields {
            mtime: self.mtime,
            size: to_u64(self.size, "size")?,
            md5: self.md5,
            sha1: self.sha1,
            sha256: self.sha256,
            sha1_piece_size: to_u64(self.sha1_piece_size, "sha1_piece_size")?,
            sha1_pieces: self.sha1_pieces,
            btih: self.btih,
            pgp: self.pgp,
            zsync_block_size: self
                .zsync_block_size
                .map(|b| to_u64(b, "zsync_block_size"))
                .transpose()?,
            zsync_hash_lens: self.zsync_hash_lens,
        })
    }
}

impl RecordStore for SqliteStore {
    type Tx<'a> = SqliteTransaction<'a>;

    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    fn lookup(&self, key: &str) -> StoreResult<Option<RecordHead>> {
        if !self.capabilities.digests {
            return Ok(self.file_id(key)?.map(RecordHead::stub));
        }
        let row = self
            .conn
            .query_row(
                "SELECT f.id, h.mtime, h.size FROM files f
                 LEFT JOIN hashes h ON h.file_id = f.id
                 WHERE f.path = ?1",
                params![key],
                |r| Ok((r.get::<_, i64>(0)?, r.get::<_, Option<i64>>(1)?, r.get::<_, Option<i64>>(2)?)),
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((id, mtime, size)) => Ok(Some(RecordHead {
                id: RecordId(id),
                mtime,
                size: size.map(|s| to_u64(s, "size")).transpose()?,
            })),
        }
    }

    fn insert_stub(&mut self, key: &str) -> StoreResult<RecordId> {
        self.conn.execute(
            "INSERT INTO files (path) VALUES (?1) ON CONFLICT(path) DO NOTHING",
            params![key],
        )?;
        self.file_id(key)?
            .ok_or_else(|| StoreError::Corrupt(format!("stub for {key} vanished after insert")))
    }

    fn fetch(&self, key: &str) -> StoreResult<Option<VerificationRecord>> {
        let Some(id) = self.file_id(key)? else {
            return Ok(None);
        };
        if !self.capabilities.digests {
            return Ok(Some(VerificationRecord {
                id,
                path: key.to_string(),
                fields: None,
                zsums: None,
            }));
        }
        let row = self
            .conn
            .query_row(
                "SELECT mtime, size, md5, sha1, sha256, sha1_piece_size, sha1_pieces,
                        btih, pgp, zsync_block_size, zsync_hash_lens, zsums
                 FROM hashes WHERE file_id = ?1",
                params![id.0],
                read_fields,
            )
            .optional()?;
        let (fields, zsums) = match row {
            Some((raw, zsums)) => (Some(raw.into_fields()?), zsums),
            None => (None, None),
        };
        Ok(Some(VerificationRecord { id, path: key.to_string(), fields, zsums }))
    }

    fn transaction(&mut self) -> StoreResult<SqliteTransaction<'_>> {
        Ok(SqliteTransaction { tx: self.conn.transaction()? })
    }
}

pub struct SqliteTransaction<'a> {
    tx: Transaction<'a>,
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn open_blob_sink(&mut self, len: u64) -> StoreResult<BlobHandle> {
        let zero_len = i32::try_from(len)
            .map_err(|_| StoreError::BlobOverflow { written: len, capacity: i32::MAX as u64 })?;
        self.tx
            .execute("INSERT INTO zsync_staging (data) VALUES (?1)", params![ZeroBlob(zero_len)])?;
        Ok(BlobHandle::new(self.tx.last_insert_rowid(), len))
    }

    fn write_batch(&mut self, handle: &mut BlobHandle, data: &[u8]) -> StoreResult<()> {
        let mut blob = self
            .tx
            .blob_open(DatabaseName::Main, "zsync_staging", "data", handle.id, false)?;
        let at = handle.advance(data.len())?;
        blob.write_at(data, at as usize)?;
        Ok(())
    }

    fn finalize_blob(&mut self, handle: BlobHandle) -> StoreResult<BlobRef> {
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
        let exists = self
            .tx
            .query_row("SELECT 1 FROM files WHERE id = ?1", params![id.0], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(StoreError::NotFound(id.0));
        }
        let blob_id = zsums.map(|b| b.0);
        if let Some(b) = blob_id {
            let staged = self
                .tx
                .query_row("SELECT 1 FROM zsync_staging WHERE id = ?1", params![b], |_| Ok(()))
                .optional()?
                .is_some();
            if !staged {
                return Err(StoreError::UnknownBlob(b));
            }
        }
        self.tx.execute(
            "INSERT INTO hashes (file_id, mtime, size, md5, sha1, sha256, sha1_piece_size,
                                 sha1_pieces, btih, pgp, zsync_block_size, zsync_hash_lens, zsums)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     (SELECT data FROM zsync_staging WHERE id = ?13))
             ON CONFLICT(file_id) DO UPDATE SET
                mtime = excluded.mtime,
                size = excluded.size,
                md5 = excluded.md5,
                sha1 = excluded.sha1,
                sha256 = excluded.sha256,
                sha1_piece_size = excluded.sha1_piece_size,
                sha1_pieces = excluded.sha1_pieces,
                btih = excluded.btih,
                pgp = excluded.pgp,
                zsync_block_size = excluded.zsync_block_size,
                zsync_hash_lens = excluded.zsync_hash_lens,
                zsums = excluded.zsums",
            params![
                id.0,
                fields.mtime,
                fields.size as i64,
                fields.md5,
                fields.sha1,
                fields.sha256,
                fields.sha1_piece_size as i64,
                fields.sha1_pieces,
                fields.btih,
                fields.pgp,
                fields.zsync_block_size.map(|b| b as i64),
                fields.zsync_hash_lens,
                blob_id,
            ],
        )?;
        if let Some(b) = blob_id {
            self.tx.execute("DELETE FROM zsync_staging WHERE id = ?1", params![b])?;
        }
        Ok(())
    }

    fn commit(self) -> StoreResult<()> {
        self.tx.commit()?;
        Ok(())
    }
}
