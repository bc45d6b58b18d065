//! Error types for the hashing engine and the record store adapters.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The file vanished or could not be read while hashing.
    #[error("read error on {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The byte stream returned data after a short read.
    #[error("internal consistency error on {path}: {detail}")]
    InternalConsistency { path: PathBuf, detail: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    /// Returns `true` if the error only concerns the path being processed,
    /// so the caller may continue with the next file.
    pub fn is_per_path(&self) -> bool {
        matches!(self, Error::Read { .. } | Error::InternalConsistency { .. } | Error::InvalidPath(_))
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("no record with id {0}")]
    NotFound(i64),

    #[error("unknown blob handle {0}")]
    UnknownBlob(i64),

    #[error("blob sink overflow: {written} of {capacity} bytes")]
    BlobOverflow { written: u64, capacity: u64 },

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, Error>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
