//! Per-invocation view of a file's metadata.

use crate::error::{Error, Result};
use crate::path_safety::relative_key;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// File type, resolved once from `lstat`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Symlink,
    Regular,
    Directory,
    Other,
}

impl FileKind {
    pub fn from_metadata(md: &Metadata) -> Self {
        let ft = md.file_type();
        if ft.is_symlink() {
            FileKind::Symlink
        } else if ft.is_file() {
            FileKind::Regular
        } else if ft.is_dir() {
            FileKind::Directory
        } else {
            FileKind::Other
        }
    }
}

#[derive(Clone, Debug)]
pub struct FileSnapshot {
    /// Location on disk.
    pub path: PathBuf,
    /// Store key, relative to the base directory.
    pub key: String,
    pub basename: String,
    pub dir: PathBuf,
    pub size: u64,
    /// Modification time in whole seconds since the epoch.
    pub mtime: i64,
    pub kind: FileKind,
}

impl FileSnapshot {
    /// `lstat` the file; symlinks are described, not followed.
    pub fn capture(path: &Path, base_dir: Option<&Path>) -> Result<Self> {
        let md = fs::symlink_metadata(path)
            .map_err(|source| Error::Read { path: path.to_path_buf(), source })?;
        let key = relative_key(path, base_dir)?;
        let basename = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath(format!("no file name in {:?}", path)))?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            key,
            basename,
            dir,
            size: md.len(),
            mtime: mtime_secs(&md),
            kind: FileKind::from_metadata(&md),
        })
    }

    pub fn is_regular(&self) -> bool {
        self.kind == FileKind::Regular
    }
}

fn mtime_secs(md: &Metadata) -> i64 {
    match md.modified() {
        Ok(t) => match t.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        },
        Err(_) => 0,
    }
}
