//! Hashing configuration and the TOML config file it is usually loaded from.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CHUNK_SIZE: usize = 262_144;
/// Chunk sizes must be a multiple of this when zsync block sums are enabled.
pub const ZSYNC_CHUNK_ALIGN: usize = 4096;
pub const MIN_BLOCK_OVERRIDE: u64 = 1024;

/// Per-call hashing options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashingConfig {
    pub chunk_size: usize,
    /// Emit the flat zsync block-checksum stream.
    pub compute_rolling_checksums: bool,
    /// Emit per-piece SHA1 digests.
    pub compute_pieces: bool,
    /// Emit a 4-byte rsum per piece (requires `compute_pieces`).
    pub compute_piece_rolling_digest: bool,
    /// zsync block size for files larger than 1 GiB.
    pub large_file_block_size_override: Option<u64>,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compute_rolling_checksums: false,
            compute_pieces: true,
            compute_piece_rolling_digest: false,
            large_file_block_size_override: None,
        }
    }
}

impl HashingConfig {
    /// Reject configurations that would be wrong for every file.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Configuration("chunk_size must be positive".into()));
        }
        if self.compute_rolling_checksums && self.chunk_size % ZSYNC_CHUNK_ALIGN != 0 {
            return Err(Error::Configuration(format!(
                "chunk_size {} must be a multiple of {} when zsync hashes are enabled",
                self.chunk_size, ZSYNC_CHUNK_ALIGN
            )));
        }
        if self.compute_piece_rolling_digest && !self.compute_pieces {
            return Err(Error::Configuration(
                "chunked_with_zsync requires chunked_hashes".into(),
            ));
        }
        if let Some(n) = self.large_file_block_size_override {
            if n < MIN_BLOCK_OVERRIDE || !n.is_power_of_two() {
                return Err(Error::Configuration(format!(
                    "zsync_block_size_for_1G must be a power of two >= {MIN_BLOCK_OVERRIDE}, got {n}"
                )));
            }
        }
        Ok(())
    }
}

/// Validate a configured zsync block size for large files.
///
/// Values below 1024 are ignored. Anything else is rounded down to a power
/// of two.
pub fn normalize_block_override(n: u64) -> Option<u64> {
    if n < MIN_BLOCK_OVERRIDE {
        tracing::warn!(value = n, "zsync_block_size_for_1G is too small, ignoring");
        return None;
    }
    if n.is_power_of_two() {
        return Some(n);
    }
    let adjusted = 1u64 << (63 - n.leading_zeros());
    tracing::warn!(
        value = n,
        adjusted,
        "zsync_block_size_for_1G must be a power of 2, adjusting down"
    );
    Some(adjusted)
}

/// Contents of `mirrorsum.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub hashing: HashingSection,
    pub database: DatabaseSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashingSection {
    #[serde(default)]
    pub zsync_hashes: bool,
    #[serde(default = "default_chunked_hashes")]
    pub chunked_hashes: bool,
    #[serde(default)]
    pub chunked_with_zsync: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default, rename = "zsync_block_size_for_1G")]
    pub zsync_block_size_for_1g: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_chunked_hashes() -> bool {
    true
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_db_path() -> PathBuf {
    PathBuf::from("mirrorsum.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for HashingSection {
    fn default() -> Self {
        Self {
            zsync_hashes: false,
            chunked_hashes: default_chunked_hashes(),
            chunked_with_zsync: false,
            chunk_size: default_chunk_size(),
            zsync_block_size_for_1g: None,
        }
    }
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl Default for LogSection {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("read {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Configuration(e.to_string()))
    }
}

impl HashingSection {
    /// Build a validated [`HashingConfig`], normalizing the large-file
    /// block size on the way.
    pub fn to_hashing_config(&self) -> Result<HashingConfig> {
        let cfg = HashingConfig {
            chunk_size: self.chunk_size,
            compute_rolling_checksums: self.zsync_hashes,
            compute_pieces: self.chunked_hashes,
            compute_piece_rolling_digest: self.chunked_with_zsync,
            large_file_block_size_override: self
                .zsync_block_size_for_1g
                .and_then(normalize_block_override),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}
