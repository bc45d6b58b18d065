use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use fs2::FileExt;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use walkdir::WalkDir;

use mirrorsum_core::config::{normalize_block_override, FileConfig, HashingConfig};
use mirrorsum_core::snapshot::FileSnapshot;
use mirrorsum_core::store::{MemoryStore, RecordStore, SqliteStore};
use mirrorsum_core::sync::{self, Freshness, SyncOptions, SyncOutcome, Synchronizer};
use mirrorsum_core::{verify, zsync};

const DEFAULT_CONFIG: &str = "mirrorsum.toml";
const LOCK_FILE: &str = ".mirrorsum.lock";
const MEMORY_DB: &str = ":memory:";

#[derive(Parser)]
#[command(name = "mirrorsum", version, about = "Layered file digests for mirror trees")]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args)]
struct HashingArgs {
    #[arg(long)] config: Option<PathBuf>,
    #[arg(long)] chunk_size: Option<usize>,
    /// Compute zsync block sums
    #[arg(long, default_value_t = false)] zsync: bool,
    /// Skip per-piece SHA1 digests (and the info-hash)
    #[arg(long, default_value_t = false)] no_chunked: bool,
    #[arg(long = "zsync-block-size-for-1g")] zsync_block_size_for_1g: Option<u64>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Hash files and synchronise their records
    Hash {
        #[command(flatten)] hashing: HashingArgs,
        /// Database file, or :memory:
        #[arg(long)] db: Option<PathBuf>,
        #[arg(long)] base_dir: Option<PathBuf>,
        #[arg(long, default_value_t = false)] dry_run: bool,
        #[arg(long, default_value_t = false)] force: bool,
        #[arg(long, default_value_t = false)] skip_metadata: bool,
        #[arg(long)] include: Vec<String>,
        #[arg(long)] exclude: Vec<String>,
        /// Print the run summary as JSON
        #[arg(long, default_value_t = false)] json: bool,
        #[arg(required = true)] paths: Vec<PathBuf>,
    },
    /// Print the digests of one file without touching a database
    Show {
        #[command(flatten)] hashing: HashingArgs,
        file: PathBuf,
    },
    /// Print zsync parameters chosen for a file size
    Params {
        size: u64,
        #[arg(long = "zsync-block-size-for-1g")] zsync_block_size_for_1g: Option<u64>,
        #[arg(long, default_value_t = false)] json: bool,
    },
    /// Re-hash a file and compare it with its stored record
    Verify {
        #[arg(long)] config: Option<PathBuf>,
        #[arg(long)] db: Option<PathBuf>,
        #[arg(long)] base_dir: Option<PathBuf>,
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Hash { hashing, db, base_dir, dry_run, force, skip_metadata, include, exclude, json, paths } => {
            let file_cfg = load_config(hashing.config.as_deref())?;
            init_logging(cli.log_level.as_deref(), &file_cfg);
            let cfg = hashing_config(&file_cfg, &hashing)?;
            let db = db.unwrap_or_else(|| file_cfg.database.path.clone());
            let opts = SyncOptions { dry_run, force, skip_metadata };
            let walk = WalkOptions { base_dir, include, exclude, db: db.clone() };
            let summary = if db.as_os_str() == MEMORY_DB {
                hash(Synchronizer::new(MemoryStore::new(), cfg, opts)?, &walk, &paths)?
            } else {
                let store = SqliteStore::open(&db).with_context(|| format!("open {}", db.display()))?;
                hash(Synchronizer::new(store, cfg, opts)?, &walk, &paths)?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary.line());
            }
            if summary.failed > 0 {
                bail!("{} path(s) failed", summary.failed);
            }
        }
        Cmd::Show { hashing, file } => {
            let file_cfg = load_config(hashing.config.as_deref())?;
            init_logging(cli.log_level.as_deref(), &file_cfg);
            let cfg = hashing_config(&file_cfg, &hashing)?;
            show(&file, &cfg)?;
        }
        Cmd::Params { size, zsync_block_size_for_1g, json } => {
            init_logging(cli.log_level.as_deref(), &FileConfig::default());
            let p = zsync::select(size, zsync_block_size_for_1g.and_then(normalize_block_override));
            if json {
                println!("{}", serde_json::to_string_pretty(&p)?);
            } else {
                println!(
                    "block_size={} seq_matches={} rsum_len={} checksum_len={}",
                    p.block_size, p.seq_matches, p.rsum_len, p.checksum_len
                );
            }
        }
        Cmd::Verify { config, db, base_dir, file } => {
            let file_cfg = load_config(config.as_deref())?;
            init_logging(cli.log_level.as_deref(), &file_cfg);
            let db = db.unwrap_or_else(|| file_cfg.database.path.clone());
            if !db.exists() {
                bail!("database {} does not exist", db.display());
            }
            let store = SqliteStore::open(&db).with_context(|| format!("open {}", db.display()))?;
            verify_file(&store, &file, base_dir.as_deref())?;
        }
    }
    Ok(())
}

/// RUST_LOG wins, then `--log-level`, then the config file.
fn init_logging(flag: Option<&str>, file_cfg: &FileConfig) {
    let level = flag.unwrap_or(file_cfg.log.level.as_str());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<FileConfig> {
    match path {
        Some(p) => FileConfig::load(p).with_context(|| format!("load config {}", p.display())),
        None if Path::new(DEFAULT_CONFIG).is_file() => {
            FileConfig::load(Path::new(DEFAULT_CONFIG)).context("load ./mirrorsum.toml")
        }
        None => Ok(FileConfig::default()),
    }
}

fn hashing_config(file_cfg: &FileConfig, args: &HashingArgs) -> Result<HashingConfig> {
    let mut section = file_cfg.hashing.clone();
    if let Some(n) = args.chunk_size { section.chunk_size = n; }
    if args.zsync { section.zsync_hashes = true; }
    if args.no_chunked {
        section.chunked_hashes = false;
        section.chunked_with_zsync = false;
    }
    if args.zsync_block_size_for_1g.is_some() {
        section.zsync_block_size_for_1g = args.zsync_block_size_for_1g;
    }
    Ok(section.to_hashing_config()?)
}

struct WalkOptions {
    base_dir: Option<PathBuf>,
    include: Vec<String>,
    exclude: Vec<String>,
    db: PathBuf,
}

fn build_globset(includes: &[String], excludes: &[String]) -> Result<(GlobSet, GlobSet)> {
    let mut incb = GlobSetBuilder::new();
    let mut excb = GlobSetBuilder::new();
    if includes.is_empty() { incb.add(Glob::new("**/*")?); }
    for g in includes { incb.add(Glob::new(g)?); }
    for g in excludes { excb.add(Glob::new(g)?); }
    Ok((incb.build()?, excb.build()?))
}

/// Files to process, grouped by directory, each with the base its key is
/// taken relative to.
fn list_files(inputs: &[PathBuf], walk: &WalkOptions) -> Result<BTreeMap<PathBuf, Vec<(PathBuf, PathBuf)>>> {
    let (inc, exc) = build_globset(&walk.include, &walk.exclude)?;
    let db = fs::canonicalize(&walk.db).ok();
    let mut by_dir: BTreeMap<PathBuf, Vec<(PathBuf, PathBuf)>> = BTreeMap::new();
    for p in inputs {
        let md = fs::metadata(p).with_context(|| format!("stat {}", p.display()))?;
        let root = if md.is_dir() { p.clone() } else { p.parent().map(Path::to_path_buf).unwrap_or_default() };
        let base = walk.base_dir.clone().unwrap_or_else(|| root.clone());
        for e in WalkDir::new(p).follow_links(false).sort_by_file_name() {
            let e = e.with_context(|| format!("walk {}", p.display()))?;
            if e.file_type().is_dir() || e.file_name() == LOCK_FILE { continue; }
            let path = e.path();
            if db.is_some() && fs::canonicalize(path).ok() == db { continue; }
            let rel = pathdiff::diff_paths(path, &root).unwrap_or_else(|| path.to_path_buf());
            let rel = rel.to_string_lossy().replace('\\', "/");
            if !inc.is_match(&rel) || exc.is_match(&rel) { continue; }
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            by_dir.entry(dir).or_default().push((path.to_path_buf(), base.clone()));
        }
    }
    Ok(by_dir)
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    inserted: u64,
    updated: u64,
    up_to_date: u64,
    planned: u64,
    skipped: u64,
    failed: u64,
    started_utc: String,
    finished_utc: String,
}

impl Summary {
    fn record(&mut self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::StubCreated(_) => self.inserted += 1,
            SyncOutcome::Hashed { previous: Freshness::Unknown, .. } => self.inserted += 1,
            SyncOutcome::Hashed { .. } => self.updated += 1,
            SyncOutcome::UpToDate(_) | SyncOutcome::Known(_) => self.up_to_date += 1,
            SyncOutcome::WouldCreateStub | SyncOutcome::WouldHash(_) => self.planned += 1,
            SyncOutcome::NotRegular(_) => self.skipped += 1,
        }
    }

    fn line(&self) -> String {
        format!(
            "inserted={} updated={} up_to_date={} planned={} skipped={} failed={}",
            self.inserted, self.updated, self.up_to_date, self.planned, self.skipped, self.failed
        )
    }
}

fn hash<S: RecordStore>(mut controller: Synchronizer<S>, walk: &WalkOptions, inputs: &[PathBuf]) -> Result<Summary> {
    let mut summary = Summary { started_utc: chrono::Utc::now().to_rfc3339(), ..Summary::default() };
    for (dir, files) in list_files(inputs, walk)? {
        let lock_path = dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("open lock {}", lock_path.display()))?;
        lock.lock_exclusive().with_context(|| format!("lock {}", dir.display()))?;
        for (path, base) in files {
            match controller.sync_path(&path, Some(&base)) {
                Ok(outcome) => summary.record(&outcome),
                Err(e) if e.is_per_path() => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping path");
                    summary.failed += 1;
                }
                Err(e) => return Err(e).with_context(|| format!("hash {}", path.display())),
            }
        }
        lock.unlock().with_context(|| format!("unlock {}", dir.display()))?;
    }
    summary.finished_utc = chrono::Utc::now().to_rfc3339();
    Ok(summary)
}

fn show(file: &Path, cfg: &HashingConfig) -> Result<()> {
    let snapshot = FileSnapshot::capture(file, file.parent())?;
    if !snapshot.is_regular() {
        bail!("{} is not a regular file", file.display());
    }
    let set = sync::compute_digests(&snapshot, cfg)?;
    println!("{}", set.dump_raw());
    if let Some(z) = set.zsync {
        eprintln!("zsync block_size={} hash_lens={} bytes={}", z.block_size, z.hash_lens(), set.zsums.len());
    }
    Ok(())
}

fn verify_file<S: RecordStore>(store: &S, file: &Path, base_dir: Option<&Path>) -> Result<()> {
    let base = base_dir.or_else(|| file.parent());
    let snapshot = FileSnapshot::capture(file, base)?;
    let report = verify::verify(store, &snapshot)?
        .ok_or_else(|| anyhow!("no hashed record for {}", snapshot.key))?;
    eprintln!(
        "Pieces ok={}, bad={}; whole file={}; metadata={}",
        report.pieces_ok,
        report.pieces_bad,
        if report.whole_file_ok { "OK" } else { "MISMATCH" },
        if report.metadata_ok { "unchanged" } else { "changed" }
    );
    if report.is_ok() {
        println!("OK");
        Ok(())
    } else {
        println!("BAD");
        bail!("{} does not match its record", file.display())
    }
}
