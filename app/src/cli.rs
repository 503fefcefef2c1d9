use std::path::{Path, PathBuf};

use near_diff_core::{
    AlignMode, AlignOptions, CacheKey, NeighborError, NeighborResult, NeighborStore,
    RetrievalConfig, RetrievalMode, SignatureTable, Snapshot, align_with, cached_neighbors,
    find_neighbors, find_neighbors_exact,
};
use near_diff_fs::{STATE_DIR, load_corpus_dir, load_corpus_json};
use rayon::prelude::*;
use regex::Regex;
use tracing::{error, info, warn};

use crate::CorpusArgs;
use crate::render::{render_neighbors, render_side_by_side};

pub fn default_root() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

pub fn default_db_path(root: &Path) -> PathBuf {
    let mut dir = root.to_path_buf();
    dir.push(STATE_DIR);
    let _ = std::fs::create_dir_all(&dir);
    dir.push("cache.db");
    dir
}

fn remove_db_files(db_path: &Path) {
    let wal = db_path.with_extension("db-wal");
    let shm = db_path.with_extension("db-shm");
    let _ = std::fs::remove_file(db_path);
    let _ = std::fs::remove_file(wal);
    let _ = std::fs::remove_file(shm);
}

fn is_corrupt_db(err: &NeighborError) -> bool {
    match err {
        NeighborError::Db(db_err) => db_err.to_string().contains("file is not a database"),
        _ => false,
    }
}

/// Open the neighbor cache, recreating it if the file is not a database.
pub(crate) fn open_store(db_path: &Path) -> Result<NeighborStore, NeighborError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(NeighborError::Io)?;
    }

    match NeighborStore::open_or_create(db_path) {
        Ok(store) => Ok(store),
        Err(err) if is_corrupt_db(&err) => {
            warn!(
                "Neighbor cache at {} is corrupt, recreating it",
                db_path.display()
            );
            remove_db_files(db_path);
            NeighborStore::open_or_create(db_path)
        }
        Err(err) => Err(err),
    }
}

pub(crate) fn resolve_root(source: &CorpusArgs) -> PathBuf {
    source.root.clone().unwrap_or_else(default_root)
}

pub(crate) fn load_snapshot(source: &CorpusArgs) -> Result<Snapshot, NeighborError> {
    let corpus = match &source.corpus {
        Some(json_path) => load_corpus_json(json_path)?,
        None => load_corpus_dir(&resolve_root(source))?,
    };
    Ok(Snapshot::new(corpus))
}

fn load_snapshot_or_exit(source: &CorpusArgs) -> Snapshot {
    match load_snapshot(source) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            error!("Failed to load corpus: {err}");
            std::process::exit(1);
        }
    }
}

pub(crate) fn retrieval_config(k: Option<usize>) -> RetrievalConfig {
    let mut config = RetrievalConfig::default();
    if let Some(k) = k {
        config.approximate_k = k;
        config.exact_k = k;
    }
    config
}

/// Initialize tracing for CLI commands.
///
/// Logs go to stderr, and respect RUST_LOG or default to `info`.
pub fn init_tracing_cli() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize tracing for the MCP server.
///
/// - Never logs to stdout (to keep stdio clean for JSON-RPC).
/// - If `NEAR_DIFF_LOG_PATH` is set, append logs to that file.
/// - Otherwise no subscriber is installed.
pub fn init_tracing_server() {
    use std::fs::OpenOptions;
    use std::io::Write;
    use tracing_subscriber::{EnvFilter, fmt};

    let path = match std::env::var("NEAR_DIFF_LOG_PATH") {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => return,
    };

    if OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .is_err()
    {
        return;
    }

    // Re-open per write; a file that disappears later just drops the line.
    let make_writer = move || -> Box<dyn Write> {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Box::new(file),
            Err(_) => Box::new(std::io::sink()),
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(make_writer)
        .init();
}

pub async fn run_list(
    source: CorpusArgs,
    path_regex: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path_regex = if let Some(pattern) = path_regex {
        match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                error!("Invalid path regex '{}': {}", pattern, err);
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let snapshot = load_snapshot_or_exit(&source);
    for path in snapshot.corpus().paths() {
        if let Some(re) = &path_regex
            && !re.is_match(path)
        {
            continue;
        }
        println!("{path}");
    }

    Ok(())
}

pub async fn run_neighbors(
    source: CorpusArgs,
    db: Option<PathBuf>,
    query: String,
    mode: RetrievalMode,
    k: Option<usize>,
    json: bool,
    no_cache: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = load_snapshot_or_exit(&source);
    let config = retrieval_config(k);

    if !snapshot.corpus().contains(&query) {
        error!("'{}' is not a file of the corpus", query);
        std::process::exit(1);
    }

    let results = if no_cache {
        find_neighbors(
            snapshot.corpus(),
            snapshot.file_index(),
            &query,
            mode,
            &config,
        )
    } else {
        let db_path = db.unwrap_or_else(|| default_db_path(&resolve_root(&source)));
        let store = match open_store(&db_path) {
            Ok(store) => store,
            Err(err) => {
                error!("Failed to open neighbor cache {}: {}", db_path.display(), err);
                std::process::exit(1);
            }
        };
        if let Err(err) = store.retain_snapshot(snapshot.digest()) {
            warn!("Failed to evict stale neighbor lists: {err}");
        }
        cached_neighbors(&store, &snapshot, &query, mode, &config)
    };

    let results = match results {
        Ok(r) => r,
        Err(err) => {
            error!("Neighbor search failed: {err}");
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print!("{}", render_neighbors(&results));
    }

    Ok(())
}

pub async fn run_diff(
    source: CorpusArgs,
    left: String,
    right: String,
    mode: AlignMode,
    width: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = load_snapshot_or_exit(&source);
    let corpus = snapshot.corpus();

    let (Some(left_text), Some(right_text)) = (corpus.get(&left), corpus.get(&right)) else {
        let missing = if corpus.contains(&left) { &right } else { &left };
        error!("'{}' is not a file of the corpus", missing);
        std::process::exit(1);
    };

    let options = AlignOptions {
        mode,
        ..AlignOptions::default()
    };
    let alignment = align_with(left_text, right_text, &options);
    print!("{}", render_side_by_side(&left, &right, &alignment, width));

    Ok(())
}

/// Neighbor lists for every file of `snapshot`, computed in parallel.
pub(crate) fn compute_neighbor_table(
    snapshot: &Snapshot,
    mode: RetrievalMode,
    config: &RetrievalConfig,
) -> Result<Vec<(CacheKey, Vec<NeighborResult>)>, NeighborError> {
    let k = config.k_for(mode);
    let corpus = snapshot.corpus();
    let paths: Vec<&str> = corpus.paths().collect();

    match mode {
        RetrievalMode::Approximate => {
            let table = SignatureTable::build(corpus, config.num_hashes);
            paths
                .into_par_iter()
                .map(|path| -> Result<_, NeighborError> {
                    let results = table.neighbors(corpus, path, k)?;
                    Ok((CacheKey::new(snapshot, path, mode, config), results))
                })
                .collect()
        }
        RetrievalMode::Exact => paths
            .into_par_iter()
            .map(|path| -> Result<_, NeighborError> {
                let results = find_neighbors_exact(corpus, snapshot.file_index(), path, k)?;
                Ok((CacheKey::new(snapshot, path, mode, config), results))
            })
            .collect(),
    }
}

pub async fn run_index(
    source: CorpusArgs,
    db: Option<PathBuf>,
    mode: RetrievalMode,
    k: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = load_snapshot_or_exit(&source);
    let config = retrieval_config(k);
    let db_path = db.unwrap_or_else(|| default_db_path(&resolve_root(&source)));

    info!(
        "Building {} neighbor table for {} files",
        mode,
        snapshot.corpus().len()
    );
    info!("Database path: {}", db_path.display());

    let store = match open_store(&db_path) {
        Ok(store) => store,
        Err(err) => {
            error!("Failed to open neighbor cache: {}", err);
            std::process::exit(1);
        }
    };

    let table = match compute_neighbor_table(&snapshot, mode, &config) {
        Ok(t) => t,
        Err(err) => {
            error!("Neighbor table computation failed: {}", err);
            std::process::exit(1);
        }
    };

    store.retain_snapshot(snapshot.digest())?;
    store.put_many(&table)?;

    info!(
        "Neighbor table completed: {} lists stored, {} in cache",
        table.len(),
        store.count()?
    );
    Ok(())
}
