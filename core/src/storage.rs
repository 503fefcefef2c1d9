use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bincode::config;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::error::CoreResult;
use crate::model::{NeighborResult, Snapshot};
use crate::neighbors::{RetrievalConfig, RetrievalMode, find_neighbors};

const DIGEST_META_KEY: &str = "corpus_digest";
const SCHEMA_VERSION_META_KEY: &str = "schema_version";
const SCHEMA_VERSION: &str = "2";

/// Identifies one ranked list: which snapshot, which strategy and settings, for whom.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub snapshot: u64,
    pub mode: RetrievalMode,
    pub k: usize,
    /// Signature width for approximate lists; always 0 for exact ones.
    pub num_hashes: usize,
    pub query: String,
}

impl CacheKey {
    pub fn new(
        snapshot: &Snapshot,
        query: &str,
        mode: RetrievalMode,
        config: &RetrievalConfig,
    ) -> Self {
        let num_hashes = match mode {
            RetrievalMode::Approximate => config.num_hashes,
            RetrievalMode::Exact => 0,
        };
        Self {
            snapshot: snapshot.digest(),
            mode,
            k: config.k_for(mode),
            num_hashes,
            query: query.to_string(),
        }
    }
}

/// Get/put storage for previously computed neighbor lists.
pub trait NeighborCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> CoreResult<Option<Vec<NeighborResult>>>;
    fn put(&self, key: &CacheKey, results: &[NeighborResult]) -> CoreResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryNeighborCache {
    entries: Mutex<HashMap<CacheKey, Vec<NeighborResult>>>,
}

impl MemoryNeighborCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NeighborCache for MemoryNeighborCache {
    fn get(&self, key: &CacheKey) -> CoreResult<Option<Vec<NeighborResult>>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &CacheKey, results: &[NeighborResult]) -> CoreResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.clone(), results.to_vec());
        Ok(())
    }
}

/// SQLite-backed neighbor table. Each ranked list is one bincode blob.
pub struct NeighborStore {
    db_path: PathBuf,
}

impl NeighborStore {
    pub fn open_or_create(path: &Path) -> CoreResult<Self> {
        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        init_schema(&conn)?;
        Ok(Self {
            db_path: path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> CoreResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Store many lists in one transaction.
    pub fn put_many(&self, entries: &[(CacheKey, Vec<NeighborResult>)]) -> CoreResult<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for (key, results) in entries {
            let encoded = bincode::serde::encode_to_vec(results, config::standard())?;
            tx.execute(
                "INSERT INTO neighbors (snapshot, mode, k, num_hashes, query, results)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(snapshot, mode, k, num_hashes, query)
                 DO UPDATE SET results = excluded.results",
                params![
                    key.snapshot as i64,
                    key.mode.as_str(),
                    key.k as i64,
                    key.num_hashes as i64,
                    key.query,
                    encoded
                ],
            )?;
        }
        tx.commit()?;
        debug!("put_many: stored {} neighbor lists", entries.len());
        Ok(())
    }

    /// Drop every list that was not computed from `digest` and remember it.
    ///
    /// Returns the number of rows removed.
    pub fn retain_snapshot(&self, digest: u64) -> CoreResult<usize> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM neighbors WHERE snapshot != ?1",
            [digest as i64],
        )?;
        drop(conn);
        self.set_meta(DIGEST_META_KEY, &digest.to_string())?;
        if removed > 0 {
            debug!("retain_snapshot: evicted {removed} stale neighbor lists");
        }
        Ok(removed)
    }

    /// Digest recorded by the last [`NeighborStore::retain_snapshot`] call.
    pub fn stored_digest(&self) -> CoreResult<Option<u64>> {
        Ok(self
            .get_meta(DIGEST_META_KEY)?
            .and_then(|v| v.parse::<u64>().ok()))
    }

    pub fn count(&self) -> CoreResult<usize> {
        let conn = self.connect()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM neighbors", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Read a value from the meta table, if present.
    pub fn get_meta(&self, key: &str) -> CoreResult<Option<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
        let value: Option<String> = stmt.query_row([key], |row| row.get(0)).optional()?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> CoreResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

impl NeighborCache for NeighborStore {
    fn get(&self, key: &CacheKey) -> CoreResult<Option<Vec<NeighborResult>>> {
        let conn = self.connect()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT results FROM neighbors
                 WHERE snapshot = ?1 AND mode = ?2 AND k = ?3 AND num_hashes = ?4 AND query = ?5",
                params![
                    key.snapshot as i64,
                    key.mode.as_str(),
                    key.k as i64,
                    key.num_hashes as i64,
                    key.query
                ],
                |row| row.get(0),
            )
            .optional()?;

        let Some(blob) = blob else {
            return Ok(None);
        };
        let (results, _) =
            bincode::serde::decode_from_slice::<Vec<NeighborResult>, _>(&blob, config::standard())?;
        Ok(Some(results))
    }

    fn put(&self, key: &CacheKey, results: &[NeighborResult]) -> CoreResult<()> {
        self.put_many(&[(key.clone(), results.to_vec())])
    }
}

/// Serve `query` from `cache` when possible, otherwise compute and store it.
///
/// A failed cache write is logged and does not fail the lookup.
pub fn cached_neighbors(
    cache: &dyn NeighborCache,
    snapshot: &Snapshot,
    query: &str,
    mode: RetrievalMode,
    config: &RetrievalConfig,
) -> CoreResult<Vec<NeighborResult>> {
    let key = CacheKey::new(snapshot, query, mode, config);

    match cache.get(&key) {
        Ok(Some(hit)) => {
            debug!("cached_neighbors: hit for {query} ({mode})");
            return Ok(hit);
        }
        Ok(None) => {}
        Err(err) => warn!("cached_neighbors: cache read failed for {query}: {err}"),
    }

    let results = find_neighbors(
        snapshot.corpus(),
        snapshot.file_index(),
        query,
        mode,
        config,
    )?;

    if let Err(err) = cache.put(&key, &results) {
        warn!("cached_neighbors: failed to store results for {query}: {err}");
    }
    Ok(results)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;

    // A neighbors table written under another layout is dropped.
    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            [SCHEMA_VERSION_META_KEY],
            |row| row.get(0),
        )
        .optional()?;
    if version.as_deref() != Some(SCHEMA_VERSION) {
        conn.execute_batch("DROP TABLE IF EXISTS neighbors;")?;
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS neighbors (
            snapshot INTEGER NOT NULL,
            mode TEXT NOT NULL,
            k INTEGER NOT NULL,
            num_hashes INTEGER NOT NULL,
            query TEXT NOT NULL,
            results BLOB NOT NULL,
            PRIMARY KEY (snapshot, mode, k, num_hashes, query)
        );
        ",
    )?;
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![SCHEMA_VERSION_META_KEY, SCHEMA_VERSION],
    )?;
    Ok(())
}
