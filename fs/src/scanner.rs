use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use ignore::{Walk, WalkBuilder};
use near_diff_core::{CoreResult, Corpus, NeighborError, corpus_key, read_text_file};
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// Directory under a corpus root where near_diff keeps its own state.
pub const STATE_DIR: &str = ".near_diff";

fn build_walker(root: &Path) -> Walk {
    let exclude_dir = root.join(STATE_DIR);
    WalkBuilder::new(root)
        .hidden(false)
        .ignore(true)
        .git_ignore(true)
        .git_exclude(true)
        .parents(true)
        .filter_entry(move |entry| {
            let path = entry.path();
            if path.starts_with(&exclude_dir) {
                return false;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str())
                && name == ".git"
            {
                return false;
            }
            true
        })
        .build()
}

/// Load every text file under `root`, keyed by its `/`-separated relative path.
///
/// Binary and non-UTF-8 files are skipped. The corpus is ordered by path.
pub fn load_corpus_dir(root: &Path) -> CoreResult<Corpus> {
    if !root.is_dir() {
        return Err(NeighborError::InvalidArgument(format!(
            "corpus root {} is not a directory",
            root.display()
        )));
    }

    let seen = AtomicUsize::new(0);
    let mut files: Vec<(String, String)> = build_walker(root)
        .par_bridge()
        .filter_map(|entry| {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!("load_corpus_dir: failed to read entry: {err}");
                    return None;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                return None;
            }

            let done = seen.fetch_add(1, Ordering::Relaxed) + 1;
            if done % 500 == 0 {
                info!("load_corpus_dir: read {done} files");
            }

            match read_text_file(entry.path()) {
                Ok(Some(content)) => Some((corpus_key(root, entry.path()), content)),
                Ok(None) => {
                    debug!("load_corpus_dir: skipping non-text {}", entry.path().display());
                    None
                }
                Err(err) => {
                    warn!(
                        "load_corpus_dir: failed to read {}: {err}",
                        entry.path().display()
                    );
                    None
                }
            }
        })
        .collect();

    files.sort_by(|a, b| a.0.cmp(&b.0));

    info!(
        "load_corpus_dir: loaded {} text files ({} visited) from {}",
        files.len(),
        seen.load(Ordering::Relaxed),
        root.display()
    );
    Ok(files.into_iter().collect())
}
