use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use near_diff_core::{
    AlignMode, AlignOptions, NeighborError, NeighborStore, RetrievalMode, Snapshot, align_with,
    cached_neighbors,
};
use rmcp::{
    ErrorData as McpError, ServerHandler, ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    tool, tool_handler, tool_router,
    transport::stdio,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::task;
use tracing::{error, info, warn};

use crate::CorpusArgs;
use crate::cli::{default_db_path, load_snapshot, open_store, resolve_root, retrieval_config};
use crate::render::{format_score, render_side_by_side};

const DIFF_COLUMN_WIDTH: usize = 60;

#[derive(Clone)]
pub struct NeighborServer {
    snapshot: Arc<OnceLock<Arc<Snapshot>>>,
    store: Arc<NeighborStore>,
    tool_router: ToolRouter<NeighborServer>,
}

impl NeighborServer {
    fn internal_error(code: &str, message: impl Into<String>) -> McpError {
        let full = format!("{code}: {}", message.into());
        McpError::internal_error(full, None)
    }

    fn ready_snapshot(&self) -> Result<&Arc<Snapshot>, McpError> {
        self.snapshot.get().ok_or_else(|| {
            Self::internal_error("index_building", "Corpus is still loading; try again shortly")
        })
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct FindNeighborsArgs {
    /// Corpus path of the query file
    pub path: String,
    /// "approximate" (default) or "exact"
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Deserialize, JsonSchema)]
pub struct DiffFilesArgs {
    pub left: String,
    pub right: String,
    /// "lcs" (default) or "two-pointer"
    #[serde(default)]
    pub mode: Option<String>,
}

#[tool_router]
impl NeighborServer {
    pub fn new(snapshot: Arc<OnceLock<Arc<Snapshot>>>, store: Arc<NeighborStore>) -> Self {
        Self {
            snapshot,
            store,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Find the files of the corpus most similar to a given file. Approximate mode ranks by line-shingle signature similarity (percent, higher is closer); exact mode ranks by character edit distance among files of similar length (lower is closer)."
    )]
    pub async fn find_neighbors(
        &self,
        Parameters(args): Parameters<FindNeighborsArgs>,
    ) -> Result<CallToolResult, McpError> {
        let snapshot = Arc::clone(self.ready_snapshot()?);
        let mode = args
            .mode
            .as_deref()
            .map(str::parse::<RetrievalMode>)
            .transpose()
            .map_err(|e| Self::internal_error("invalid_mode", e.to_string()))?
            .unwrap_or_default();
        let config = retrieval_config(args.k);
        let store = Arc::clone(&self.store);
        let query = args.path;

        let results = task::spawn_blocking(move || {
            cached_neighbors(store.as_ref(), snapshot.as_ref(), &query, mode, &config)
        })
        .await
        .map_err(|e| Self::internal_error("neighbor_task_failed", e.to_string()))?
        .map_err(|e| Self::internal_error("neighbor_search_failed", e.to_string()))?;

        let contents = results
            .iter()
            .map(|r| Content::text(format!("{}\t{}", r.path, format_score(&r.score))))
            .collect();
        Ok(CallToolResult::success(contents))
    }

    #[tool(
        description = "Align two corpus files line by line and return a side-by-side rendering. Changed words are marked [-old-] on the left and [+new+] on the right."
    )]
    pub async fn diff_files(
        &self,
        Parameters(args): Parameters<DiffFilesArgs>,
    ) -> Result<CallToolResult, McpError> {
        let snapshot = self.ready_snapshot()?;
        let mode = args
            .mode
            .as_deref()
            .map(str::parse::<AlignMode>)
            .transpose()
            .map_err(|e| Self::internal_error("invalid_mode", e.to_string()))?
            .unwrap_or_default();

        let corpus = snapshot.corpus();
        let left = corpus
            .get(&args.left)
            .ok_or_else(|| Self::internal_error("unknown_path", args.left.clone()))?;
        let right = corpus
            .get(&args.right)
            .ok_or_else(|| Self::internal_error("unknown_path", args.right.clone()))?;

        let options = AlignOptions {
            mode,
            ..AlignOptions::default()
        };
        let alignment = align_with(left, right, &options);
        let text = render_side_by_side(&args.left, &args.right, &alignment, DIFF_COLUMN_WIDTH);
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[tool_handler]
impl ServerHandler for NeighborServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Similar-file retrieval over a text corpus. Use `find_neighbors` to rank the files closest to a given file, then `diff_files` to compare a chosen pair side by side."
                    .to_string(),
            ),
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
        }
    }
}

pub async fn run_server(source: CorpusArgs, db: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let root = resolve_root(&source);
    let db_path = db.unwrap_or_else(|| default_db_path(&root));

    info!("near_diff MCP server starting");
    info!("root: {}", root.display());
    info!("db: {}", db_path.display());

    let store = Arc::new(open_store(&db_path)?);
    let snapshot = Arc::new(OnceLock::new());

    // Tools report `index_building` until the background load sets the snapshot.
    let snapshot_for_load = Arc::clone(&snapshot);
    let store_for_load = Arc::clone(&store);
    task::spawn(async move {
        let res = task::spawn_blocking(move || {
            let loaded = load_snapshot(&source)?;
            if let Err(err) = store_for_load.retain_snapshot(loaded.digest()) {
                warn!("MCP server: failed to evict stale neighbor lists: {err}");
            }
            Ok::<_, NeighborError>(loaded)
        })
        .await;
        match res {
            Ok(Ok(loaded)) => {
                info!(
                    "MCP server: corpus loaded with {} files",
                    loaded.corpus().len()
                );
                let _ = snapshot_for_load.set(Arc::new(loaded));
            }
            Ok(Err(err)) => {
                error!("MCP server: corpus load failed: {err}");
            }
            Err(join_err) => {
                error!("MCP server: corpus load task panicked: {join_err}");
            }
        }
    });

    let server = NeighborServer::new(snapshot, store);

    let service = server
        .serve(stdio())
        .await
        .inspect_err(|e| error!("near_diff MCP serve error: {e:?}"))?;

    service.waiting().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use near_diff_core::Corpus;

    fn server_with(corpus: Option<Corpus>, dir: &std::path::Path) -> NeighborServer {
        let store = NeighborStore::open_or_create(&dir.join("cache.db")).unwrap();
        let snapshot = Arc::new(OnceLock::new());
        if let Some(corpus) = corpus {
            snapshot.set(Arc::new(Snapshot::new(corpus))).unwrap();
        }
        NeighborServer::new(snapshot, Arc::new(store))
    }

    fn texts(result: &CallToolResult) -> Vec<String> {
        let value = serde_json::to_value(result).unwrap();
        value["content"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["text"].as_str().unwrap().to_string())
            .collect()
    }

    fn args(path: &str) -> Parameters<FindNeighborsArgs> {
        Parameters(FindNeighborsArgs {
            path: path.to_string(),
            mode: None,
            k: None,
        })
    }

    #[tokio::test]
    async fn test_find_neighbors_shares_loaded_snapshot() {
        let dir = assert_fs::TempDir::new().unwrap();
        let corpus: Corpus = [("a.txt", "same"), ("b.txt", "same"), ("c.txt", "other")]
            .into_iter()
            .collect();
        let server = server_with(Some(corpus), dir.path());

        let first = server.find_neighbors(args("a.txt")).await.unwrap();
        let second = server.find_neighbors(args("a.txt")).await.unwrap();
        assert_eq!(texts(&first), vec!["b.txt\t100.0%", "c.txt\t0.0%"]);
        assert_eq!(texts(&first), texts(&second));

        // Only the server still holds the snapshot once the blocking tasks finish.
        let loaded = server.snapshot.get().unwrap();
        assert_eq!(Arc::strong_count(loaded), 1);
    }

    #[tokio::test]
    async fn test_tools_wait_for_corpus() {
        let dir = assert_fs::TempDir::new().unwrap();
        let server = server_with(None, dir.path());

        let err = server.find_neighbors(args("a.txt")).await.unwrap_err();
        assert!(err.message.contains("index_building"), "{}", err.message);
    }
}
