use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use near_diff_core::{AlignMode, RetrievalMode};

mod cli;
mod mcp;
mod render;

use crate::cli::{
    init_tracing_cli, init_tracing_server, run_diff, run_index, run_list, run_neighbors,
};
use crate::mcp::run_server;

/// Where the corpus comes from.
#[derive(ClapArgs, Debug, Clone)]
pub struct CorpusArgs {
    /// Root directory whose text files form the corpus
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// JSON file mapping path -> content, used instead of scanning --root
    #[arg(long)]
    pub corpus: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the files of the corpus
    List {
        #[command(flatten)]
        source: CorpusArgs,
        /// Only list paths matching this regex
        #[arg(long = "path-regex")]
        path_regex: Option<String>,
    },
    /// Show the files most similar to PATH
    Neighbors {
        #[command(flatten)]
        source: CorpusArgs,
        /// Path to neighbor cache database file
        #[arg(long)]
        db: Option<PathBuf>,
        /// Retrieval strategy: approximate (signature similarity) or exact (edit distance)
        #[arg(long, default_value = "approximate")]
        mode: RetrievalMode,
        /// Number of neighbors (defaults to 50 approximate, 5 exact)
        #[arg(short, long)]
        k: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
        /// Always recompute instead of reading the neighbor cache
        #[arg(long = "no-cache")]
        no_cache: bool,
        /// Corpus path of the query file
        path: String,
    },
    /// Align two corpus files side by side
    Diff {
        #[command(flatten)]
        source: CorpusArgs,
        /// Alignment mode: lcs or two-pointer
        #[arg(long, default_value = "lcs")]
        mode: AlignMode,
        /// Width of each column
        #[arg(long, default_value_t = 60)]
        width: usize,
        left: String,
        right: String,
    },
    /// Precompute the neighbor table for every file, then exit
    Index {
        #[command(flatten)]
        source: CorpusArgs,
        /// Path to neighbor cache database file
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long, default_value = "approximate")]
        mode: RetrievalMode,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Run MCP server over stdio
    Server {
        #[command(flatten)]
        source: CorpusArgs,
        /// Path to neighbor cache database file
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "nd",
    about = "near_diff: find similar files in a corpus and diff them side by side",
    version,
    long_about = None
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Command::List { source, path_regex } => {
            init_tracing_cli();
            run_list(source, path_regex).await?;
        }
        Command::Neighbors {
            source,
            db,
            mode,
            k,
            json,
            no_cache,
            path,
        } => {
            init_tracing_cli();
            run_neighbors(source, db, path, mode, k, json, no_cache).await?;
        }
        Command::Diff {
            source,
            mode,
            width,
            left,
            right,
        } => {
            init_tracing_cli();
            run_diff(source, left, right, mode, width).await?;
        }
        Command::Index { source, db, mode, k } => {
            init_tracing_cli();
            run_index(source, db, mode, k).await?;
        }
        Command::Server { source, db } => {
            // stdout carries JSON-RPC; logs only go to NEAR_DIFF_LOG_PATH if set.
            init_tracing_server();
            run_server(source, db).await?;
        }
    }

    Ok(())
}
