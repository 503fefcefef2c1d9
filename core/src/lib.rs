//! Retrieval and alignment engines for comparing files of a text corpus.
//!
//! Everything here is synchronous and pure over an in-memory [`Corpus`]
//! snapshot, except [`storage`], which persists computed neighbor lists.

pub mod align;
pub mod distance;
pub mod error;
pub mod fingerprint;
pub mod model;
pub mod neighbors;
pub mod storage;
pub mod text;

pub use align::{
    AlignMode, AlignOptions, Alignment, AlignmentStats, LineKind, LineRecord, Span, align,
    align_with,
};
pub use distance::{DistanceOutcome, UNBOUNDED, bounded_distance, edit_distance};
pub use error::{CoreResult, NeighborError};
pub use fingerprint::{DEFAULT_NUM_HASHES, Signature, fingerprint, similarity};
pub use model::{Corpus, FileIndex, NeighborResult, Score, Snapshot};
pub use neighbors::{
    RetrievalConfig, RetrievalMode, SignatureTable, find_neighbors, find_neighbors_approximate,
    find_neighbors_exact,
};
pub use storage::{CacheKey, MemoryNeighborCache, NeighborCache, NeighborStore, cached_neighbors};
pub use text::{corpus_key, read_text_file};
