use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const FNV64_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Insertion-ordered snapshot of `path -> content`.
///
/// Iteration order is the order in which paths were first inserted. Ranking
/// ties in both retrieval modes resolve to this order.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    entries: Vec<(String, String)>,
    positions: HashMap<String, usize>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file. Replacing keeps its position.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let path = path.into();
        let content = content.into();
        if let Some(&pos) = self.positions.get(&path) {
            self.entries[pos].1 = content;
            return;
        }
        self.positions.insert(path.clone(), self.entries.len());
        self.entries.push((path, content));
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.positions
            .get(path)
            .map(|&pos| self.entries[pos].1.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.positions.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn paths(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    /// FNV-1a digest over every path and content in iteration order.
    ///
    /// Two corpora with the same files in the same order share a digest; it
    /// keys cached neighbor tables to the snapshot they were computed from.
    pub fn digest(&self) -> u64 {
        let mut hash = FNV64_OFFSET;
        let mut feed = |bytes: &[u8]| {
            for &b in bytes {
                hash ^= u64::from(b);
                hash = hash.wrapping_mul(FNV64_PRIME);
            }
        };
        for (path, content) in &self.entries {
            feed(path.as_bytes());
            feed(&[0]);
            feed(content.as_bytes());
            feed(&[0xff]);
        }
        hash
    }
}

impl<P: Into<String>, C: Into<String>> FromIterator<(P, C)> for Corpus {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut corpus = Corpus::new();
        for (path, content) in iter {
            corpus.insert(path, content);
        }
        corpus
    }
}

/// Content lengths (in chars) per path, derived from one corpus snapshot.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    lengths: HashMap<String, usize>,
}

impl FileIndex {
    pub fn from_corpus(corpus: &Corpus) -> Self {
        let lengths = corpus
            .iter()
            .map(|(path, content)| (path.to_string(), content.chars().count()))
            .collect();
        Self { lengths }
    }

    pub fn get(&self, path: &str) -> Option<usize> {
        self.lengths.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}

/// A corpus together with the artifacts derived from it once per snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    corpus: Corpus,
    file_index: FileIndex,
    digest: u64,
}

impl Snapshot {
    pub fn new(corpus: Corpus) -> Self {
        let file_index = FileIndex::from_corpus(&corpus);
        let digest = corpus.digest();
        Self {
            corpus,
            file_index,
            digest,
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn file_index(&self) -> &FileIndex {
        &self.file_index
    }

    pub fn digest(&self) -> u64 {
        self.digest
    }
}

/// Ranking score. A ranked list never mixes the two variants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    /// Signature agreement in `[0, 1]`, higher is closer.
    Similarity(f64),
    /// Exact edit distance, lower is closer.
    Distance(usize),
}

impl Score {
    pub fn is_similarity(&self) -> bool {
        matches!(self, Score::Similarity(_))
    }

    pub fn value(&self) -> f64 {
        match *self {
            Score::Similarity(s) => s,
            Score::Distance(d) => d as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborResult {
    pub path: String,
    pub score: Score,
}
