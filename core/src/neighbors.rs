use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distance::{DistanceOutcome, bounded_distance};
use crate::error::{CoreResult, NeighborError};
use crate::fingerprint::{DEFAULT_NUM_HASHES, Signature, fingerprint, similarity};
use crate::model::{Corpus, FileIndex, NeighborResult, Score};

pub const DEFAULT_APPROXIMATE_K: usize = 50;
pub const DEFAULT_EXACT_K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Signature agreement, ranked by similarity.
    #[default]
    Approximate,
    /// Bounded edit distance over length-pruned candidates, ranked by distance.
    Exact,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Approximate => "approximate",
            RetrievalMode::Exact => "exact",
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalMode {
    type Err = NeighborError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approximate" | "approx" | "minhash" => Ok(RetrievalMode::Approximate),
            "exact" | "levenshtein" => Ok(RetrievalMode::Exact),
            other => Err(NeighborError::InvalidArgument(format!(
                "unknown retrieval mode '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalConfig {
    pub num_hashes: usize,
    pub approximate_k: usize,
    pub exact_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            num_hashes: DEFAULT_NUM_HASHES,
            approximate_k: DEFAULT_APPROXIMATE_K,
            exact_k: DEFAULT_EXACT_K,
        }
    }
}

impl RetrievalConfig {
    pub fn k_for(&self, mode: RetrievalMode) -> usize {
        match mode {
            RetrievalMode::Approximate => self.approximate_k,
            RetrievalMode::Exact => self.exact_k,
        }
    }
}

/// Signatures for every file of one corpus snapshot.
#[derive(Debug, Clone)]
pub struct SignatureTable {
    num_hashes: usize,
    signatures: HashMap<String, Signature>,
}

impl SignatureTable {
    pub fn build(corpus: &Corpus, num_hashes: usize) -> Self {
        let entries: Vec<(&str, &str)> = corpus.iter().collect();
        let signatures = entries
            .into_par_iter()
            .map(|(path, content)| (path.to_string(), fingerprint(content, num_hashes)))
            .collect();
        Self {
            num_hashes,
            signatures,
        }
    }

    /// Build a table from signatures computed elsewhere.
    pub fn from_signatures<I>(num_hashes: usize, signatures: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (String, Signature)>,
    {
        let mut table = HashMap::new();
        for (path, signature) in signatures {
            if signature.len() != num_hashes {
                return Err(NeighborError::InvalidArgument(format!(
                    "signature for {path} has {} slots, expected {num_hashes}",
                    signature.len()
                )));
            }
            table.insert(path, signature);
        }
        Ok(Self {
            num_hashes,
            signatures: table,
        })
    }

    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    pub fn get(&self, path: &str) -> Option<&Signature> {
        self.signatures.get(path)
    }

    /// Rank every other file of `corpus` by similarity to `query`.
    ///
    /// Files missing from the table are fingerprinted on the fly.
    pub fn neighbors(
        &self,
        corpus: &Corpus,
        query: &str,
        k: usize,
    ) -> CoreResult<Vec<NeighborResult>> {
        let query_content = corpus
            .get(query)
            .ok_or_else(|| NeighborError::UnknownPath(query.to_string()))?;
        let query_sig = self.signature_for(query, query_content);

        let candidates: Vec<(&str, &str)> = corpus.iter().filter(|(p, _)| *p != query).collect();

        let mut results = candidates
            .into_par_iter()
            .map(|(path, content)| {
                let sig = self.signature_for(path, content);
                let score = similarity(&query_sig, &sig)?;
                Ok(NeighborResult {
                    path: path.to_string(),
                    score: Score::Similarity(score),
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        results.sort_by(|a, b| {
            b.score
                .value()
                .partial_cmp(&a.score.value())
                .unwrap_or(Ordering::Equal)
        });
        results.truncate(k);

        debug!(
            "approximate neighbors for {query}: ranked {} files, returning {}",
            corpus.len().saturating_sub(1),
            results.len()
        );
        Ok(results)
    }

    fn signature_for(&self, path: &str, content: &str) -> Cow<'_, [u32]> {
        match self.signatures.get(path) {
            Some(sig) => Cow::Borrowed(sig.as_slice()),
            None => Cow::Owned(fingerprint(content, self.num_hashes)),
        }
    }
}

/// Similarity-ranked neighbors using freshly computed signatures.
pub fn find_neighbors_approximate(
    corpus: &Corpus,
    query: &str,
    k: usize,
) -> CoreResult<Vec<NeighborResult>> {
    if !corpus.contains(query) {
        return Err(NeighborError::UnknownPath(query.to_string()));
    }
    SignatureTable::build(corpus, DEFAULT_NUM_HASHES).neighbors(corpus, query, k)
}

/// Distance-ranked neighbors among files whose length is within half of the
/// query's length.
pub fn find_neighbors_exact(
    corpus: &Corpus,
    file_index: &FileIndex,
    query: &str,
    k: usize,
) -> CoreResult<Vec<NeighborResult>> {
    let query_content = corpus
        .get(query)
        .ok_or_else(|| NeighborError::UnknownPath(query.to_string()))?;
    let query_len = file_index
        .get(query)
        .ok_or_else(|| NeighborError::UnknownPath(query.to_string()))?;

    let mut candidates = Vec::new();
    for (path, content) in corpus.iter() {
        if path == query {
            continue;
        }
        let len = file_index.get(path).ok_or_else(|| {
            NeighborError::InvalidArgument(format!("file index has no entry for {path}"))
        })?;
        // |len - query_len| <= query_len / 2, kept in integers.
        if 2 * len.abs_diff(query_len) <= query_len {
            candidates.push((path, content));
        }
    }

    debug!(
        "exact neighbors for {query}: {} of {} files survive length pruning",
        candidates.len(),
        corpus.len().saturating_sub(1)
    );

    let mut results: Vec<NeighborResult> = candidates
        .into_par_iter()
        .filter_map(
            |(path, content)| match bounded_distance(query_content, content, query_len) {
                DistanceOutcome::Within(d) => Some(NeighborResult {
                    path: path.to_string(),
                    score: Score::Distance(d),
                }),
                DistanceOutcome::ExceedsBound | DistanceOutcome::EmptyInput => None,
            },
        )
        .collect();

    results.sort_by_key(|r| match r.score {
        Score::Distance(d) => d,
        Score::Similarity(_) => usize::MAX,
    });
    results.truncate(k);
    Ok(results)
}

/// Run the requested strategy with `config`'s hash count and result size.
pub fn find_neighbors(
    corpus: &Corpus,
    file_index: &FileIndex,
    query: &str,
    mode: RetrievalMode,
    config: &RetrievalConfig,
) -> CoreResult<Vec<NeighborResult>> {
    let k = config.k_for(mode);
    match mode {
        RetrievalMode::Approximate => {
            if !corpus.contains(query) {
                return Err(NeighborError::UnknownPath(query.to_string()));
            }
            SignatureTable::build(corpus, config.num_hashes).neighbors(corpus, query, k)
        }
        RetrievalMode::Exact => find_neighbors_exact(corpus, file_index, query, k),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(results: &[NeighborResult]) -> Vec<&str> {
        results.iter().map(|r| r.path.as_str()).collect()
    }

    #[test]
    fn test_exact_prunes_by_length_and_ranks_by_distance() {
        let corpus: Corpus = [
            ("Q", "hello world"),
            ("P1", "hello word"),
            ("P2", "completely different text of much greater length"),
        ]
        .into_iter()
        .collect();
        let index = FileIndex::from_corpus(&corpus);

        let results = find_neighbors_exact(&corpus, &index, "Q", 5).unwrap();
        assert_eq!(
            results,
            vec![NeighborResult {
                path: "P1".to_string(),
                score: Score::Distance(1),
            }]
        );
    }

    #[test]
    fn test_exact_never_returns_far_lengths() {
        let corpus: Corpus = [
            ("q", "abcdefgh"),
            ("short", "ab"),
            ("long", "abcdefghijklmnopq"),
            ("near", "abcdefgx"),
        ]
        .into_iter()
        .collect();
        let index = FileIndex::from_corpus(&corpus);

        let results = find_neighbors_exact(&corpus, &index, "q", 10).unwrap();
        assert_eq!(paths(&results), vec!["near"]);
    }

    #[test]
    fn test_exact_ties_keep_corpus_order() {
        let corpus: Corpus = [
            ("q", "aaaa"),
            ("z", "aaab"),
            ("y", "aaaa"),
            ("x", "baaa"),
        ]
        .into_iter()
        .collect();
        let index = FileIndex::from_corpus(&corpus);

        let results = find_neighbors_exact(&corpus, &index, "q", 5).unwrap();
        assert_eq!(paths(&results), vec!["y", "z", "x"]);
        assert_eq!(results[0].score, Score::Distance(0));
    }

    #[test]
    fn test_exact_skips_empty_files() {
        let corpus: Corpus = [("q", ""), ("e", "")].into_iter().collect();
        let index = FileIndex::from_corpus(&corpus);
        assert!(find_neighbors_exact(&corpus, &index, "q", 5).unwrap().is_empty());
    }

    #[test]
    fn test_exact_truncates_to_k() {
        let corpus: Corpus = (0..10)
            .map(|i| (format!("f{i}"), format!("line {i}")))
            .collect();
        let index = FileIndex::from_corpus(&corpus);
        let results = find_neighbors_exact(&corpus, &index, "f0", 3).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_exact_rejects_stale_index() {
        let corpus: Corpus = [("q", "abc"), ("other", "abd")].into_iter().collect();
        let stale: Corpus = [("q", "abc")].into_iter().collect();
        let index = FileIndex::from_corpus(&stale);
        let err = find_neighbors_exact(&corpus, &index, "q", 5).unwrap_err();
        assert!(matches!(err, NeighborError::InvalidArgument(_)));
    }

    #[test]
    fn test_unknown_query_is_invalid() {
        let corpus: Corpus = [("a", "x")].into_iter().collect();
        let index = FileIndex::from_corpus(&corpus);
        assert!(matches!(
            find_neighbors_exact(&corpus, &index, "nope", 5),
            Err(NeighborError::UnknownPath(_))
        ));
        assert!(matches!(
            find_neighbors_approximate(&corpus, "nope", 5),
            Err(NeighborError::UnknownPath(_))
        ));
    }

    #[test]
    fn test_approximate_ties_follow_corpus_order() {
        let query: Signature = (0..10).collect();
        let mut close = query.clone();
        close[9] = 100;
        let mut far = vec![100; 10];
        far[0] = 0;
        far[1] = 1;

        let corpus: Corpus = [("A", ""), ("C", ""), ("D", ""), ("B", "")]
            .into_iter()
            .collect();
        let table = SignatureTable::from_signatures(
            10,
            [
                ("A".to_string(), query),
                ("B".to_string(), close.clone()),
                ("C".to_string(), close),
                ("D".to_string(), far),
            ],
        )
        .unwrap();

        let results = table.neighbors(&corpus, "A", 50).unwrap();
        assert_eq!(paths(&results), vec!["C", "B", "D"]);
        assert_eq!(results[0].score, Score::Similarity(0.9));
        assert_eq!(results[2].score, Score::Similarity(0.2));
    }

    #[test]
    fn test_approximate_prefers_shared_lines() {
        let base = "use std::io;\nfn main() {\n    let x = 1;\n    println!(\"{x}\");\n}\n";
        let corpus: Corpus = [
            ("main.rs", base.to_string()),
            ("copy.rs", base.replace("x = 1", "x = 2")),
            ("other.txt", "roses are red\nviolets are blue\n".to_string()),
        ]
        .into_iter()
        .collect();

        let results = find_neighbors_approximate(&corpus, "main.rs", 50).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "copy.rs");
        assert!(results.iter().all(|r| r.score.is_similarity()));
        assert!(results[0].score.value() >= results[1].score.value());
    }

    #[test]
    fn test_approximate_excludes_query() {
        let corpus: Corpus = [("a", "same"), ("b", "same")].into_iter().collect();
        let results = find_neighbors_approximate(&corpus, "a", 50).unwrap();
        assert_eq!(paths(&results), vec!["b"]);
        assert_eq!(results[0].score, Score::Similarity(1.0));
    }

    #[test]
    fn test_partial_table_fingerprints_missing_paths() {
        let lines = "alpha\nbeta\ngamma\ndelta";
        let corpus: Corpus = [("a", lines), ("b", "one\ntwo\nthree"), ("c", lines)]
            .into_iter()
            .collect();
        // "b" is stored with a's signature; "c" is absent from the table.
        let table = SignatureTable::from_signatures(
            DEFAULT_NUM_HASHES,
            [
                ("a".to_string(), fingerprint(lines, DEFAULT_NUM_HASHES)),
                ("b".to_string(), fingerprint(lines, DEFAULT_NUM_HASHES)),
            ],
        )
        .unwrap();
        assert!(table.get("c").is_none());

        let results = table.neighbors(&corpus, "a", 50).unwrap();
        assert_eq!(paths(&results), vec!["b", "c"]);
        assert_eq!(results[0].score, Score::Similarity(1.0));
        assert_eq!(results[1].score, Score::Similarity(1.0));

        let missing_query = table.neighbors(&corpus, "c", 50).unwrap();
        assert_eq!(paths(&missing_query), vec!["a", "b"]);
    }

    #[test]
    fn test_from_signatures_checks_length() {
        let err = SignatureTable::from_signatures(3, [("a".to_string(), vec![1, 2])]);
        assert!(err.is_err());
    }

    #[test]
    fn test_dispatch_uses_config() {
        let corpus: Corpus = (0..8)
            .map(|i| (format!("f{i}"), format!("shared\nline {i}")))
            .collect();
        let index = FileIndex::from_corpus(&corpus);
        let config = RetrievalConfig {
            num_hashes: 16,
            approximate_k: 4,
            exact_k: 2,
        };

        let approx =
            find_neighbors(&corpus, &index, "f0", RetrievalMode::Approximate, &config).unwrap();
        assert_eq!(approx.len(), 4);
        let exact = find_neighbors(&corpus, &index, "f0", RetrievalMode::Exact, &config).unwrap();
        assert_eq!(exact.len(), 2);
        assert!(exact.iter().all(|r| !r.score.is_similarity()));
    }

    #[test]
    fn test_mode_parses() {
        assert_eq!("exact".parse::<RetrievalMode>().unwrap(), RetrievalMode::Exact);
        assert_eq!(
            "Approximate".parse::<RetrievalMode>().unwrap(),
            RetrievalMode::Approximate
        );
        assert!("fuzzy".parse::<RetrievalMode>().is_err());
        assert_eq!(RetrievalMode::Exact.to_string(), "exact");
    }
}
