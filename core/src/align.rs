//! Side-by-side line alignment with coarse word highlighting.
//!
//! Two modes are available. [`AlignMode::Lcs`] anchors on the longest common
//! subsequence of lines so shifted blocks still line up; unmatched lines are
//! `Changed`. [`AlignMode::TwoPointer`] walks both sides in lockstep and marks
//! every mismatch as `Removed`/`Added` without looking ahead.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::NeighborError;

/// Words per line considered for highlighting; the rest becomes one span.
pub const MAX_HIGHLIGHT_WORDS: usize = 100;

/// LCS table size above which [`align_with`] switches to the two-pointer walk.
pub const DEFAULT_MAX_LCS_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Same,
    Added,
    Removed,
    Changed,
    /// Placeholder keeping the two sides index-aligned.
    Blank,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub different: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRecord {
    pub text: String,
    pub kind: LineKind,
    /// Space-separated words of a `Changed` line; `None` for every other kind.
    pub spans: Option<Vec<Span>>,
}

impl LineRecord {
    fn plain(text: &str, kind: LineKind) -> Self {
        Self {
            text: text.to_string(),
            kind,
            spans: None,
        }
    }

    fn changed(text: &str, other: Option<&str>) -> Self {
        Self {
            text: text.to_string(),
            kind: LineKind::Changed,
            spans: Some(highlight_words(text, other)),
        }
    }

    pub fn placeholder() -> Self {
        Self::plain("", LineKind::Blank)
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == LineKind::Blank
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlignmentStats {
    /// Rows whose two sides are identical.
    pub same: usize,
    /// `Changed` records, counted on both sides.
    pub changed: usize,
    pub added: usize,
    pub removed: usize,
}

/// Two index-aligned columns; row `i` is `(left[i], right[i])`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Alignment {
    pub left: Vec<LineRecord>,
    pub right: Vec<LineRecord>,
}

impl Alignment {
    fn push(&mut self, left: LineRecord, right: LineRecord) {
        self.left.push(left);
        self.right.push(right);
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&LineRecord, &LineRecord)> + '_ {
        self.left.iter().zip(&self.right)
    }

    pub fn stats(&self) -> AlignmentStats {
        let mut stats = AlignmentStats::default();
        for (l, r) in self.rows() {
            if l.kind == LineKind::Same {
                stats.same += 1;
            }
            for record in [l, r] {
                match record.kind {
                    LineKind::Changed => stats.changed += 1,
                    LineKind::Added => stats.added += 1,
                    LineKind::Removed => stats.removed += 1,
                    LineKind::Same | LineKind::Blank => {}
                }
            }
        }
        stats
    }

    pub fn has_changes(&self) -> bool {
        self.rows().any(|(l, _)| l.kind != LineKind::Same)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignMode {
    #[default]
    Lcs,
    TwoPointer,
}

impl fmt::Display for AlignMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignMode::Lcs => f.write_str("lcs"),
            AlignMode::TwoPointer => f.write_str("two-pointer"),
        }
    }
}

impl FromStr for AlignMode {
    type Err = NeighborError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lcs" => Ok(AlignMode::Lcs),
            "two-pointer" | "two_pointer" | "simple" => Ok(AlignMode::TwoPointer),
            other => Err(NeighborError::InvalidArgument(format!(
                "unknown alignment mode '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignOptions {
    pub mode: AlignMode,
    pub max_lcs_cells: usize,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            mode: AlignMode::Lcs,
            max_lcs_cells: DEFAULT_MAX_LCS_CELLS,
        }
    }
}

/// Align with the default LCS mode.
pub fn align(left: &str, right: &str) -> Alignment {
    align_with(left, right, &AlignOptions::default())
}

pub fn align_with(left: &str, right: &str, options: &AlignOptions) -> Alignment {
    let left_lines = split_lines(left);
    let right_lines = split_lines(right);

    match options.mode {
        AlignMode::TwoPointer => align_two_pointer(&left_lines, &right_lines),
        AlignMode::Lcs => {
            let cells = left_lines.len().saturating_mul(right_lines.len());
            if cells > options.max_lcs_cells {
                debug!(
                    "align: {}x{} lines exceeds {} LCS cells, using two-pointer walk",
                    left_lines.len(),
                    right_lines.len(),
                    options.max_lcs_cells
                );
                align_two_pointer(&left_lines, &right_lines)
            } else {
                align_lcs(&left_lines, &right_lines)
            }
        }
    }
}

/// Empty input has no lines; anything else splits on `\n`.
fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').collect()
    }
}

/// Matched `(left, right)` line indices of one longest common subsequence.
fn lcs_pairs(left: &[&str], right: &[&str]) -> Vec<(usize, usize)> {
    let n = left.len();
    let m = right.len();
    let width = m + 1;
    // table[i * width + j] = LCS length of left[i..] and right[j..]
    let mut table = vec![0u32; (n + 1) * width];

    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if left[i] == right[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut pairs = Vec::with_capacity(table[0] as usize);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if left[i] == right[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

fn align_lcs(left: &[&str], right: &[&str]) -> Alignment {
    let anchors = lcs_pairs(left, right);
    let end = (left.len(), right.len());
    let mut out = Alignment::default();
    let (mut i, mut j) = (0, 0);

    for &(li, rj) in anchors.iter().chain(std::iter::once(&end)) {
        while i < li || j < rj {
            match (i < li, j < rj) {
                (true, true) => {
                    out.push(
                        LineRecord::changed(left[i], Some(right[j])),
                        LineRecord::changed(right[j], Some(left[i])),
                    );
                    i += 1;
                    j += 1;
                }
                (true, false) => {
                    out.push(LineRecord::changed(left[i], None), LineRecord::placeholder());
                    i += 1;
                }
                (false, _) => {
                    out.push(LineRecord::placeholder(), LineRecord::changed(right[j], None));
                    j += 1;
                }
            }
        }
        if (li, rj) != end {
            out.push(
                LineRecord::plain(left[li], LineKind::Same),
                LineRecord::plain(right[rj], LineKind::Same),
            );
            i += 1;
            j += 1;
        }
    }

    out
}

fn align_two_pointer(left: &[&str], right: &[&str]) -> Alignment {
    let mut out = Alignment::default();
    let (mut i, mut j) = (0, 0);

    while i < left.len() || j < right.len() {
        match (left.get(i), right.get(j)) {
            (Some(l), Some(r)) if l == r => {
                out.push(
                    LineRecord::plain(l, LineKind::Same),
                    LineRecord::plain(r, LineKind::Same),
                );
                i += 1;
                j += 1;
            }
            (Some(l), Some(r)) => {
                out.push(
                    LineRecord::plain(l, LineKind::Removed),
                    LineRecord::plain(r, LineKind::Added),
                );
                i += 1;
                j += 1;
            }
            (Some(l), None) => {
                out.push(LineRecord::plain(l, LineKind::Removed), LineRecord::placeholder());
                i += 1;
            }
            (None, Some(r)) => {
                out.push(LineRecord::placeholder(), LineRecord::plain(r, LineKind::Added));
                j += 1;
            }
            (None, None) => break,
        }
    }

    out
}

/// Mark each word of `line` that does not occur anywhere in `other`.
///
/// Membership is order-insensitive: a moved word is not highlighted.
pub fn highlight_words(line: &str, other: Option<&str>) -> Vec<Span> {
    let words: Vec<&str> = line.split(' ').collect();
    let other_words: HashSet<&str> = match other {
        Some(o) => o.split(' ').take(MAX_HIGHLIGHT_WORDS).collect(),
        None => HashSet::new(),
    };

    let mut spans: Vec<Span> = words
        .iter()
        .take(MAX_HIGHLIGHT_WORDS)
        .map(|w| Span {
            text: (*w).to_string(),
            different: !other_words.contains(w),
        })
        .collect();

    if words.len() > MAX_HIGHLIGHT_WORDS {
        spans.push(Span {
            text: words[MAX_HIGHLIGHT_WORDS..].join(" "),
            different: true,
        });
    }

    spans
}
