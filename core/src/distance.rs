//! Bounded Levenshtein distance over Unicode scalar values.

/// Stands in for an infinite bound.
pub const UNBOUNDED: usize = usize::MAX;

/// Result of a bounded distance computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceOutcome {
    /// Exact distance, no greater than the bound.
    Within(usize),
    /// The true distance is larger than the bound; its value was not computed.
    ExceedsBound,
    /// One side was empty; no informative distance exists.
    EmptyInput,
}

pub fn bounded_distance(a: &str, b: &str, max_distance: usize) -> DistanceOutcome {
    if a.is_empty() || b.is_empty() {
        return DistanceOutcome::EmptyInput;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let m = a.len();
    let n = b.len();

    if m.abs_diff(n) > max_distance {
        return DistanceOutcome::ExceedsBound;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        let mut row_min = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
            row_min = row_min.min(curr[j]);
        }
        // Row minima never decrease, so no later row can come back under the bound.
        if row_min > max_distance {
            return DistanceOutcome::ExceedsBound;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    match prev[n] {
        d if d <= max_distance => DistanceOutcome::Within(d),
        _ => DistanceOutcome::ExceedsBound,
    }
}

/// Numeric form of [`bounded_distance`].
///
/// Returns `max_distance` when either input is empty and `max_distance + 1`
/// when the bound is exceeded. Neither value is a real distance; callers
/// building rankings should match on [`bounded_distance`] instead.
pub fn edit_distance(a: &str, b: &str, max_distance: usize) -> usize {
    match bounded_distance(a, b, max_distance) {
        DistanceOutcome::Within(d) => d,
        DistanceOutcome::EmptyInput => max_distance,
        DistanceOutcome::ExceedsBound => max_distance.saturating_add(1),
    }
}
