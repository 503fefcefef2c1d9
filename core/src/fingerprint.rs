//! Line-shingle MinHash signatures.
//!
//! Content is cut to its first [`MAX_FINGERPRINT_CHARS`] characters and split
//! into one shingle per line. Anything past that prefix does not influence the
//! signature.

use crate::error::{CoreResult, NeighborError};

pub const DEFAULT_NUM_HASHES: usize = 10;
pub const MAX_FINGERPRINT_CHARS: usize = 10_000;

/// Value held by every slot of a signature with no shingles.
pub const EMPTY_SLOT: u32 = u32::MAX;

const FNV32_OFFSET: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// Position `i` holds the minimum shingle hash under hash function `i`.
pub type Signature = Vec<u32>;

fn seeded_hash(bytes: &[u8], seed: u32) -> u32 {
    let mut hash = seed;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(FNV32_PRIME);
    }
    hash
}

fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

pub fn fingerprint(content: &str, num_hashes: usize) -> Signature {
    let mut signature = vec![EMPTY_SLOT; num_hashes];
    if content.is_empty() {
        return signature;
    }

    let prefix = truncate_chars(content, MAX_FINGERPRINT_CHARS);
    let shingles: Vec<&str> = prefix.split('\n').map(str::trim).collect();

    for (i, slot) in signature.iter_mut().enumerate() {
        let seed = (i as u32) ^ FNV32_OFFSET;
        for shingle in &shingles {
            let h = seeded_hash(shingle.as_bytes(), seed);
            if h < *slot {
                *slot = h;
            }
        }
    }

    signature
}

/// Fraction of slots on which the two signatures agree.
pub fn similarity(a: &[u32], b: &[u32]) -> CoreResult<f64> {
    if a.len() != b.len() {
        return Err(NeighborError::InvalidArgument(format!(
            "signature length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    if a.is_empty() {
        return Err(NeighborError::InvalidArgument(
            "signatures must have at least one slot".to_string(),
        ));
    }

    let agree = a.iter().zip(b).filter(|(x, y)| x == y).count();
    Ok(agree as f64 / a.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let text = "fn main() {\n    println!(\"hi\");\n}\n";
        assert_eq!(fingerprint(text, 10), fingerprint(text, 10));
        assert_eq!(fingerprint(text, 10).len(), 10);
    }

    #[test]
    fn test_known_hash_values() {
        // FNV-1a with the standard offset basis as seed 0.
        assert_eq!(seeded_hash(b"", FNV32_OFFSET), 0x811c_9dc5);
        assert_eq!(seeded_hash(b"a", FNV32_OFFSET), 0xe40c_292c);
    }

    #[test]
    fn test_empty_content_uses_sentinel() {
        assert_eq!(fingerprint("", 4), vec![EMPTY_SLOT; 4]);
    }

    #[test]
    fn test_shingles_are_trimmed() {
        assert_eq!(fingerprint("  a\nb  ", 8), fingerprint("a\nb", 8));
    }

    #[test]
    fn test_line_order_does_not_matter() {
        assert_eq!(fingerprint("x\ny\nz", 10), fingerprint("z\nx\ny", 10));
    }

    #[test]
    fn test_content_past_prefix_is_ignored() {
        let base = "a\n".repeat(MAX_FINGERPRINT_CHARS / 2);
        let extended = format!("{base}something new past the cap");
        assert_eq!(fingerprint(&base, 10), fingerprint(&extended, 10));
    }

    #[test]
    fn test_similarity_bounds() {
        let a = fingerprint("one\ntwo\nthree", 10);
        let b = fingerprint("uno\ndos\ntres", 10);
        let self_sim = similarity(&a, &a).unwrap();
        let cross = similarity(&a, &b).unwrap();
        assert_eq!(self_sim, 1.0);
        assert!((0.0..=1.0).contains(&cross));
    }

    #[test]
    fn test_similarity_counts_matching_slots() {
        assert_eq!(similarity(&[1, 2, 3, 4], &[1, 9, 3, 9]).unwrap(), 0.5);
    }

    #[test]
    fn test_similarity_rejects_length_mismatch() {
        let err = similarity(&[1, 2, 3], &[1, 2]).unwrap_err();
        assert!(matches!(err, NeighborError::InvalidArgument(_)));
        assert!(similarity(&[], &[]).is_err());
    }
}
