//! Deterministic layer assignment.
//!
//! The layer of a vertex is derived from its external id rather than from a
//! thread-local RNG: hashing the id keeps bulk builds reproducible across
//! runs and across re-inserts of the same id, which stabilizes graph
//! construction (see nmslib/hnswlib#28).
//!
//! The sampling chain is MurmurHash3 (32-bit) over the big-endian bytes of a
//! stable 32-bit hash of the id, mapped into (0, 1] and fed through the
//! usual geometric level formula `floor(-ln(u) * lambda)`.

/// MurmurHash3, 32-bit variant.
///
/// Implemented inline; the exact hash is part of the level-assignment
/// contract and must not drift with a dependency upgrade.
pub(crate) fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h = seed;
    let chunks = data.chunks_exact(4);
    let tail = chunks.remainder();

    for chunk in chunks {
        let mut k = u32::from_le_bytes(chunk.try_into().expect("4-byte chunk"));
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &b) in tail.iter().enumerate() {
            k |= u32::from(b) << (8 * i);
        }
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
    }

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Assign the maximum layer of a vertex from its external id.
///
/// `level_lambda` is `1 / ln(m)`; the result follows the geometric
/// distribution of the HNSW paper with the uniform variate replaced by the
/// id-seeded hash.
pub(crate) fn assign_level(external_id: &str, level_lambda: f64) -> u8 {
    let stable_hash = murmur3_32(external_id.as_bytes(), 0) as i32;
    let h = murmur3_32(&stable_hash.to_be_bytes(), 0) as i32;

    let mut u = (f64::from(h) / f64::from(i32::MAX)).abs();
    if u == 0.0 {
        u = 1.0 / f64::from(i32::MAX);
    }

    let level = (-u.ln() * level_lambda).floor();
    level.clamp(0.0, f64::from(u8::MAX)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_murmur3_reference_vectors() {
        // Published test vectors for MurmurHash3 x86_32.
        assert_eq!(murmur3_32(b"", 0), 0);
        assert_eq!(murmur3_32(b"hello", 0), 0x248b_fa47);
        assert_eq!(murmur3_32(b"hello, world", 0), 0x149b_bb7f);
    }

    #[test]
    fn test_murmur3_seed_changes_hash() {
        assert_ne!(murmur3_32(b"abc", 0), murmur3_32(b"abc", 1));
    }

    #[test]
    fn test_assign_level_deterministic() {
        let lambda = 1.0 / 10f64.ln();
        for id in ["a", "b", "vertex-42", ""] {
            assert_eq!(assign_level(id, lambda), assign_level(id, lambda));
        }
    }

    #[test]
    fn test_assign_level_distribution_shape() {
        // With m=10 (lambda ~= 0.434) most ids land on layer 0 and high
        // layers are rare.
        let lambda = 1.0 / 10f64.ln();
        let mut counts = [0usize; 8];
        for i in 0..10_000 {
            let level = assign_level(&format!("id-{}", i), lambda);
            counts[(level as usize).min(7)] += 1;
        }
        assert!(counts[0] > 8_000, "layer 0 share too small: {:?}", counts);
        assert!(counts[3] < 100, "deep layers too common: {:?}", counts);
    }

    #[test]
    fn test_assign_level_zero_lambda_sticks_to_base() {
        assert_eq!(assign_level("anything", 0.0), 0);
    }
}
