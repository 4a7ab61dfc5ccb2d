//! Deterministic key-to-shard mapping.
//!
//! `shard_for_key` must produce bit-identical results across every process
//! in the cluster (coordinator and every node), since the coordinator and
//! any future node-side validation rely on the same derivation. FNV-1a is
//! used instead of `std::collections::hash_map::DefaultHasher` precisely
//! because the standard hasher is explicitly *not* guaranteed stable across
//! Rust releases or processes; FNV-1a is a fixed, fully specified algorithm.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a 32-bit hash over the UTF-8 bytes of `key`.
pub fn fnv1a_32(key: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Maps `key` onto `[0, num_shards)`. `num_shards` must be nonzero.
pub fn shard_for_key(key: &str, num_shards: u32) -> u32 {
    debug_assert!(num_shards > 0, "num_shards must be nonzero");
    fnv1a_32(key) % num_shards
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        // FNV-1a 32-bit reference vectors (empty string and "a").
        assert_eq!(fnv1a_32(""), 0x811c_9dc5);
        assert_eq!(fnv1a_32("a"), 0xe40c_292c);
    }

    #[test]
    fn deterministic_across_calls() {
        let key = "path/to/key";
        assert_eq!(shard_for_key(key, 64), shard_for_key(key, 64));
    }

    #[test]
    fn single_shard_routes_everything_to_zero() {
        for key in ["", "a", "long-key-with-many-characters-in-it", "/weird/path"] {
            assert_eq!(shard_for_key(key, 1), 0);
        }
    }

    #[test]
    fn stays_in_range_for_large_shard_counts() {
        for i in 0..2000 {
            let key = format!("user_{i}");
            let shard = shard_for_key(&key, 1024);
            assert!(shard < 1024);
        }
    }
}
