//! Approximate membership for keys ever reified on a shard
//!
//! A shard deduplicates every candidate it has ever materialized, including
//! candidates long since evicted, so the set only grows. A Bloom filter
//! keeps that affordable: false positives (a fresh candidate dropped as a
//! duplicate) are tolerated and compensated by backfill; false negatives
//! cannot happen.

use sha2::{Digest, Sha256};

/// Bloom filter over opaque string keys.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_probes: u32,
}

impl BloomFilter {
    /// Create a filter with an explicit geometry.
    pub fn new(num_bits: u64, num_probes: u32) -> Self {
        assert!(num_bits > 0, "num_bits must be > 0");
        assert!(num_probes > 0, "num_probes must be > 0");

        let words = (num_bits as usize).div_ceil(64);
        Self {
            bits: vec![0u64; words],
            num_bits,
            num_probes,
        }
    }

    /// The `k` deterministic bit positions for a key, derived from a single
    /// SHA-256 digest via double hashing.
    fn probes(&self, key: &str) -> impl Iterator<Item = u64> + '_ {
        let digest = Sha256::digest(key.as_bytes());
        let h1 = u64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"));
        let h2 = u64::from_be_bytes(digest[8..16].try_into().expect("digest is 32 bytes")) | 1;

        (0..self.num_probes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits)
    }

    /// Set the probe bits for a key.
    pub fn add(&mut self, key: &str) {
        let positions: Vec<u64> = self.probes(key).collect();
        for pos in positions {
            self.bits[(pos / 64) as usize] |= 1u64 << (pos % 64);
        }
    }

    /// True iff every probe bit for the key is set.
    pub fn contains(&self, key: &str) -> bool {
        self.probes(key)
            .all(|pos| self.bits[(pos / 64) as usize] & (1u64 << (pos % 64)) != 0)
    }
}

/// Default target false-positive rate for a shard's key set.
pub const DEFAULT_FP_RATE: f64 = 1e-3;

/// Key set sized from an expected capacity and a target false-positive rate.
#[derive(Debug, Clone)]
pub struct KeySet {
    filter: BloomFilter,
    len: u64,
}

impl KeySet {
    /// Size a filter for `capacity` keys at false-positive rate `fp_rate`,
    /// using the standard m = -n ln p / (ln 2)^2 and k = (m/n) ln 2 bounds.
    pub fn with_capacity(capacity: usize, fp_rate: f64) -> Self {
        assert!(
            fp_rate > 0.0 && fp_rate < 1.0,
            "fp_rate must be in (0, 1)"
        );

        let n = capacity.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;

        let num_bits = (-(n * fp_rate.ln()) / (ln2 * ln2)).ceil() as u64;
        let num_probes = ((num_bits as f64 / n) * ln2).round().max(1.0) as u32;

        Self {
            filter: BloomFilter::new(num_bits.max(64), num_probes),
            len: 0,
        }
    }

    /// Record a key.
    pub fn add(&mut self, key: &str) {
        self.filter.add(key);
        self.len += 1;
    }

    /// Approximate membership test.
    pub fn contains(&self, key: &str) -> bool {
        self.filter.contains(key)
    }

    /// Number of keys added so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True when nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_added_keys_are_members() {
        let mut set = KeySet::with_capacity(1_000, DEFAULT_FP_RATE);

        for i in 0..1_000 {
            set.add(&format!("key-{i}"));
        }

        for i in 0..1_000 {
            assert!(set.contains(&format!("key-{i}")), "false negative at {i}");
        }
        assert_eq!(set.len(), 1_000);
    }

    #[test]
    fn test_false_positive_rate_within_bound() {
        let fp_rate = 0.01;
        let mut set = KeySet::with_capacity(1_000, fp_rate);

        for i in 0..1_000 {
            set.add(&format!("present-{i}"));
        }

        // probe 10x capacity of keys that were never added
        let trials = 10_000;
        let false_positives = (0..trials)
            .filter(|i| set.contains(&format!("absent-{i}")))
            .count();

        let observed = false_positives as f64 / trials as f64;
        assert!(
            observed <= fp_rate * 2.0,
            "observed fp rate {observed} exceeds 2x the configured {fp_rate}"
        );
    }

    #[test]
    fn test_raw_filter_roundtrip() {
        let mut bf = BloomFilter::new(1 << 15, 13);
        bf.add("alpha");

        assert!(bf.contains("alpha"));
        assert!(!bf.contains("beta"));
    }
}
