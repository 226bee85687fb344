//! # xxl-bench
//!
//! Benchmark harness and workload generators for the XXL cores.

#![warn(missing_docs)]
#![warn(clippy::all)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generates `count` pseudorandom integers from a fixed seed.
#[must_use]
pub fn random_integers(count: usize, seed: u64) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|_| rng.gen()).collect()
}

/// Generates `count` records of pseudorandom length in `[min_len, max_len]`.
#[must_use]
pub fn random_records(count: usize, min_len: usize, max_len: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let len = rng.gen_range(min_len..=max_len);
            let mut record = vec![0u8; len];
            rng.fill(record.as_mut_slice());
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(random_integers(100, 1), random_integers(100, 1));
        assert_ne!(random_integers(100, 1), random_integers(100, 2));
    }

    #[test]
    fn test_record_lengths() {
        for record in random_records(50, 10, 20, 3) {
            assert!((10..=20).contains(&record.len()));
        }
    }
}
