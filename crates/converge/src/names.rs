//! Short random suffixes for test-scoped names and scratch files.
//!
//! Uniqueness is the only requirement, so a seeded `StdRng` is plenty; tests
//! inject a fixed seed to get deterministic names.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Default suffix length.
pub const SUFFIX_LEN: usize = 8;

/// Generates lowercase alphanumeric suffixes that are valid in object names.
#[derive(Debug)]
pub struct NameGenerator {
    rng: Mutex<StdRng>,
    len: usize,
}

impl NameGenerator {
    /// Generator seeded from the operating system.
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Deterministic generator for tests.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    /// Generator backed by a caller-supplied entropy source.
    #[must_use]
    pub fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            len: SUFFIX_LEN,
        }
    }

    /// Change the suffix length.
    #[must_use]
    pub fn with_len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    /// A fresh suffix, e.g. `k3x9q0ab`.
    pub fn suffix(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..self.len)
            .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
            .collect()
    }

    /// `prefix-suffix`, suitable as a namespace or object name.
    pub fn name(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.suffix())
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new()
    }
}
