//! Seeded environment for reproducible runs.

#![allow(clippy::disallowed_types, reason = "RNG lock is never held across await")]

use std::sync::{Arc, Mutex, PoisonError};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tribes_core::Environment;

/// Start of simulated time, 2024-01-01T00:00:00Z.
const EPOCH_MILLIS: u64 = 1_704_067_200_000;

/// Environment with a seeded ChaCha RNG and a clock pinned to
/// [`EPOCH_MILLIS`].
///
/// Clones share the RNG, so a whole simulated network driven
/// from one seed produces one byte sequence.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl SimEnv {
    /// Environment whose randomness is fully determined by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
        }
    }
}

impl Environment for SimEnv {
    fn wall_clock_millis(&self) -> u64 {
        EPOCH_MILLIS
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
