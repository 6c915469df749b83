//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations to test error handling and
//! recovery. Used for chaos testing to ensure the key store surfaces storage
//! failures instead of hiding them.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use tribes_core::{FeedId, GroupId};

use super::{Storage, StorageError, StoredGroup};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but fails operations
/// with a configured probability. Clones share the RNG, so the failure
/// sequence is reproducible for a given seed and call order.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Operations attempted, failed or not
    operation_count: Arc<AtomicUsize>,
    /// Writes still to fail regardless of the rate
    forced_write_failures: Arc<AtomicUsize>,
}

/// Linear congruential generator; reproducible with the same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner` with a fixed default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
            forced_write_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Fail the next `count` writes, then fall back to the failure rate.
    pub fn fail_next_writes(&self, count: usize) {
        self.forced_write_failures.store(count, Ordering::SeqCst);
    }

    /// Like [`Self::inject`], but consumes a forced failure first.
    fn inject_write(&self) -> Result<(), StorageError> {
        let forced = self
            .forced_write_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if forced {
            self.operation_count.fetch_add(1, Ordering::Relaxed);
            return Err(StorageError::Io("forced write failure".to_string()));
        }
        self.inject()
    }

    /// Count the operation and decide whether it fails.
    fn inject(&self) -> Result<(), StorageError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);

        #[allow(clippy::expect_used)]
        let fail = self.rng.lock().expect("ChaoticRng mutex poisoned").next() < self.failure_rate;

        if fail {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn put_group(
        &self,
        group_id: &GroupId,
        record: &StoredGroup,
        inserted_at: u64,
    ) -> Result<(), StorageError> {
        self.inject_write()?;
        self.inner.put_group(group_id, record, inserted_at)
    }

    fn list_groups(&self) -> Result<Vec<(GroupId, StoredGroup)>, StorageError> {
        self.inject()?;
        self.inner.list_groups()
    }

    fn put_membership(&self, author: &FeedId, group_id: &GroupId) -> Result<(), StorageError> {
        self.inject_write()?;
        self.inner.put_membership(author, group_id)
    }

    fn list_memberships(&self) -> Result<Vec<(FeedId, GroupId)>, StorageError> {
        self.inject()?;
        self.inner.list_memberships()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn ids(n: u8) -> (FeedId, GroupId) {
        (FeedId::from_public_key([n; 32]), GroupId::from_bytes([n; 32]))
    }

    #[test]
    fn test_chaotic_with_zero_failure_rate() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 0.0);

        for i in 0..100 {
            let (feed, group) = ids(i);
            chaotic.put_membership(&feed, &group).expect("should not fail with 0% rate");
        }

        assert_eq!(chaotic.list_memberships().expect("query failed").len(), 100);
    }

    #[test]
    fn test_chaotic_with_100_failure_rate() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.0);
        let (feed, group) = ids(1);

        assert!(chaotic.put_membership(&feed, &group).is_err());
        assert!(chaotic.list_memberships().is_err());
        assert!(chaotic.list_groups().is_err());
        assert_eq!(chaotic.operation_count(), 3);
    }

    #[test]
    fn test_chaotic_deterministic_with_seed() {
        let chaotic1 = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 42);
        let chaotic2 = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 42);

        for i in 0..100 {
            let (feed, group) = ids(i);
            let result1 = chaotic1.put_membership(&feed, &group);
            let result2 = chaotic2.put_membership(&feed, &group);

            assert_eq!(result1.is_ok(), result2.is_ok(), "determinism violated at iteration {i}");
        }
    }

    #[test]
    fn test_chaotic_accesses_underlying_storage() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 0.0);
        let (feed, group) = ids(1);

        chaotic.put_membership(&feed, &group).expect("store failed");

        assert_eq!(chaotic.inner().list_memberships().expect("query failed"), vec![(feed, group)]);
    }

    #[test]
    fn test_chaotic_forced_write_failures_run_out() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 0.0);
        let (feed, group) = ids(1);
        chaotic.fail_next_writes(2);

        assert!(chaotic.list_memberships().is_ok());
        assert!(chaotic.put_membership(&feed, &group).is_err());
        assert!(chaotic.put_membership(&feed, &group).is_err());
        assert!(chaotic.put_membership(&feed, &group).is_ok());
        assert_eq!(chaotic.operation_count(), 4);
    }

    #[test]
    #[should_panic(expected = "failure_rate must be between 0.0 and 1.0")]
    fn test_chaotic_rejects_invalid_failure_rate() {
        let _chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.5);
    }
}
