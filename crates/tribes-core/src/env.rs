//! Environment abstraction for deterministic testing.
//!
//! Protocol logic never reads the clock or the OS RNG directly. Production
//! uses system resources; tests plug in a seeded RNG and a fixed clock.

/// Time and randomness.
///
/// # Invariants
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Given the same seed, a test environment yields the same byte sequence
pub trait Environment: Clone + Send + Sync + 'static {
    /// Milliseconds since the Unix epoch, used for message timestamps and
    /// key-store record ordering.
    fn wall_clock_millis(&self) -> u64;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random fixed-size array.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }

    /// Fresh symmetric key.
    fn random_key(&self) -> tribes_crypto::SymmetricKey {
        tribes_crypto::SymmetricKey::from_bytes(self.random_array())
    }
}
