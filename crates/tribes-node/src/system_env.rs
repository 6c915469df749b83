//! Environment backed by the system clock and the OS RNG.

use tribes_core::Environment;

/// Clock and entropy for a running node.
///
/// # Panics
///
/// Panics if the OS RNG fails. Group keys, message keys and nonces all come
/// from here; continuing without entropy would produce guessable keys.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    fn wall_clock_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG available, group and message keys depend on it");
    }
}
