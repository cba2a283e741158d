//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples service logic from system entropy. Key
//! generation, IV and nonce generation, the random-bytes service and the
//! reverse-handle tokens all draw from it. This enables:
//!
//! - Deterministic Simulation: the harness supplies a seeded RNG so that a
//!   failing property test replays exactly.
//!
//! - Production Runtime: the server binary reads OS entropy without any
//!   change to the partition code.
//!
//! # Invariants
//!
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

/// Source of randomness for partitions.
///
/// # Safety
///
/// Production implementations MUST draw from a cryptographically secure
/// source. Simulation implementations MUST be seeded and log the seed.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Determinism during simulations: Given the same RNG seed, this produces
    ///   the same sequence of bytes
    /// - Unpredictability in production: Uses the OS entropy pool
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u32`.
    fn random_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    /// Generates a random `u64`.
    ///
    /// Used for connection reverse-handle tokens.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }
}
