//! Production `Environment` backed by OS entropy.

use tessera_core::Environment;

/// Production environment using the OS cryptographic RNG.
///
/// # Security
///
/// `getrandom` reads the OS entropy pool. Keys, IVs, nonces and connection
/// tokens all come from here in production. If the pool cannot be read the
/// process aborts.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        if let Err(e) = getrandom::fill(buffer) {
            // NOTE: Not expected on supported platforms. Predictable bytes
            // would become key material, so there is no fallback.
            tracing::error!("getrandom failed: {}", e);
            std::process::abort();
        }
    }
}
