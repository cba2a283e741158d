//! Crypto service configuration.

use tessera_core::{ServiceManifest, Sid, VersionPolicy};
use tessera_crypto::aead;
use tessera_proto::{MAX_NONCE_LENGTH, Signals};

use crate::error::ServerError;

/// Service id of the crypto service.
pub const CRYPTO_SID: Sid = 0x0000_0080;

/// Version of the crypto service.
pub const CRYPTO_VERSION: u32 = 1;

/// Crypto partition configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Service id clients connect to.
    pub sid: Sid,
    /// Name used in logs.
    pub name: String,
    /// Service version.
    pub version: u32,
    /// Version matching policy.
    pub version_policy: VersionPolicy,
    /// Simultaneous connections accepted.
    pub max_connections: usize,
    /// Live multi-part operations across all connections.
    pub max_operations: usize,
    /// Keys held in memory (volatile and cached persistent).
    pub max_keys: usize,
    /// Longest nonce accepted in a one-shot AEAD descriptor.
    pub max_nonce_length: usize,
    /// Associated data plus input one multi-part AEAD may buffer.
    pub max_aead_buffer: usize,
    /// Signal asserted for pending crypto requests.
    pub signal: Signals,
    /// Whether non-secure clients may connect.
    pub non_secure_allowed: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            sid: CRYPTO_SID,
            name: "tessera-crypto".to_string(),
            version: CRYPTO_VERSION,
            version_policy: VersionPolicy::Relaxed,
            max_connections: 8,
            max_operations: 16,
            max_keys: 32,
            max_nonce_length: MAX_NONCE_LENGTH,
            max_aead_buffer: aead::DEFAULT_BUFFER_LIMIT,
            signal: Signals::from_bits_retain(1 << Signals::FIRST_SERVICE_BIT),
            non_secure_allowed: true,
        }
    }
}

impl ServiceConfig {
    /// Check limits before the partition is registered.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_connections == 0 || self.max_operations == 0 || self.max_keys == 0 || self.max_aead_buffer == 0 {
            return Err(ServerError::Config("limits must be non-zero".to_string()));
        }
        if self.max_nonce_length > MAX_NONCE_LENGTH {
            return Err(ServerError::Config(format!(
                "nonce bound {} exceeds the descriptor field ({MAX_NONCE_LENGTH})",
                self.max_nonce_length
            )));
        }
        if !self.signal.is_single() || self.signal.contains(Signals::DOORBELL) {
            return Err(ServerError::Config(format!("invalid service signal {:#x}", self.signal.bits())));
        }
        Ok(())
    }

    /// Manifest registered with the partition manager.
    pub fn manifest(&self) -> ServiceManifest {
        ServiceManifest {
            sid: self.sid,
            name: self.name.clone(),
            signal: self.signal,
            version: self.version,
            policy: self.version_policy,
            max_connections: self.max_connections,
            non_secure_allowed: self.non_secure_allowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(ServiceConfig::default().validate().is_ok());
        assert_eq!(ServiceConfig::default().manifest().sid, CRYPTO_SID);
    }

    #[test]
    fn nonce_bound_cannot_exceed_descriptor() {
        let config = ServiceConfig { max_nonce_length: MAX_NONCE_LENGTH + 1, ..Default::default() };
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn doorbell_is_not_a_service_signal() {
        let config = ServiceConfig { signal: Signals::DOORBELL, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
