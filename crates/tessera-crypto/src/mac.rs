//! HMAC over the SHA-2 family.

use hmac::{Hmac, Mac};
use sha2::{Sha224, Sha256, Sha384, Sha512};
use tessera_proto::Algorithm;

use crate::error::{CryptoError, Result};

/// Incremental MAC state.
#[derive(Clone)]
pub enum MacEngine {
    /// HMAC-SHA-224.
    Sha224(Hmac<Sha224>),
    /// HMAC-SHA-256.
    Sha256(Hmac<Sha256>),
    /// HMAC-SHA-384.
    Sha384(Hmac<Sha384>),
    /// HMAC-SHA-512.
    Sha512(Hmac<Sha512>),
}

impl std::fmt::Debug for MacEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MacEngine")
    }
}

impl MacEngine {
    /// Start a MAC computation keyed with `key`.
    pub fn new(alg: Algorithm, key: &[u8]) -> Result<Self> {
        if !alg.is_hmac() {
            return Err(CryptoError::InvalidArgument("not a MAC algorithm"));
        }
        if key.is_empty() {
            return Err(CryptoError::InvalidArgument("empty MAC key"));
        }
        let invalid = |_| CryptoError::InvalidArgument("MAC key");
        match alg.hash() {
            Some(Algorithm::SHA_224) => Ok(Self::Sha224(Hmac::new_from_slice(key).map_err(invalid)?)),
            Some(Algorithm::SHA_256) => Ok(Self::Sha256(Hmac::new_from_slice(key).map_err(invalid)?)),
            Some(Algorithm::SHA_384) => Ok(Self::Sha384(Hmac::new_from_slice(key).map_err(invalid)?)),
            Some(Algorithm::SHA_512) => Ok(Self::Sha512(Hmac::new_from_slice(key).map_err(invalid)?)),
            _ => Err(CryptoError::NotSupported),
        }
    }

    /// Absorb `data`.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha224(m) => m.update(data),
            Self::Sha256(m) => m.update(data),
            Self::Sha384(m) => m.update(data),
            Self::Sha512(m) => m.update(data),
        }
    }

    /// Produce the tag.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha224(m) => m.finalize().into_bytes().to_vec(),
            Self::Sha256(m) => m.finalize().into_bytes().to_vec(),
            Self::Sha384(m) => m.finalize().into_bytes().to_vec(),
            Self::Sha512(m) => m.finalize().into_bytes().to_vec(),
        }
    }

    /// Check `tag` in constant time.
    pub fn verify(self, tag: &[u8]) -> Result<()> {
        let checked = match self {
            Self::Sha224(m) => m.verify_slice(tag),
            Self::Sha256(m) => m.verify_slice(tag),
            Self::Sha384(m) => m.verify_slice(tag),
            Self::Sha512(m) => m.verify_slice(tag),
        };
        checked.map_err(|_| CryptoError::InvalidSignature)
    }
}

/// Length of the tag produced by `alg`.
pub fn mac_length(alg: Algorithm) -> Option<usize> {
    if alg.is_hmac() { alg.hash().and_then(crate::hash::hash_length) } else { None }
}

/// One-shot MAC of `data`.
pub fn compute(alg: Algorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut engine = MacEngine::new(alg, key)?;
    engine.update(data);
    Ok(engine.finalize())
}

/// Check that `tag` authenticates `data`.
pub fn verify(alg: Algorithm, key: &[u8], data: &[u8], tag: &[u8]) -> Result<()> {
    let mut engine = MacEngine::new(alg, key)?;
    engine.update(data);
    engine.verify(tag)
}
