//! SHA-2 digests.

use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;
use tessera_proto::Algorithm;

use crate::error::{CryptoError, Result};

/// Largest digest produced by any supported hash.
pub const MAX_HASH_SIZE: usize = 64;

/// Digest length of `alg`, if it is a supported hash.
pub fn hash_length(alg: Algorithm) -> Option<usize> {
    match alg {
        Algorithm::SHA_224 => Some(28),
        Algorithm::SHA_256 => Some(32),
        Algorithm::SHA_384 => Some(48),
        Algorithm::SHA_512 => Some(64),
        _ => None,
    }
}

/// Incremental hash state. Cloning forks the computation.
#[derive(Clone)]
pub enum HashEngine {
    /// SHA-224.
    Sha224(Sha224),
    /// SHA-256.
    Sha256(Sha256),
    /// SHA-384.
    Sha384(Sha384),
    /// SHA-512.
    Sha512(Sha512),
}

impl std::fmt::Debug for HashEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HashEngine").field(&self.algorithm()).finish()
    }
}

impl HashEngine {
    /// Start hashing with `alg`.
    pub fn new(alg: Algorithm) -> Result<Self> {
        match alg {
            Algorithm::SHA_224 => Ok(Self::Sha224(Sha224::new())),
            Algorithm::SHA_256 => Ok(Self::Sha256(Sha256::new())),
            Algorithm::SHA_384 => Ok(Self::Sha384(Sha384::new())),
            Algorithm::SHA_512 => Ok(Self::Sha512(Sha512::new())),
            _ if alg.is_hash() => Err(CryptoError::NotSupported),
            _ => Err(CryptoError::InvalidArgument("not a hash algorithm")),
        }
    }

    /// Algorithm of this engine.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Sha224(_) => Algorithm::SHA_224,
            Self::Sha256(_) => Algorithm::SHA_256,
            Self::Sha384(_) => Algorithm::SHA_384,
            Self::Sha512(_) => Algorithm::SHA_512,
        }
    }

    /// Digest length.
    pub fn output_len(&self) -> usize {
        hash_length(self.algorithm()).unwrap_or(0)
    }

    /// Absorb `data`.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha224(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    /// Produce the digest.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha224(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }

    /// Produce the digest and compare it with `expected` in constant time.
    pub fn verify(self, expected: &[u8]) -> Result<()> {
        let digest = self.finalize();
        if bool::from(digest.ct_eq(expected)) { Ok(()) } else { Err(CryptoError::InvalidSignature) }
    }
}

/// One-shot digest of `data`.
pub fn compute(alg: Algorithm, data: &[u8]) -> Result<Vec<u8>> {
    let mut engine = HashEngine::new(alg)?;
    engine.update(data);
    Ok(engine.finalize())
}

/// Check that `expected` is the digest of `data`.
pub fn compare(alg: Algorithm, data: &[u8], expected: &[u8]) -> Result<()> {
    let mut engine = HashEngine::new(alg)?;
    engine.update(data);
    engine.verify(expected)
}
