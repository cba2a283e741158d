//! HKDF key derivation, optionally fed by an X25519 agreement.
//!
//! Inputs arrive as separate steps: an optional salt, the secret, and an
//! optional info string. The salt must precede the secret and each step is
//! accepted once. Once the first output byte has been read, no further
//! input is accepted. Output is a stream: successive reads continue where
//! the previous one stopped, bounded by the capacity.

use hkdf::Hkdf;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use tessera_proto::{Algorithm, DerivationStep, KeyType};
use zeroize::Zeroizing;

use crate::{
    agreement,
    error::{CryptoError, Result},
    hash::hash_length,
};

/// HKDF-Expand produces at most this many blocks.
const MAX_BLOCKS: u64 = 255;

enum Prk {
    Sha224(Hkdf<Sha224>),
    Sha256(Hkdf<Sha256>),
    Sha384(Hkdf<Sha384>),
    Sha512(Hkdf<Sha512>),
}

impl Prk {
    fn extract(hash: Algorithm, salt: Option<&[u8]>, secret: &[u8]) -> Result<Self> {
        match hash {
            Algorithm::SHA_224 => Ok(Self::Sha224(Hkdf::new(salt, secret))),
            Algorithm::SHA_256 => Ok(Self::Sha256(Hkdf::new(salt, secret))),
            Algorithm::SHA_384 => Ok(Self::Sha384(Hkdf::new(salt, secret))),
            Algorithm::SHA_512 => Ok(Self::Sha512(Hkdf::new(salt, secret))),
            _ => Err(CryptoError::NotSupported),
        }
    }

    fn expand(&self, info: &[u8], okm: &mut [u8]) -> Result<()> {
        let expanded = match self {
            Self::Sha224(h) => h.expand(info, okm),
            Self::Sha256(h) => h.expand(info, okm),
            Self::Sha384(h) => h.expand(info, okm),
            Self::Sha512(h) => h.expand(info, okm),
        };
        expanded.map_err(|_| CryptoError::InsufficientData)
    }
}

/// Multi-part key derivation state.
pub struct KeyDerivation {
    alg: Algorithm,
    hash: Algorithm,
    salt: Option<Zeroizing<Vec<u8>>>,
    secret: Option<Zeroizing<Vec<u8>>>,
    info: Option<Vec<u8>>,
    capacity: u64,
    prk: Option<Prk>,
    offset: usize,
}

impl std::fmt::Debug for KeyDerivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDerivation")
            .field("alg", &self.alg)
            .field("capacity", &self.capacity)
            .field("secret_set", &self.secret.is_some())
            .field("output_started", &self.prk.is_some())
            .finish_non_exhaustive()
    }
}

impl KeyDerivation {
    /// Start a derivation. `alg` is HKDF or ECDH combined with HKDF.
    pub fn new(alg: Algorithm) -> Result<Self> {
        if !alg.is_key_derivation() {
            return Err(CryptoError::InvalidArgument("not a key derivation algorithm"));
        }
        if alg.is_combined_key_agreement() && alg.agreement_base() != Algorithm::ECDH {
            return Err(CryptoError::NotSupported);
        }
        let kdf = if alg.is_combined_key_agreement() { alg.derivation() } else { alg };
        if !kdf.is_hkdf() {
            return Err(CryptoError::NotSupported);
        }
        let hash = kdf.hash().ok_or(CryptoError::NotSupported)?;
        let hash_len = hash_length(hash).ok_or(CryptoError::NotSupported)?;

        Ok(Self {
            alg,
            hash,
            salt: None,
            secret: None,
            info: None,
            capacity: MAX_BLOCKS * hash_len as u64,
            prk: None,
            offset: 0,
        })
    }

    /// Algorithm chosen at setup.
    pub fn algorithm(&self) -> Algorithm {
        self.alg
    }

    /// Remaining number of bytes that can be read.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Lower the capacity. Raising it is an invalid argument.
    pub fn set_capacity(&mut self, capacity: u64) -> Result<()> {
        if capacity > self.capacity {
            return Err(CryptoError::InvalidArgument("capacity can only decrease"));
        }
        self.capacity = capacity;
        Ok(())
    }

    /// Provide a step from caller-supplied bytes.
    pub fn input_bytes(&mut self, step: DerivationStep, data: &[u8]) -> Result<()> {
        if step == DerivationStep::Secret && self.alg.is_combined_key_agreement() {
            return Err(CryptoError::InvalidArgument("secret must come from the key agreement"));
        }
        self.input(step, data)
    }

    /// Provide a step from key material of type `key_type`.
    pub fn input_key(&mut self, step: DerivationStep, key_type: KeyType, data: &[u8]) -> Result<()> {
        let allowed = match step {
            DerivationStep::Secret => key_type == KeyType::DERIVE,
            _ => key_type == KeyType::DERIVE || key_type == KeyType::RAW_DATA,
        };
        if !allowed {
            return Err(CryptoError::InvalidArgument("key type not usable for this step"));
        }
        self.input_bytes(step, data)
    }

    /// Provide the secret from an agreement between our key and `peer`.
    pub fn key_agreement(
        &mut self,
        step: DerivationStep,
        key_type: KeyType,
        key: &[u8],
        peer: &[u8],
    ) -> Result<()> {
        if !self.alg.is_combined_key_agreement() {
            return Err(CryptoError::InvalidArgument("derivation has no key agreement"));
        }
        if step != DerivationStep::Secret {
            return Err(CryptoError::InvalidArgument("agreement only provides the secret"));
        }
        self.check_input_open()?;
        let shared = agreement::agree(self.alg, key_type, key, peer)?;
        self.input(step, &shared)
    }

    /// Read the next `out.len()` bytes.
    ///
    /// Asking for more than the remaining capacity exhausts the derivation:
    /// nothing is written and the capacity drops to zero.
    pub fn output_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        let Some(secret) = self.secret.as_ref() else {
            return Err(CryptoError::BadState("secret not provided"));
        };
        if out.len() as u64 > self.capacity {
            self.capacity = 0;
            return Err(CryptoError::InsufficientData);
        }
        if self.prk.is_none() {
            let salt = self.salt.as_ref().map(|s| s.as_slice());
            self.prk = Some(Prk::extract(self.hash, salt, secret)?);
        }
        let Some(prk) = self.prk.as_ref() else {
            return Err(CryptoError::BadState("derivation not started"));
        };

        let end = self.offset + out.len();
        let mut stream = Zeroizing::new(vec![0u8; end]);
        prk.expand(self.info.as_deref().unwrap_or_default(), &mut stream)?;
        out.copy_from_slice(&stream[self.offset..end]);
        self.offset = end;
        self.capacity -= out.len() as u64;
        Ok(())
    }

    /// Read `len` bytes into a fresh buffer.
    pub fn output_vec(&mut self, len: usize) -> Result<Zeroizing<Vec<u8>>> {
        let mut out = Zeroizing::new(vec![0u8; len]);
        self.output_bytes(&mut out)?;
        Ok(out)
    }

    fn check_input_open(&self) -> Result<()> {
        if self.prk.is_some() {
            return Err(CryptoError::BadState("input after output started"));
        }
        Ok(())
    }

    fn input(&mut self, step: DerivationStep, data: &[u8]) -> Result<()> {
        self.check_input_open()?;
        match step {
            DerivationStep::Salt => {
                if self.salt.is_some() || self.secret.is_some() {
                    return Err(CryptoError::BadState("salt must come once, before the secret"));
                }
                self.salt = Some(Zeroizing::new(data.to_vec()));
            },
            DerivationStep::Secret => {
                if self.secret.is_some() {
                    return Err(CryptoError::BadState("secret already provided"));
                }
                self.secret = Some(Zeroizing::new(data.to_vec()));
            },
            DerivationStep::Info => {
                if self.info.is_some() {
                    return Err(CryptoError::BadState("info already provided"));
                }
                self.info = Some(data.to_vec());
            },
            DerivationStep::Label | DerivationStep::Seed => {
                return Err(CryptoError::InvalidArgument("step not used by HKDF"));
            },
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hex_literal::hex;

    use super::*;

    const HKDF_SHA256: Algorithm = Algorithm::hkdf(Algorithm::SHA_256);

    // RFC 5869 test case 1.
    const IKM: [u8; 22] = [0x0b; 22];
    const SALT: [u8; 13] = hex!("000102030405060708090a0b0c");
    const INFO: [u8; 10] = hex!("f0f1f2f3f4f5f6f7f8f9");
    const OKM: [u8; 42] = hex!(
        "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf"
        "34007208d5b887185865"
    );

    fn rfc5869() -> KeyDerivation {
        let mut kdf = KeyDerivation::new(HKDF_SHA256).unwrap();
        kdf.input_bytes(DerivationStep::Salt, &SALT).unwrap();
        kdf.input_bytes(DerivationStep::Secret, &IKM).unwrap();
        kdf.input_bytes(DerivationStep::Info, &INFO).unwrap();
        kdf
    }

    #[test]
    fn rfc5869_case1() {
        let mut kdf = rfc5869();
        assert_eq!(kdf.output_vec(42).unwrap().as_slice(), OKM);
    }

    #[test]
    fn output_is_a_stream() {
        let mut kdf = rfc5869();
        let mut joined = kdf.output_vec(5).unwrap().to_vec();
        joined.extend_from_slice(&kdf.output_vec(37).unwrap());
        assert_eq!(joined, OKM);
        assert_eq!(kdf.capacity(), 255 * 32 - 42);
    }

    #[test]
    fn capacity_bounds_output() {
        let mut kdf = rfc5869();
        kdf.set_capacity(10).unwrap();
        assert!(matches!(kdf.set_capacity(11), Err(CryptoError::InvalidArgument(_))));
        kdf.output_vec(4).unwrap();
        assert_eq!(kdf.capacity(), 6);
        assert_eq!(kdf.output_vec(7).unwrap_err(), CryptoError::InsufficientData);
        assert_eq!(kdf.capacity(), 0);
        assert_eq!(kdf.output_vec(1).unwrap_err(), CryptoError::InsufficientData);
    }

    #[test]
    fn step_ordering() {
        let mut kdf = KeyDerivation::new(HKDF_SHA256).unwrap();
        assert!(matches!(kdf.output_vec(1), Err(CryptoError::BadState(_))));
        kdf.input_bytes(DerivationStep::Secret, &IKM).unwrap();
        assert!(matches!(kdf.input_bytes(DerivationStep::Salt, &SALT), Err(CryptoError::BadState(_))));
        assert!(matches!(kdf.input_bytes(DerivationStep::Secret, &IKM), Err(CryptoError::BadState(_))));
        assert!(matches!(kdf.input_bytes(DerivationStep::Label, b""), Err(CryptoError::InvalidArgument(_))));
        kdf.output_vec(1).unwrap();
        assert!(matches!(kdf.input_bytes(DerivationStep::Info, &INFO), Err(CryptoError::BadState(_))));
    }

    #[test]
    fn combined_agreement_supplies_secret() {
        let alg = Algorithm::key_agreement(Algorithm::ECDH, HKDF_SHA256);
        let mut kdf = KeyDerivation::new(alg).unwrap();
        assert!(matches!(kdf.input_bytes(DerivationStep::Secret, &IKM), Err(CryptoError::InvalidArgument(_))));

        let alice = [1u8; 32];
        let bob = [2u8; 32];
        let bob_public = agreement::public_key(&bob).unwrap();
        kdf.key_agreement(DerivationStep::Secret, agreement::X25519_PAIR, &alice, &bob_public).unwrap();
        let ours = kdf.output_vec(32).unwrap();

        let shared = agreement::agree(Algorithm::ECDH, agreement::X25519_PAIR, &alice, &bob_public).unwrap();
        let mut plain = KeyDerivation::new(HKDF_SHA256).unwrap();
        plain.input_bytes(DerivationStep::Secret, &shared).unwrap();
        assert_eq!(ours.as_slice(), plain.output_vec(32).unwrap().as_slice());
    }

    #[test]
    fn setup_rejects_non_derivation() {
        assert!(matches!(KeyDerivation::new(Algorithm::SHA_256), Err(CryptoError::InvalidArgument(_))));
        assert!(KeyDerivation::new(Algorithm::hkdf(Algorithm::SHA_512)).is_ok());
    }
}
