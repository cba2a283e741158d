//! Algorithm and key-type identifiers.
//!
//! Both use the PSA Certified numeric encodings. Only the identifiers the
//! service understands have named constants; anything else decodes fine and
//! is rejected with `NOT_SUPPORTED` at dispatch.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Algorithm identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Algorithm(pub u32);

const CATEGORY_MASK: u32 = 0x7f00_0000;
const CATEGORY_HASH: u32 = 0x0200_0000;
const CATEGORY_CIPHER: u32 = 0x0400_0000;
const CATEGORY_AEAD: u32 = 0x0500_0000;
const CATEGORY_SIGN: u32 = 0x0600_0000;
const CATEGORY_ASYMMETRIC_ENCRYPTION: u32 = 0x0700_0000;
const CATEGORY_KEY_DERIVATION: u32 = 0x0800_0000;
const CATEGORY_KEY_AGREEMENT: u32 = 0x0900_0000;
const HMAC_BASE: u32 = 0x0380_0000;
const HKDF_BASE: u32 = 0x0800_0100;
const HASH_MASK: u32 = 0x0000_00ff;

impl Algorithm {
    /// No algorithm.
    pub const NONE: Self = Self(0);
    /// SHA-224.
    pub const SHA_224: Self = Self(0x0200_0008);
    /// SHA-256.
    pub const SHA_256: Self = Self(0x0200_0009);
    /// SHA-384.
    pub const SHA_384: Self = Self(0x0200_000a);
    /// SHA-512.
    pub const SHA_512: Self = Self(0x0200_000b);
    /// Stream cipher mode of a stream-cipher key (ChaCha20).
    pub const STREAM_CIPHER: Self = Self(0x0480_0100);
    /// AES-GCM with a 16-byte tag.
    pub const GCM: Self = Self(0x0550_0200);
    /// ChaCha20-Poly1305 with a 16-byte tag.
    pub const CHACHA20_POLY1305: Self = Self(0x0510_0500);
    /// EdDSA over the whole message (Ed25519).
    pub const PURE_EDDSA: Self = Self(0x0600_0800);
    /// Raw elliptic-curve Diffie-Hellman.
    pub const ECDH: Self = Self(0x0902_0000);
    /// RSA PKCS#1 v1.5 encryption. Recognised, never supported.
    pub const RSA_PKCS1V15_CRYPT: Self = Self(0x0700_0200);

    /// HMAC over `hash`.
    pub const fn hmac(hash: Self) -> Self {
        Self(HMAC_BASE | (hash.0 & HASH_MASK))
    }

    /// HKDF over `hash`.
    pub const fn hkdf(hash: Self) -> Self {
        Self(HKDF_BASE | (hash.0 & HASH_MASK))
    }

    /// Key agreement `ka` feeding key derivation `kdf`.
    pub const fn key_agreement(ka: Self, kdf: Self) -> Self {
        Self(ka.0 | (kdf.0 & 0x0000_ffff))
    }

    const fn category(self) -> u32 {
        self.0 & CATEGORY_MASK
    }

    /// Hash algorithm.
    pub const fn is_hash(self) -> bool {
        self.category() == CATEGORY_HASH
    }

    /// HMAC of some hash.
    pub const fn is_hmac(self) -> bool {
        self.0 & 0x7fc0_0000 == HMAC_BASE
    }

    /// Unauthenticated cipher.
    pub const fn is_cipher(self) -> bool {
        self.category() == CATEGORY_CIPHER
    }

    /// Authenticated encryption.
    pub const fn is_aead(self) -> bool {
        self.category() == CATEGORY_AEAD
    }

    /// Signature algorithm.
    pub const fn is_sign(self) -> bool {
        self.category() == CATEGORY_SIGN
    }

    /// Asymmetric encryption algorithm.
    pub const fn is_asymmetric_encryption(self) -> bool {
        self.category() == CATEGORY_ASYMMETRIC_ENCRYPTION
    }

    /// HKDF of some hash.
    pub const fn is_hkdf(self) -> bool {
        self.0 & !HASH_MASK == HKDF_BASE
    }

    /// Key derivation, with or without a key agreement step in front.
    pub const fn is_key_derivation(self) -> bool {
        self.category() == CATEGORY_KEY_DERIVATION
            || (self.category() == CATEGORY_KEY_AGREEMENT && self.0 & 0xffff != 0)
    }

    /// Raw key agreement (no derivation attached).
    pub const fn is_raw_key_agreement(self) -> bool {
        self.category() == CATEGORY_KEY_AGREEMENT && self.0 & 0xffff == 0
    }

    /// Key agreement combined with a derivation.
    pub const fn is_combined_key_agreement(self) -> bool {
        self.category() == CATEGORY_KEY_AGREEMENT && self.0 & 0xffff != 0
    }

    /// Hash underlying an HMAC, HKDF or hash-parameterised algorithm.
    pub const fn hash(self) -> Option<Self> {
        let low = self.0 & HASH_MASK;
        if low == 0 { None } else { Some(Self(CATEGORY_HASH | low)) }
    }

    /// Key-agreement half of a combined algorithm.
    pub const fn agreement_base(self) -> Self {
        Self(self.0 & 0xffff_0000)
    }

    /// Derivation half of a combined algorithm.
    pub const fn derivation(self) -> Self {
        Self((self.0 & 0x0000_ffff) | CATEGORY_KEY_DERIVATION)
    }
}

impl fmt::Debug for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Algorithm({:#010x})", self.0)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Key type identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyType(pub u16);

impl KeyType {
    /// No type.
    pub const NONE: Self = Self(0);
    /// Opaque bytes.
    pub const RAW_DATA: Self = Self(0x1001);
    /// HMAC key.
    pub const HMAC: Self = Self(0x1100);
    /// Key-derivation secret.
    pub const DERIVE: Self = Self(0x1200);
    /// AES key.
    pub const AES: Self = Self(0x2400);
    /// ChaCha20 key.
    pub const CHACHA20: Self = Self(0x2004);
    /// Twisted Edwards curve family (Ed25519).
    pub const FAMILY_TWISTED_EDWARDS: u8 = 0x42;
    /// Montgomery curve family (X25519).
    pub const FAMILY_MONTGOMERY: u8 = 0x41;

    /// Elliptic-curve key pair of `family`.
    pub const fn ecc_key_pair(family: u8) -> Self {
        Self(0x7100 | family as u16)
    }

    /// Elliptic-curve public key of `family`.
    pub const fn ecc_public_key(family: u8) -> Self {
        Self(0x4100 | family as u16)
    }

    /// Asymmetric key pair.
    pub const fn is_key_pair(self) -> bool {
        self.0 & 0x7000 == 0x7000
    }

    /// Asymmetric public key.
    pub const fn is_public_key(self) -> bool {
        self.0 & 0x7000 == 0x4000
    }

    /// Public-key type matching a key-pair type; public types map to
    /// themselves.
    pub const fn public_of_pair(self) -> Self {
        if self.is_key_pair() { Self(self.0 & !0x3000) } else { self }
    }

    /// Curve family of an elliptic-curve type.
    pub const fn ecc_family(self) -> Option<u8> {
        if self.0 & 0xcf00 == 0x4100 { Some((self.0 & 0xff) as u8) } else { None }
    }
}

impl fmt::Debug for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyType({:#06x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_and_hkdf_encodings() {
        assert_eq!(Algorithm::hmac(Algorithm::SHA_256), Algorithm(0x0380_0009));
        assert_eq!(Algorithm::hkdf(Algorithm::SHA_256), Algorithm(0x0800_0109));
        assert!(Algorithm::hmac(Algorithm::SHA_512).is_hmac());
        assert_eq!(Algorithm::hmac(Algorithm::SHA_384).hash(), Some(Algorithm::SHA_384));
    }

    #[test]
    fn combined_agreement_splits() {
        let alg = Algorithm::key_agreement(Algorithm::ECDH, Algorithm::hkdf(Algorithm::SHA_256));
        assert_eq!(alg, Algorithm(0x0902_0109));
        assert!(alg.is_key_derivation());
        assert!(alg.is_combined_key_agreement());
        assert!(!alg.is_raw_key_agreement());
        assert_eq!(alg.agreement_base(), Algorithm::ECDH);
        assert_eq!(alg.derivation(), Algorithm::hkdf(Algorithm::SHA_256));
        assert!(Algorithm::ECDH.is_raw_key_agreement());
    }

    #[test]
    fn categories_are_disjoint() {
        assert!(Algorithm::GCM.is_aead());
        assert!(!Algorithm::GCM.is_cipher());
        assert!(Algorithm::STREAM_CIPHER.is_cipher());
        assert!(Algorithm::PURE_EDDSA.is_sign());
        assert!(Algorithm::SHA_224.is_hash());
        assert!(!Algorithm::SHA_224.is_hmac());
    }

    #[test]
    fn key_pair_maps_to_public() {
        let pair = KeyType::ecc_key_pair(KeyType::FAMILY_TWISTED_EDWARDS);
        assert_eq!(pair, KeyType(0x7142));
        assert!(pair.is_key_pair());
        assert_eq!(pair.public_of_pair(), KeyType(0x4142));
        assert!(pair.public_of_pair().is_public_key());
        assert_eq!(pair.ecc_family(), Some(KeyType::FAMILY_TWISTED_EDWARDS));
        assert_eq!(KeyType::AES.ecc_family(), None);
    }
}
