//! Tessera Cryptographic Provider
//!
//! The algorithms behind the crypto partition. The service resolves key
//! references, enforces policy and owns operation contexts; this crate only
//! sees key material, algorithm identifiers and data.
//!
//! # Design
//!
//! Every routine is pure: no I/O, no global state, no hidden randomness.
//! Where fresh bytes are needed (IV and nonce generation, key generation)
//! the caller passes a fill closure, so the partition draws from its
//! `Environment` and simulations stay deterministic.
//!
//! Multi-part operations are plain owned state machines ([`HashEngine`],
//! [`MacEngine`], [`CipherEngine`], [`AeadEngine`], [`KeyDerivation`]).
//! They enforce step ordering themselves and report violations as
//! [`CryptoError::BadState`].
//!
//! # Supported algorithms
//!
//! - SHA-224, SHA-256, SHA-384, SHA-512 and HMAC over each
//! - ChaCha20 stream cipher
//! - AES-GCM (128/256) and ChaCha20-Poly1305
//! - Ed25519 (pure EdDSA)
//! - X25519, raw or feeding HKDF
//! - HKDF over the SHA-2 family
//!
//! Secrets are held in [`zeroize::Zeroizing`] buffers and digests, MACs and
//! tags are compared in constant time.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod agreement;
pub mod cipher;
pub mod error;
pub mod hash;
pub mod kdf;
pub mod keys;
pub mod mac;
pub mod sign;

pub use aead::AeadEngine;
pub use cipher::{CipherEngine, Direction};
pub use error::{CryptoError, Result};
pub use hash::{HashEngine, MAX_HASH_SIZE, hash_length};
pub use kdf::KeyDerivation;
pub use mac::{MacEngine, mac_length};
