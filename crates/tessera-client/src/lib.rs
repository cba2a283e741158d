//! Client
//!
//! Typed calls into the tessera crypto service. Each operation builds a
//! [`Request`](tessera_proto::Request), prepends its descriptor to the input
//! vectors and issues one call over a [`Transport`]. Multi-part operations
//! keep only a service-side handle, carried in an operation object that the
//! service rewrites on every step.
//!
//! # Components
//!
//! - [`CryptoClient`]: connection plus one method per crypto operation
//! - [`HashOperation`], [`MacOperation`], [`CipherOperation`],
//!   [`AeadOperation`], [`KeyDerivationOperation`]: multi-part handles
//! - [`ClientError`]: service statuses and fatal connection faults

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod aead;
mod asym;
mod cipher;
mod client;
mod error;
mod hash;
mod kdf;
mod key;
mod mac;
mod operation;

pub use client::{CALL_TYPE, CryptoClient};
pub use error::{ClientError, Result};
pub use operation::{AeadOperation, CipherOperation, HashOperation, KeyDerivationOperation, MacOperation};
pub use tessera_core::Transport;

/// Largest digest any supported hash produces.
pub const MAX_HASH_LENGTH: usize = 64;

/// Largest MAC any supported algorithm produces.
pub const MAX_MAC_LENGTH: usize = 64;

/// IV length of the supported stream cipher.
pub const IV_LENGTH: usize = 12;

/// AEAD nonce length.
pub const NONCE_LENGTH: usize = 12;

/// AEAD tag length.
pub const TAG_LENGTH: usize = 16;

/// Signature length.
pub const SIGNATURE_LENGTH: usize = 64;

/// Largest key material the service exports.
pub const MAX_EXPORT_LENGTH: usize = 1024;

/// Largest public key the service exports.
pub const MAX_PUBLIC_KEY_LENGTH: usize = 64;

/// Largest raw shared secret.
pub const MAX_SHARED_SECRET_LENGTH: usize = 64;
