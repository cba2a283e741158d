//! Key references and key attributes.
//!
//! Key material never crosses the call boundary except through explicit
//! export. Clients name keys by [`KeyId`] and describe them with
//! [`KeyAttributes`], which travel as a fixed 20-byte [`KeyAttributesWire`].

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    little_endian::{U16, U32},
};

use crate::{Algorithm, ErrorCode, KeyType};

/// Opaque key reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub u32);

impl KeyId {
    /// Null key id.
    pub const NULL: Self = Self(0);
    /// First id a client may choose for a persistent key.
    pub const USER_MIN: u32 = 1;
    /// Last id a client may choose for a persistent key.
    pub const USER_MAX: u32 = 0x3fff_ffff;
    /// First id handed out for volatile keys.
    pub const VOLATILE_MIN: u32 = 0x7fff_0000;
    /// Last id handed out for volatile keys.
    pub const VOLATILE_MAX: u32 = 0x7fff_ffff;

    /// Whether the id lies in the client-chosen persistent range.
    pub const fn is_user(self) -> bool {
        self.0 >= Self::USER_MIN && self.0 <= Self::USER_MAX
    }

    /// Whether the id lies in the volatile range.
    pub const fn is_volatile(self) -> bool {
        self.0 >= Self::VOLATILE_MIN
    }
}

/// Persistence class of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize_repr, Deserialize_repr)]
#[repr(u32)]
pub enum KeyLifetime {
    /// Lives until destroyed or until the service restarts.
    #[default]
    Volatile = 0,
    /// Survives service restarts.
    Persistent = 1,
}

impl KeyLifetime {
    /// Decode a raw lifetime value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Volatile),
            1 => Some(Self::Persistent),
            _ => None,
        }
    }
}

bitflags! {
    /// Permitted uses of a key.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct KeyUsage: u32 {
        /// Key material may be exported.
        const EXPORT = 0x0000_0001;
        /// Key may be copied.
        const COPY = 0x0000_0002;
        /// Key may be cached outside protected storage.
        const CACHE = 0x0000_0004;
        /// Encryption.
        const ENCRYPT = 0x0000_0100;
        /// Decryption.
        const DECRYPT = 0x0000_0200;
        /// Message signing, including MAC generation.
        const SIGN_MESSAGE = 0x0000_0400;
        /// Message verification, including MAC verification.
        const VERIFY_MESSAGE = 0x0000_0800;
        /// Hash signing.
        const SIGN_HASH = 0x0000_1000;
        /// Hash verification.
        const VERIFY_HASH = 0x0000_2000;
        /// Key derivation and key agreement input.
        const DERIVE = 0x0000_4000;
        /// Verification of derived material.
        const VERIFY_DERIVATION = 0x0000_8000;
    }
}

/// Attributes describing a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyAttributes {
    /// Key type.
    pub key_type: KeyType,
    /// Size in bits. Zero lets the service infer it.
    pub bits: u16,
    /// Persistence class.
    pub lifetime: KeyLifetime,
    /// Permitted uses.
    pub usage: KeyUsage,
    /// Permitted algorithm.
    pub algorithm: Algorithm,
    /// Requested id for persistent keys, actual id when read back.
    pub id: KeyId,
}

impl KeyAttributes {
    /// Volatile attributes of the given type.
    pub fn new(key_type: KeyType) -> Self {
        Self { key_type, ..Self::default() }
    }

    /// Set the bit size.
    #[must_use]
    pub const fn with_bits(mut self, bits: u16) -> Self {
        self.bits = bits;
        self
    }

    /// Set the usage flags.
    #[must_use]
    pub const fn with_usage(mut self, usage: KeyUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Set the permitted algorithm.
    #[must_use]
    pub const fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Make the key persistent under `id`.
    #[must_use]
    pub const fn persistent(mut self, id: KeyId) -> Self {
        self.lifetime = KeyLifetime::Persistent;
        self.id = id;
        self
    }

    /// Encode to the wire layout.
    pub fn to_wire(&self) -> KeyAttributesWire {
        KeyAttributesWire {
            key_type: U16::new(self.key_type.0),
            bits: U16::new(self.bits),
            lifetime: U32::new(self.lifetime as u32),
            usage: U32::new(self.usage.bits()),
            algorithm: U32::new(self.algorithm.0),
            id: U32::new(self.id.0),
        }
    }

    /// Decode from raw bytes.
    ///
    /// Unknown usage bits are dropped. An unknown lifetime or a length other
    /// than [`KeyAttributesWire::SIZE`] is an invalid argument.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ErrorCode> {
        let wire =
            KeyAttributesWire::read_from_bytes(bytes).map_err(|_| ErrorCode::InvalidArgument)?;
        let lifetime =
            KeyLifetime::from_raw(wire.lifetime.get()).ok_or(ErrorCode::InvalidArgument)?;
        Ok(Self {
            key_type: KeyType(wire.key_type.get()),
            bits: wire.bits.get(),
            lifetime,
            usage: KeyUsage::from_bits_truncate(wire.usage.get()),
            algorithm: Algorithm(wire.algorithm.get()),
            id: KeyId(wire.id.get()),
        })
    }

    /// Encode to raw bytes.
    pub fn to_bytes(&self) -> [u8; KeyAttributesWire::SIZE] {
        let mut out = [0u8; KeyAttributesWire::SIZE];
        out.copy_from_slice(self.to_wire().as_bytes());
        out
    }
}

/// Byte-stable encoding of [`KeyAttributes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct KeyAttributesWire {
    /// Key type.
    pub key_type: U16,
    /// Size in bits.
    pub bits: U16,
    /// Lifetime.
    pub lifetime: U32,
    /// Usage flags.
    pub usage: U32,
    /// Permitted algorithm.
    pub algorithm: U32,
    /// Key id.
    pub id: U32,
}

impl KeyAttributesWire {
    /// Encoded size in bytes.
    pub const SIZE: usize = 20;
}
