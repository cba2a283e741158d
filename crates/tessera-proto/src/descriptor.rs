//! Fixed-layout request descriptor.
//!
//! The descriptor is the first input vector of every call. It carries the
//! operation selector and all scalar arguments, including an embedded nonce
//! buffer for one-shot AEAD calls.
//!
//! ```text
//! offset  size  field
//! 0       2     srv_id
//! 2       2     step
//! 4       4     key_id
//! 8       4     alg
//! 12      4     op_handle
//! 16      4     target_handle
//! 20      4     nonce_length
//! 24      8     capacity
//! 32      8     ad_length
//! 40      8     plaintext_length
//! 48      16    nonce
//! ```

use std::fmt;

use zerocopy::{
    FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned,
    little_endian::{U16, U32, U64},
};

/// Size of the encoded descriptor.
pub const DESCRIPTOR_SIZE: usize = 64;

/// Capacity of the embedded nonce buffer.
pub const MAX_NONCE_LENGTH: usize = 16;

/// Request descriptor in its wire layout.
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct RequestDescriptor {
    /// Operation selector.
    pub srv_id: U16,
    /// Key-derivation step.
    pub step: U16,
    /// Key reference.
    pub key_id: U32,
    /// Algorithm identifier.
    pub alg: U32,
    /// Operation handle, zero when none.
    pub op_handle: U32,
    /// Target handle for clone, must be zero.
    pub target_handle: U32,
    /// Number of valid bytes in `nonce`.
    pub nonce_length: U32,
    /// Key-derivation capacity.
    pub capacity: U64,
    /// Declared AEAD associated-data length.
    pub ad_length: U64,
    /// Declared AEAD payload length.
    pub plaintext_length: U64,
    /// Embedded AEAD nonce.
    pub nonce: [u8; MAX_NONCE_LENGTH],
}

impl RequestDescriptor {
    /// Zeroed descriptor for `srv_id`.
    pub fn new(srv_id: u16) -> Self {
        let mut desc = Self::new_zeroed();
        desc.srv_id = U16::new(srv_id);
        desc
    }

    /// Parse from exactly [`DESCRIPTOR_SIZE`] bytes.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        Self::read_from_bytes(bytes).ok()
    }

    /// Encode to bytes.
    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut out = [0u8; DESCRIPTOR_SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("srv_id", &format_args!("{:#06x}", self.srv_id.get()))
            .field("step", &self.step.get())
            .field("key_id", &self.key_id.get())
            .field("alg", &format_args!("{:#010x}", self.alg.get()))
            .field("op_handle", &format_args!("{:#010x}", self.op_handle.get()))
            .field("target_handle", &self.target_handle.get())
            .field("nonce_length", &self.nonce_length.get())
            .field("capacity", &self.capacity.get())
            .field("ad_length", &self.ad_length.get())
            .field("plaintext_length", &self.plaintext_length.get())
            .finish_non_exhaustive()
    }
}

/// Bounded nonce carried inside the descriptor.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Nonce {
    bytes: [u8; MAX_NONCE_LENGTH],
    len: u8,
}

impl Nonce {
    /// Copy `bytes` into a nonce. Returns `None` when longer than
    /// [`MAX_NONCE_LENGTH`].
    pub fn new(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > MAX_NONCE_LENGTH {
            return None;
        }
        let mut nonce = Self::default();
        nonce.bytes[..bytes.len()].copy_from_slice(bytes);
        nonce.len = bytes.len() as u8;
        Some(nonce)
    }

    /// Valid nonce bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Whether the nonce is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn raw(&self) -> [u8; MAX_NONCE_LENGTH] {
        self.bytes
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce(<{} bytes>)", self.len)
    }
}
