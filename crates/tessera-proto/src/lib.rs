//! Wire contract between crypto clients and the tessera crypto partition.
//!
//! Every call into the crypto service carries the same first input vector: a
//! fixed 64-byte [`RequestDescriptor`]. Its `srv_id` selects the operation
//! and is authoritative for dispatch, independent of the IPC-level message
//! type. The remaining input and output vectors carry variable-length data
//! whose meaning depends on the operation.
//!
//! ```text
//! in[0]  RequestDescriptor (64 bytes, little-endian)
//! in[1..] operation inputs (data, attributes, tags, peer keys)
//! out[..] operation outputs (handle, digests, ciphertext, key ids)
//! ```
//!
//! # Layout stability
//!
//! The descriptor and key-attribute layouts are part of the contract. Both
//! are `zerocopy` structs with explicit little-endian fields, so client and
//! service agree byte for byte regardless of host endianness.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod algorithm;
pub mod attributes;
pub mod descriptor;
pub mod ipc;
pub mod request;
pub mod service;
pub mod status;

pub use algorithm::{Algorithm, KeyType};
pub use attributes::{KeyAttributes, KeyAttributesWire, KeyId, KeyLifetime, KeyUsage};
pub use descriptor::{DESCRIPTOR_SIZE, MAX_NONCE_LENGTH, Nonce, RequestDescriptor};
pub use ipc::{
    CONNECT, DISCONNECT, FRAMEWORK_VERSION, MAX_IOVEC, Region, Signals, VERSION_NONE,
};
pub use request::{DecodeError, DerivationStep, OpHandle, Request};
pub use service::{ServiceGroup, ServiceId};
pub use status::{ErrorCode, SUCCESS, Status, result_to_status, status_to_result};
