//! Secure-partition IPC runtime.
//!
//! Clients reach isolated services through connections. Every call carries
//! up to four caller-owned buffers that the service reads and writes through
//! the partition manager, never directly. Services run a cooperative loop:
//! wait on signals, take one message, handle it to completion, reply.
//!
//! ```text
//! client ──connect/call/close──► PartitionManager
//!                                 ├── HandleTable<Connection>   (connection)
//!                                 ├── HandleTable<PendingMessage>
//!                                 ├── AddressSpace per client   (memory)
//!                                 └── SignalDispatcher per partition (signal)
//! service ◄──wait/get/read/write/reply──┘
//! ```
//!
//! The runtime is sans-IO. Nothing here blocks or spawns; runtimes in the
//! server crate drive it, either on one thread or behind a tokio mutex.
//!
//! # Errors
//!
//! Expected conditions come back as [`SpmError::Status`]. Programmer errors
//! come back as [`SpmError::Fatal`] and have already been acted on: the
//! faulting connection is torn down, or the faulting partition terminated.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod handle;
pub mod memory;
pub mod message;
pub mod signal;
pub mod spm;
pub mod transport;

pub use connection::{ConnectionState, ServiceManifest, Sid, VersionPolicy};
pub use env::Environment;
pub use error::{Fault, SpmError};
pub use handle::{Handle, HandleError, HandleKind, HandleTable};
pub use memory::{Access, AddressSpace, RegionError};
pub use message::Message;
pub use signal::{SignalDispatcher, SignalError, Timeout};
pub use spm::{ClientId, PartitionId, PartitionManager, PartitionState, Reply};
pub use transport::{StagedCall, Transport};
