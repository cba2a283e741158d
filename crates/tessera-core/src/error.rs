//! Partition manager errors.
//!
//! Two classes of failure leave the manager:
//!
//! - Status: an expected condition that is reported back to the caller as a
//!   negative status code (refused connection, busy service, empty queue).
//! - Fault: a programmer error. A client fault tears down the offending
//!   connection; a partition fault terminates that partition. Neither
//!   affects unrelated clients or partitions.

use tessera_proto::ErrorCode;
use thiserror::Error;

use crate::{handle::HandleError, memory::RegionError, signal::SignalError};

/// Programmer error detected by the partition manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    /// Handle is null, forged, stale, or of the wrong kind.
    #[error("invalid handle: {0}")]
    InvalidHandle(#[from] HandleError),

    /// Handle belongs to another client or partition.
    #[error("handle is owned by another caller")]
    NotOwner,

    /// Client call type must be non-negative.
    #[error("invalid message type {0}")]
    InvalidMessageType(i32),

    /// More vectors than the framework allows.
    #[error("too many vectors: {inputs} in, {outputs} out")]
    TooManyVectors {
        /// Input vector count.
        inputs: usize,
        /// Output vector count.
        outputs: usize,
    },

    /// A buffer failed validation.
    #[error("bad region: {0}")]
    BadRegion(#[from] RegionError),

    /// A call was issued while another was outstanding on the connection.
    #[error("connection already has a call in flight")]
    ConcurrentCall,

    /// `close` on a connection whose message has not been replied to.
    #[error("connection closed with a message in flight")]
    CloseInFlight,

    /// Signal contract violated by a partition.
    #[error("signal misuse: {0}")]
    Signal(#[from] SignalError),

    /// `write` past the end of an output vector.
    #[error("write of {requested} bytes overflows output {index} ({available} left)")]
    WriteOverflow {
        /// Output vector index.
        index: usize,
        /// Bytes the service tried to write.
        requested: usize,
        /// Bytes remaining in the vector.
        available: usize,
    },

    /// Vector index outside the message.
    #[error("vector index {0} out of range")]
    InvalidVectorIndex(usize),

    /// Reply status not allowed for this message type.
    #[error("reply status {0} not allowed")]
    InvalidReplyStatus(i32),

    /// Caller is not a registered client.
    #[error("unknown client")]
    UnknownClient,

    /// Caller is not a registered partition.
    #[error("unknown partition")]
    UnknownPartition,

    /// Partition has been terminated.
    #[error("partition terminated")]
    PartitionTerminated,

    /// Service rejected the call as a programmer error.
    #[error("service rejected the call")]
    ServiceRejected,
}

/// Error returned by partition manager operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpmError {
    /// Expected failure, reported as a status code.
    #[error("status {0}")]
    Status(#[from] ErrorCode),

    /// Programmer error. The connection or partition involved is gone.
    #[error("fault: {0}")]
    Fatal(#[from] Fault),

    /// Blocking wait with nothing asserted. The driver must run other work
    /// and retry.
    #[error("operation would block")]
    Blocked,
}

impl SpmError {
    /// Whether this error is a programmer fault.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Status code a client sees for this error. Faults map to
    /// `PROGRAMMER_ERROR`.
    pub fn status(&self) -> ErrorCode {
        match self {
            Self::Status(code) => *code,
            Self::Fatal(_) => ErrorCode::ProgrammerError,
            Self::Blocked => ErrorCode::BadState,
        }
    }
}

impl From<HandleError> for SpmError {
    fn from(err: HandleError) -> Self {
        Self::Fatal(Fault::InvalidHandle(err))
    }
}

impl From<RegionError> for SpmError {
    fn from(err: RegionError) -> Self {
        Self::Fatal(Fault::BadRegion(err))
    }
}

impl From<SignalError> for SpmError {
    fn from(err: SignalError) -> Self {
        Self::Fatal(Fault::Signal(err))
    }
}
