//! Server error types.

use tessera_core::SpmError;
use tessera_crypto::CryptoError;
use tessera_proto::{DecodeError, ErrorCode};
use thiserror::Error;

use crate::key_store::StorageError;

/// Outcome of handling one crypto request.
///
/// `Status` is replied to the caller. `Runtime` means the partition manager
/// rejected something the partition did; it is not replied and ends the
/// service loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Status to reply.
    #[error("{0}")]
    Status(#[from] ErrorCode),

    /// Partition manager error.
    #[error("partition manager: {0}")]
    Runtime(#[from] SpmError),
}

impl ServiceError {
    /// Status code, if this error is replied to the caller.
    pub fn status(&self) -> Option<ErrorCode> {
        match self {
            Self::Status(code) => Some(*code),
            Self::Runtime(_) => None,
        }
    }
}

impl From<CryptoError> for ServiceError {
    fn from(err: CryptoError) -> Self {
        Self::Status(err.into())
    }
}

impl From<DecodeError> for ServiceError {
    fn from(err: DecodeError) -> Self {
        Self::Status(err.into())
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        Self::Status(err.into())
    }
}

/// Errors surfaced by runtimes and the server binary.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Partition manager error.
    #[error("partition manager error: {0}")]
    Spm(#[from] SpmError),

    /// Key storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A runtime task failed.
    #[error("task error: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
