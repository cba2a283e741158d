//! Client error types.

use tessera_core::{Fault, SpmError};
use tessera_proto::{ErrorCode, Status};
use thiserror::Error;

/// Errors from crypto client operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The service, or the partition manager, reported a status.
    #[error("{0}")]
    Status(ErrorCode),

    /// The call violated the IPC contract. The connection is gone.
    #[error("fatal: {0}")]
    Fatal(Fault),
}

impl ClientError {
    /// Whether the connection was torn down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Status code for this error. Fatal errors are `PROGRAMMER_ERROR`.
    pub fn status(&self) -> ErrorCode {
        match self {
            Self::Status(code) => *code,
            Self::Fatal(_) => ErrorCode::ProgrammerError,
        }
    }

    pub(crate) fn from_status(status: Status) -> Self {
        Self::Status(ErrorCode::from_code(status).unwrap_or(ErrorCode::GenericError))
    }
}

impl From<ErrorCode> for ClientError {
    fn from(code: ErrorCode) -> Self {
        Self::Status(code)
    }
}

impl From<SpmError> for ClientError {
    fn from(err: SpmError) -> Self {
        match err {
            SpmError::Fatal(fault) => Self::Fatal(fault),
            other => Self::Status(other.status()),
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
