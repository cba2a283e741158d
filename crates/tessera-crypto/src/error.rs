//! Provider errors.

use tessera_proto::ErrorCode;
use thiserror::Error;

/// Failure reported by a cryptographic routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Algorithm or key type not implemented by this provider.
    #[error("algorithm not supported")]
    NotSupported,

    /// Malformed input: wrong key size, nonce length, key/algorithm mismatch.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Step not allowed in the current state of a multi-part operation.
    #[error("bad state: {0}")]
    BadState(&'static str),

    /// Authentication tag, MAC, hash or signature did not verify.
    #[error("verification failed")]
    InvalidSignature,

    /// Derivation capacity exhausted.
    #[error("insufficient data")]
    InsufficientData,

    /// Buffered state would grow past its limit.
    #[error("buffer limit of {0} bytes reached")]
    InsufficientMemory(usize),
}

impl From<CryptoError> for ErrorCode {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::NotSupported => Self::NotSupported,
            CryptoError::InvalidArgument(_) => Self::InvalidArgument,
            CryptoError::BadState(_) => Self::BadState,
            CryptoError::InvalidSignature => Self::InvalidSignature,
            CryptoError::InsufficientData => Self::InsufficientData,
            CryptoError::InsufficientMemory(_) => Self::InsufficientMemory,
        }
    }
}

/// Result alias for provider routines.
pub type Result<T> = std::result::Result<T, CryptoError>;
