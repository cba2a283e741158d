//! Status codes returned across the call boundary.
//!
//! The status space is a signed 32-bit integer. Zero and positive values mean
//! success; negative values enumerate the error kinds below. The numbering
//! matches the PSA Certified status encoding so that foreign clients can
//! interpret replies without translation.

use thiserror::Error;

/// Raw status value as carried in a reply.
pub type Status = i32;

/// Canonical success status.
pub const SUCCESS: Status = 0;

/// Error kinds carried in a negative status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[repr(i32)]
pub enum ErrorCode {
    /// Caller violated the IPC contract. Fatal for the caller.
    #[error("programmer error")]
    ProgrammerError = -129,
    /// Service refused the connection (policy or version mismatch).
    #[error("connection refused")]
    ConnectionRefused = -130,
    /// Service cannot accept more connections right now.
    #[error("connection busy")]
    ConnectionBusy = -131,
    /// Unspecified failure.
    #[error("generic error")]
    GenericError = -132,
    /// Key policy forbids the requested use.
    #[error("not permitted")]
    NotPermitted = -133,
    /// Operation or algorithm is not supported.
    #[error("not supported")]
    NotSupported = -134,
    /// Malformed argument.
    #[error("invalid argument")]
    InvalidArgument = -135,
    /// Key identifier does not name a key the caller may use.
    #[error("invalid handle")]
    InvalidHandle = -136,
    /// Operation is not in a state that allows the request.
    #[error("bad state")]
    BadState = -137,
    /// Output buffer is too small for the result.
    #[error("buffer too small")]
    BufferTooSmall = -138,
    /// Target already exists.
    #[error("already exists")]
    AlreadyExists = -139,
    /// Target does not exist.
    #[error("does not exist")]
    DoesNotExist = -140,
    /// Out of memory or out of table slots.
    #[error("insufficient memory")]
    InsufficientMemory = -141,
    /// Out of persistent storage.
    #[error("insufficient storage")]
    InsufficientStorage = -142,
    /// Not enough data left (derivation capacity exhausted).
    #[error("insufficient data")]
    InsufficientData = -143,
    /// Service failed internally.
    #[error("service failure")]
    ServiceFailure = -144,
    /// Communication with the service failed.
    #[error("communication failure")]
    CommunicationFailure = -145,
    /// Persistent storage failed.
    #[error("storage failure")]
    StorageFailure = -146,
    /// Hardware failure.
    #[error("hardware failure")]
    HardwareFailure = -147,
    /// Entropy source exhausted.
    #[error("insufficient entropy")]
    InsufficientEntropy = -148,
    /// Signature, MAC or authentication tag did not verify.
    #[error("invalid signature")]
    InvalidSignature = -149,
    /// Padding check failed.
    #[error("invalid padding")]
    InvalidPadding = -150,
    /// Internal corruption detected.
    #[error("corruption detected")]
    CorruptionDetected = -151,
    /// Stored data is corrupt.
    #[error("data corrupt")]
    DataCorrupt = -152,
    /// Stored data is invalid.
    #[error("data invalid")]
    DataInvalid = -153,
}

impl ErrorCode {
    const ALL: [Self; 25] = [
        Self::ProgrammerError,
        Self::ConnectionRefused,
        Self::ConnectionBusy,
        Self::GenericError,
        Self::NotPermitted,
        Self::NotSupported,
        Self::InvalidArgument,
        Self::InvalidHandle,
        Self::BadState,
        Self::BufferTooSmall,
        Self::AlreadyExists,
        Self::DoesNotExist,
        Self::InsufficientMemory,
        Self::InsufficientStorage,
        Self::InsufficientData,
        Self::ServiceFailure,
        Self::CommunicationFailure,
        Self::StorageFailure,
        Self::HardwareFailure,
        Self::InsufficientEntropy,
        Self::InvalidSignature,
        Self::InvalidPadding,
        Self::CorruptionDetected,
        Self::DataCorrupt,
        Self::DataInvalid,
    ];

    /// Raw status value.
    pub const fn code(self) -> Status {
        self as Status
    }

    /// Look up the error kind for a raw negative status.
    ///
    /// Returns `None` for success values and for negative values outside the
    /// defined range.
    pub fn from_code(code: Status) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.code() == code)
    }

    /// Whether a client may reasonably retry after this error.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::ConnectionBusy | Self::InsufficientMemory | Self::InsufficientEntropy)
    }
}

/// Interpret a raw reply status.
///
/// Unknown negative values collapse to [`ErrorCode::GenericError`].
pub fn status_to_result(status: Status) -> Result<(), ErrorCode> {
    if status >= SUCCESS {
        Ok(())
    } else {
        Err(ErrorCode::from_code(status).unwrap_or(ErrorCode::GenericError))
    }
}

/// Collapse a result into the raw status carried in a reply.
pub fn result_to_status(result: Result<(), ErrorCode>) -> Status {
    match result {
        Ok(()) => SUCCESS,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_contiguous() {
        for (i, e) in ErrorCode::ALL.iter().enumerate() {
            assert_eq!(e.code(), -129 - i as i32);
        }
    }

    #[test]
    fn positive_status_is_success() {
        assert_eq!(status_to_result(0), Ok(()));
        assert_eq!(status_to_result(7), Ok(()));
    }

    #[test]
    fn unknown_negative_is_generic() {
        assert_eq!(status_to_result(-1), Err(ErrorCode::GenericError));
        assert_eq!(status_to_result(-200), Err(ErrorCode::GenericError));
    }

    #[test]
    fn known_codes_map_back() {
        assert_eq!(status_to_result(-137), Err(ErrorCode::BadState));
        assert_eq!(result_to_status(Err(ErrorCode::InvalidSignature)), -149);
        assert_eq!(result_to_status(Ok(())), SUCCESS);
    }
}
