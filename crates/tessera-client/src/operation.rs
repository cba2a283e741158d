//! Client-side handles of multi-part operations.
//!
//! An operation object only carries the service-side handle. It starts out
//! inactive (handle zero); a successful setup makes it active, a terminal
//! step, an abort or any failing step makes it inactive again. The service
//! decides: the handle is whatever it last wrote back.

use tessera_proto::OpHandle;

macro_rules! operation {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub(crate) handle: OpHandle,
        }

        impl $name {
            /// Inactive operation.
            pub const fn new() -> Self {
                Self { handle: 0 }
            }

            /// Service-side handle; zero when inactive.
            pub const fn handle(&self) -> OpHandle {
                self.handle
            }

            /// Whether a setup succeeded and nothing has ended it since.
            pub const fn is_active(&self) -> bool {
                self.handle != 0
            }
        }
    };
}

operation! {
    /// Multi-part hash.
    HashOperation
}

operation! {
    /// Multi-part MAC.
    MacOperation
}

operation! {
    /// Multi-part unauthenticated cipher.
    CipherOperation
}

operation! {
    /// Multi-part key derivation.
    KeyDerivationOperation
}

/// Multi-part AEAD.
///
/// Besides the handle it counts the message bytes fed so far, which sizes
/// the buffer for the data released at finish or verify.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AeadOperation {
    pub(crate) handle: OpHandle,
    pub(crate) pending: usize,
}

impl AeadOperation {
    /// Inactive operation.
    pub const fn new() -> Self {
        Self { handle: 0, pending: 0 }
    }

    /// Service-side handle; zero when inactive.
    pub const fn handle(&self) -> OpHandle {
        self.handle
    }

    /// Whether a setup succeeded and nothing has ended it since.
    pub const fn is_active(&self) -> bool {
        self.handle != 0
    }
}
