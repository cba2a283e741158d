//! Operations for model-based testing.
//!
//! Operations are generated by proptest through `Arbitrary` and applied to
//! both the model and the real service. Indices are taken modulo the
//! world's sizes, so every generated value is meaningful.

use arbitrary::Arbitrary;
use tessera_proto::{ErrorCode, KeyId};

/// Client index, reduced modulo the number of clients.
pub type ClientIndex = u8;

/// Hash operation slot of a client, reduced modulo the slot count.
pub type SlotIndex = u8;

/// Reference to a key id issued earlier in the run.
///
/// Resolves against every id the service ever handed out, destroyed ones
/// included, so stale and foreign references come up naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct KeyRef(pub u8);

/// Usage requested for an imported key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct SmallUsage(pub u8);

impl SmallUsage {
    /// Key may compute MACs.
    pub fn sign(self) -> bool {
        self.0 & 0b01 != 0
    }

    /// Key may be exported.
    pub fn export(self) -> bool {
        self.0 & 0b10 != 0
    }
}

/// Compact message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct SmallData {
    /// First byte; later bytes count up from it.
    pub seed: u8,
    /// 0-3 maps to empty/small/medium/large.
    pub size_class: u8,
}

impl SmallData {
    /// Expand to bytes.
    pub fn to_bytes(self) -> Vec<u8> {
        let len: u8 = match self.size_class % 4 {
            0 => 0,
            1 => 8,
            2 => 64,
            _ => 200,
        };
        (0..len).map(|i| self.seed.wrapping_add(i)).collect()
    }
}

/// Actions a client can take against the crypto service.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Open a connection.
    Connect {
        /// Acting client.
        client: ClientIndex,
    },

    /// Close the connection, ending its operations.
    Close {
        /// Acting client.
        client: ClientIndex,
    },

    /// Import a 32-byte HMAC-SHA-256 key.
    ImportKey {
        /// Acting client.
        client: ClientIndex,
        /// Requested usage.
        usage: SmallUsage,
        /// Key material is this byte repeated.
        material: u8,
        /// Persistent id (`p % 4 + 1`), or volatile when absent.
        persistent: Option<u8>,
    },

    /// Destroy a key.
    DestroyKey {
        /// Acting client.
        client: ClientIndex,
        /// Key to destroy.
        key: KeyRef,
    },

    /// One-shot MAC under a key.
    MacCompute {
        /// Acting client.
        client: ClientIndex,
        /// Key to use.
        key: KeyRef,
        /// Message.
        data: SmallData,
    },

    /// Export key material.
    ExportKey {
        /// Acting client.
        client: ClientIndex,
        /// Key to export.
        key: KeyRef,
    },

    /// Start a SHA-256 hash in a slot.
    HashSetup {
        /// Acting client.
        client: ClientIndex,
        /// Operation slot.
        slot: SlotIndex,
    },

    /// Feed a hash.
    HashUpdate {
        /// Acting client.
        client: ClientIndex,
        /// Operation slot.
        slot: SlotIndex,
        /// Input.
        data: SmallData,
    },

    /// Finish a hash.
    HashFinish {
        /// Acting client.
        client: ClientIndex,
        /// Operation slot.
        slot: SlotIndex,
    },

    /// Abort a hash.
    HashAbort {
        /// Acting client.
        client: ClientIndex,
        /// Operation slot.
        slot: SlotIndex,
    },
}

impl Operation {
    /// Client performing the operation.
    pub fn client(&self) -> ClientIndex {
        match *self {
            Self::Connect { client }
            | Self::Close { client }
            | Self::ImportKey { client, .. }
            | Self::DestroyKey { client, .. }
            | Self::MacCompute { client, .. }
            | Self::ExportKey { client, .. }
            | Self::HashSetup { client, .. }
            | Self::HashUpdate { client, .. }
            | Self::HashFinish { client, .. }
            | Self::HashAbort { client, .. } => client,
        }
    }
}

/// Result of applying an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation succeeded.
    Ok,

    /// Operation succeeded and returned data the model can predict.
    Data(Vec<u8>),

    /// Operation failed with a status.
    Error(ErrorCode),

    /// Operation does not apply: the client is not connected, or connects
    /// while connected.
    Skipped,
}

impl OperationResult {
    /// Check if operation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok | Self::Data(_))
    }
}

/// Key id a [`KeyRef`] names given the ids issued so far.
///
/// Before any id is issued, refers to the first volatile id, which nothing
/// holds yet.
pub fn resolve_key(key: KeyRef, issued: &[KeyId]) -> KeyId {
    if issued.is_empty() {
        return KeyId(KeyId::VOLATILE_MIN);
    }
    issued[usize::from(key.0) % issued.len()]
}
