//! Per-family request handlers.
//!
//! Single-part handlers return `()` and write their outputs. Multi-part
//! steps return the operation handle to report in `out[0]`: the live handle
//! after a setup or intermediate step, zero after a terminal one. Writing
//! the handle and cleaning up after a failed step is left to the
//! dispatcher.

pub(crate) mod aead;
pub(crate) mod asym;
pub(crate) mod cipher;
pub(crate) mod hash;
pub(crate) mod kdf;
pub(crate) mod key;
pub(crate) mod mac;
pub(crate) mod random;

use tessera_core::{ClientId, Environment};
use tessera_proto::{Algorithm, KeyId, KeyUsage, OpHandle};

use crate::{
    context::OperationContextStore,
    error::ServiceError,
    io::Io,
    key_store::{KeyStore, ResolvedKey},
};

/// Everything a handler may touch while serving one call.
pub(crate) struct Call<'a, E> {
    pub io: Io<'a>,
    pub keys: &'a mut KeyStore,
    pub contexts: &'a mut OperationContextStore,
    pub env: &'a E,
    pub client: ClientId,
    /// Reverse handle of the calling connection; owns its contexts.
    pub token: u64,
    /// Bytes a multi-part AEAD may buffer.
    pub aead_buffer: usize,
}

/// Result of a multi-part step: the handle to report.
pub(crate) type Step = Result<OpHandle, ServiceError>;

impl<E: Environment> Call<'_, E> {
    /// Resolve `key` for `usage` under `alg`.
    pub fn key(&mut self, key: KeyId, usage: KeyUsage, alg: Algorithm) -> Result<ResolvedKey, ServiceError> {
        Ok(self.keys.use_key(self.client, key, usage, alg)?)
    }
}
