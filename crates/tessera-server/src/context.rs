//! Operation Context Store.
//!
//! Multi-part operations keep their engine state here between calls. Each
//! context is addressed by a generational handle from a [`HandleTable`] and
//! tagged with the reverse handle of the connection that created it, so one
//! connection can never reach another's contexts and a disconnect can
//! release everything the connection left behind.
//!
//! Every lookup failure (null, stale, foreign, or the wrong kind) is
//! `BAD_STATE`.

use tessera_core::{Handle, HandleError, HandleKind, HandleTable};
use tessera_crypto::{AeadEngine, CipherEngine, HashEngine, KeyDerivation, MacEngine};
use tessera_proto::{ErrorCode, OpHandle};

/// Family of a multi-part operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Hash.
    Hash,
    /// MAC sign or verify.
    Mac,
    /// Unauthenticated cipher.
    Cipher,
    /// AEAD.
    Aead,
    /// Key derivation.
    Derivation,
}

/// Engine state of a live operation.
#[derive(Debug)]
pub enum OperationState {
    /// Hash in progress.
    Hash(HashEngine),
    /// MAC in progress; `verify` selects the finishing step.
    Mac {
        /// MAC engine.
        engine: MacEngine,
        /// Set up for verification.
        verify: bool,
    },
    /// Cipher in progress.
    Cipher(CipherEngine),
    /// AEAD in progress.
    Aead(AeadEngine),
    /// Derivation in progress.
    Derivation(KeyDerivation),
}

impl OperationState {
    /// Family of this state.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Hash(_) => OperationKind::Hash,
            Self::Mac { .. } => OperationKind::Mac,
            Self::Cipher(_) => OperationKind::Cipher,
            Self::Aead(_) => OperationKind::Aead,
            Self::Derivation(_) => OperationKind::Derivation,
        }
    }
}

#[derive(Debug)]
struct Entry {
    owner: u64,
    state: OperationState,
}

/// Live multi-part operations of one partition.
#[derive(Debug)]
pub struct OperationContextStore {
    table: HandleTable<Entry>,
}

impl OperationContextStore {
    /// Store holding at most `capacity` contexts.
    pub fn new(capacity: usize) -> Self {
        Self { table: HandleTable::new(HandleKind::Operation, capacity) }
    }

    /// Live contexts.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no context is live.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Live contexts owned by `owner`.
    pub fn owned_by(&self, owner: u64) -> usize {
        self.table.iter().filter(|(_, e)| e.owner == owner).count()
    }

    /// Whether `op` is a live context of `owner`.
    pub fn is_live(&self, owner: u64, op: OpHandle) -> bool {
        self.table.get(Handle::from_raw(op)).is_ok_and(|e| e.owner == owner)
    }

    /// Store `state` and return its handle.
    pub fn create(&mut self, owner: u64, state: OperationState) -> Result<OpHandle, ErrorCode> {
        let kind = state.kind();
        match self.table.allocate(Entry { owner, state }) {
            Ok(handle) => {
                tracing::debug!(op = %handle, ?kind, "operation created");
                Ok(handle.raw())
            },
            Err(HandleError::Exhausted(_)) => Err(ErrorCode::InsufficientMemory),
            Err(_) => Err(ErrorCode::GenericError),
        }
    }

    /// Borrow the live context `op` of `kind`.
    pub fn get_mut(&mut self, owner: u64, op: OpHandle, kind: OperationKind) -> Result<&mut OperationState, ErrorCode> {
        match self.table.get_mut(Handle::from_raw(op)) {
            Ok(e) if e.owner == owner && e.state.kind() == kind => Ok(&mut e.state),
            _ => Err(ErrorCode::BadState),
        }
    }

    /// Remove the live context `op` of `kind`, ending it.
    pub fn take(&mut self, owner: u64, op: OpHandle, kind: OperationKind) -> Result<OperationState, ErrorCode> {
        self.get_mut(owner, op, kind)?;
        self.table.release(Handle::from_raw(op)).map(|e| e.state).map_err(|_| ErrorCode::BadState)
    }

    /// Destroy `op` if it is a live context of `owner` and `kind`. Anything
    /// else is left alone. Returns whether a context was destroyed.
    pub fn abort(&mut self, owner: u64, op: OpHandle, kind: OperationKind) -> bool {
        let destroyed = self.take(owner, op, kind).is_ok();
        if destroyed {
            tracing::debug!(op, ?kind, "operation aborted");
        }
        destroyed
    }

    /// Destroy every context of `owner`. Returns how many were live.
    pub fn abort_owner(&mut self, owner: u64) -> usize {
        let handles = self.table.handles_where(|e| e.owner == owner);
        for handle in &handles {
            let _ = self.table.release(*handle);
        }
        handles.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tessera_proto::Algorithm;

    use super::*;

    fn hash() -> OperationState {
        OperationState::Hash(HashEngine::new(Algorithm::SHA_256).unwrap())
    }

    #[test]
    fn lookup_checks_owner_and_kind() {
        let mut store = OperationContextStore::new(4);
        let op = store.create(7, hash()).unwrap();
        assert!(store.get_mut(7, op, OperationKind::Hash).is_ok());
        assert_eq!(store.get_mut(8, op, OperationKind::Hash).unwrap_err(), ErrorCode::BadState);
        assert_eq!(store.get_mut(7, op, OperationKind::Mac).unwrap_err(), ErrorCode::BadState);
        assert_eq!(store.get_mut(7, 0, OperationKind::Hash).unwrap_err(), ErrorCode::BadState);
    }

    #[test]
    fn take_ends_the_context() {
        let mut store = OperationContextStore::new(4);
        let op = store.create(7, hash()).unwrap();
        assert!(store.take(7, op, OperationKind::Hash).is_ok());
        assert!(!store.is_live(7, op));
        assert_eq!(store.take(7, op, OperationKind::Hash).unwrap_err(), ErrorCode::BadState);
    }

    #[test]
    fn abort_ignores_foreign_and_unknown_handles() {
        let mut store = OperationContextStore::new(4);
        let op = store.create(7, hash()).unwrap();
        assert!(!store.abort(8, op, OperationKind::Hash));
        assert!(!store.abort(7, 0, OperationKind::Hash));
        assert!(store.is_live(7, op));
        assert!(store.abort(7, op, OperationKind::Hash));
        assert!(store.is_empty());
    }

    #[test]
    fn abort_owner_releases_only_that_owner() {
        let mut store = OperationContextStore::new(4);
        store.create(1, hash()).unwrap();
        store.create(1, hash()).unwrap();
        let other = store.create(2, hash()).unwrap();
        assert_eq!(store.abort_owner(1), 2);
        assert_eq!(store.len(), 1);
        assert!(store.is_live(2, other));
    }

    #[test]
    fn capacity_is_insufficient_memory() {
        let mut store = OperationContextStore::new(1);
        store.create(1, hash()).unwrap();
        assert_eq!(store.create(1, hash()).unwrap_err(), ErrorCode::InsufficientMemory);
    }
}
