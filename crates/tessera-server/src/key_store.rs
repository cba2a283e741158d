//! Service-managed key store.
//!
//! Clients name keys by [`KeyId`]; material never leaves the store except
//! through an explicit export. Every key is owned by the client that created
//! it and is invisible to others.
//!
//! ## Persistence
//!
//! Volatile keys live in memory until destroyed, closed, or the service
//! restarts. Persistent keys are written through to a [`KeyStorage`] backend
//! as CBOR records and loaded back on first use, so they survive a restart
//! of the partition. The in-memory slots act as a cache for them: `purge`
//! and `close` drop the cached copy only.
//!
//! ## Policy
//!
//! Each use names the usage flag it needs and the algorithm it runs. A
//! missing flag or a different permitted algorithm is `NOT_PERMITTED`.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use tessera_core::ClientId;
use tessera_crypto::keys;
use tessera_proto::{Algorithm, ErrorCode, KeyAttributes, KeyId, KeyLifetime, KeyType, KeyUsage};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

/// Errors from a key storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Backend cannot be reached.
    #[error("storage unavailable")]
    Unavailable,

    /// Backend is full.
    #[error("storage full")]
    Full,

    /// Record could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Stored record could not be decoded.
    #[error("corrupt record: {0}")]
    Decode(String),
}

impl From<StorageError> for ErrorCode {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable | StorageError::Encode(_) => Self::StorageFailure,
            StorageError::Full => Self::InsufficientStorage,
            StorageError::Decode(_) => Self::DataCorrupt,
        }
    }
}

/// Backend for persistent key records.
pub trait KeyStorage: Send + 'static {
    /// Write `record` under `id`, replacing any previous record.
    fn store(&self, id: KeyId, record: &[u8]) -> Result<(), StorageError>;

    /// Read the record under `id`.
    fn load(&self, id: KeyId) -> Result<Option<Vec<u8>>, StorageError>;

    /// Delete the record under `id`. Returns whether one existed.
    fn remove(&self, id: KeyId) -> Result<bool, StorageError>;
}

/// In-memory storage. Clones share the same records, so a store rebuilt on
/// a clone sees what the previous one persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<BTreeMap<KeyId, Vec<u8>>>>,
    capacity: Option<usize>,
}

impl MemoryStorage {
    /// Unbounded storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage holding at most `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity: Some(capacity), ..Self::default() }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().map_or(0, |r| r.len())
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyStorage for MemoryStorage {
    fn store(&self, id: KeyId, record: &[u8]) -> Result<(), StorageError> {
        let mut records = self.records.lock().map_err(|_| StorageError::Unavailable)?;
        if let Some(capacity) = self.capacity {
            if !records.contains_key(&id) && records.len() >= capacity {
                return Err(StorageError::Full);
            }
        }
        records.insert(id, record.to_vec());
        Ok(())
    }

    fn load(&self, id: KeyId) -> Result<Option<Vec<u8>>, StorageError> {
        let records = self.records.lock().map_err(|_| StorageError::Unavailable)?;
        Ok(records.get(&id).cloned())
    }

    fn remove(&self, id: KeyId) -> Result<bool, StorageError> {
        let mut records = self.records.lock().map_err(|_| StorageError::Unavailable)?;
        Ok(records.remove(&id).is_some())
    }
}

#[derive(Serialize)]
struct RecordRef<'a> {
    owner: i32,
    attributes: &'a KeyAttributes,
    material: &'a [u8],
}

#[derive(Deserialize)]
struct Record {
    owner: i32,
    attributes: KeyAttributes,
    material: Vec<u8>,
}

#[derive(Debug)]
struct Slot {
    owner: ClientId,
    attributes: KeyAttributes,
    material: Zeroizing<Vec<u8>>,
}

/// Key material resolved for one use.
#[derive(Debug)]
pub struct ResolvedKey {
    /// Attributes of the key.
    pub attributes: KeyAttributes,
    /// Key material.
    pub material: Zeroizing<Vec<u8>>,
}

impl ResolvedKey {
    /// Key type.
    pub fn key_type(&self) -> KeyType {
        self.attributes.key_type
    }
}

/// The key store of one crypto partition.
pub struct KeyStore {
    storage: Box<dyn KeyStorage>,
    slots: BTreeMap<KeyId, Slot>,
    max_slots: usize,
    next_volatile: u32,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("loaded", &self.slots.len())
            .field("max_slots", &self.max_slots)
            .finish_non_exhaustive()
    }
}

impl KeyStore {
    /// Store over `storage` holding at most `max_slots` keys in memory.
    pub fn new(storage: impl KeyStorage, max_slots: usize) -> Self {
        Self {
            storage: Box::new(storage),
            slots: BTreeMap::new(),
            max_slots,
            next_volatile: KeyId::VOLATILE_MIN,
        }
    }

    /// Number of keys held in memory.
    pub fn loaded(&self) -> usize {
        self.slots.len()
    }

    /// Import `data` under `attrs`.
    pub fn import(&mut self, owner: ClientId, attrs: KeyAttributes, data: &[u8]) -> Result<KeyId, ErrorCode> {
        check_new(&attrs)?;
        let bits = keys::validate_import(attrs.key_type, attrs.bits, data)?;
        self.insert(owner, attrs, bits, Zeroizing::new(data.to_vec()))
    }

    /// Generate a key under `attrs`, drawing randomness from `fill`.
    pub fn generate(
        &mut self,
        owner: ClientId,
        attrs: KeyAttributes,
        fill: impl FnOnce(&mut [u8]),
    ) -> Result<KeyId, ErrorCode> {
        check_new(&attrs)?;
        let (material, bits) = keys::generate(attrs.key_type, attrs.bits, fill)?;
        self.insert(owner, attrs, bits, material)
    }

    /// Store derived `material` under `attrs`.
    pub fn insert_derived(
        &mut self,
        owner: ClientId,
        attrs: KeyAttributes,
        material: Zeroizing<Vec<u8>>,
    ) -> Result<KeyId, ErrorCode> {
        check_new(&attrs)?;
        let bits = keys::validate_import(attrs.key_type, attrs.bits, &material)?;
        self.insert(owner, attrs, bits, material)
    }

    /// Copy `source` under `attrs`. The copy's usage is the intersection of
    /// both usages.
    /// An unset type or size inherits the source's.
    pub fn copy(&mut self, owner: ClientId, source: KeyId, attrs: KeyAttributes) -> Result<KeyId, ErrorCode> {
        check_lifetime(&attrs)?;
        let src = self.resolve(owner, source)?;
        if !src.attributes.usage.contains(KeyUsage::COPY) {
            return Err(ErrorCode::NotPermitted);
        }
        let src_attrs = src.attributes;
        if attrs.key_type != KeyType::NONE && attrs.key_type != src_attrs.key_type {
            return Err(ErrorCode::InvalidArgument);
        }
        if attrs.bits != 0 && attrs.bits != src_attrs.bits {
            return Err(ErrorCode::InvalidArgument);
        }
        let algorithm = match (src_attrs.algorithm, attrs.algorithm) {
            (a, Algorithm::NONE) | (Algorithm::NONE, a) => a,
            (a, b) if a == b => a,
            _ => return Err(ErrorCode::InvalidArgument),
        };
        let material = src.material.clone();
        let copy = KeyAttributes {
            key_type: src_attrs.key_type,
            usage: src_attrs.usage & attrs.usage,
            algorithm,
            ..attrs
        };
        self.insert(owner, copy, src_attrs.bits, material)
    }

    /// Destroy a key and its persistent record. The null id is a no-op.
    pub fn destroy(&mut self, owner: ClientId, id: KeyId) -> Result<(), ErrorCode> {
        if id == KeyId::NULL {
            return Ok(());
        }
        let persistent = self.resolve(owner, id)?.attributes.lifetime == KeyLifetime::Persistent;
        // The record goes first: a failed removal must not leave it behind
        // to be reloaded on next use.
        if persistent {
            self.storage.remove(id)?;
        }
        self.slots.remove(&id);
        debug!(key = id.0, "destroyed key");
        Ok(())
    }

    /// Drop the in-memory copy of a persistent key. Volatile keys stay.
    pub fn purge(&mut self, owner: ClientId, id: KeyId) -> Result<(), ErrorCode> {
        if self.resolve(owner, id)?.attributes.lifetime == KeyLifetime::Persistent {
            self.slots.remove(&id);
        }
        Ok(())
    }

    /// Load a persistent key.
    pub fn open(&mut self, owner: ClientId, id: KeyId) -> Result<KeyId, ErrorCode> {
        if !id.is_user() {
            return Err(ErrorCode::InvalidArgument);
        }
        if !self.slots.contains_key(&id) && self.storage.load(id)?.is_none() {
            return Err(ErrorCode::DoesNotExist);
        }
        self.resolve(owner, id)?;
        Ok(id)
    }

    /// Close a key: a volatile key is destroyed, a persistent one is
    /// dropped from memory. The null id is a no-op.
    pub fn close(&mut self, owner: ClientId, id: KeyId) -> Result<(), ErrorCode> {
        if id == KeyId::NULL {
            return Ok(());
        }
        match self.resolve(owner, id)?.attributes.lifetime {
            KeyLifetime::Volatile => self.destroy(owner, id),
            KeyLifetime::Persistent => {
                self.slots.remove(&id);
                Ok(())
            },
        }
    }

    /// Attributes of a key.
    pub fn attributes(&mut self, owner: ClientId, id: KeyId) -> Result<KeyAttributes, ErrorCode> {
        Ok(self.resolve(owner, id)?.attributes)
    }

    /// Key material, if the key allows export.
    pub fn export(&mut self, owner: ClientId, id: KeyId) -> Result<Zeroizing<Vec<u8>>, ErrorCode> {
        let slot = self.resolve(owner, id)?;
        if !slot.attributes.usage.contains(KeyUsage::EXPORT) {
            return Err(ErrorCode::NotPermitted);
        }
        Ok(slot.material.clone())
    }

    /// Public half of an asymmetric key. Needs no usage flag.
    pub fn export_public(&mut self, owner: ClientId, id: KeyId) -> Result<Vec<u8>, ErrorCode> {
        let slot = self.resolve(owner, id)?;
        Ok(keys::export_public(slot.attributes.key_type, &slot.material)?)
    }

    /// Resolve a key for running `alg` with `usage`.
    pub fn use_key(
        &mut self,
        owner: ClientId,
        id: KeyId,
        usage: KeyUsage,
        alg: Algorithm,
    ) -> Result<ResolvedKey, ErrorCode> {
        let slot = self.resolve(owner, id)?;
        if !slot.attributes.usage.contains(usage) {
            return Err(ErrorCode::NotPermitted);
        }
        if slot.attributes.algorithm == Algorithm::NONE || slot.attributes.algorithm != alg {
            return Err(ErrorCode::NotPermitted);
        }
        Ok(ResolvedKey { attributes: slot.attributes, material: slot.material.clone() })
    }

    fn resolve(&mut self, owner: ClientId, id: KeyId) -> Result<&Slot, ErrorCode> {
        if !self.slots.contains_key(&id) {
            if !id.is_user() {
                return Err(ErrorCode::InvalidHandle);
            }
            let Some(bytes) = self.storage.load(id)? else {
                return Err(ErrorCode::InvalidHandle);
            };
            let record: Record = ciborium::de::from_reader(bytes.as_slice())
                .map_err(|e| StorageError::Decode(e.to_string()))?;
            // Another client's record never takes a slot.
            if record.owner != owner.0 {
                return Err(ErrorCode::InvalidHandle);
            }
            if self.slots.len() >= self.max_slots {
                return Err(ErrorCode::InsufficientMemory);
            }
            let slot = Slot {
                owner: ClientId(record.owner),
                attributes: record.attributes,
                material: Zeroizing::new(record.material),
            };
            debug!(key = id.0, "loaded persistent key");
            self.slots.insert(id, slot);
        }
        match self.slots.get(&id) {
            Some(slot) if slot.owner == owner => Ok(slot),
            _ => Err(ErrorCode::InvalidHandle),
        }
    }

    fn insert(
        &mut self,
        owner: ClientId,
        mut attrs: KeyAttributes,
        bits: u16,
        material: Zeroizing<Vec<u8>>,
    ) -> Result<KeyId, ErrorCode> {
        if self.slots.len() >= self.max_slots {
            return Err(ErrorCode::InsufficientMemory);
        }
        let id = match attrs.lifetime {
            KeyLifetime::Persistent => {
                if self.slots.contains_key(&attrs.id) || self.storage.load(attrs.id)?.is_some() {
                    return Err(ErrorCode::AlreadyExists);
                }
                attrs.id
            },
            KeyLifetime::Volatile => self.allocate_volatile()?,
        };
        attrs.id = id;
        attrs.bits = bits;

        if attrs.lifetime == KeyLifetime::Persistent {
            let record = RecordRef { owner: owner.0, attributes: &attrs, material: &material };
            let mut bytes = Zeroizing::new(Vec::new());
            ciborium::ser::into_writer(&record, &mut *bytes)
                .map_err(|e| StorageError::Encode(e.to_string()))?;
            self.storage.store(id, &bytes)?;
        }

        debug!(key = id.0, key_type = ?attrs.key_type, bits, lifetime = ?attrs.lifetime, "stored key");
        self.slots.insert(id, Slot { owner, attributes: attrs, material });
        Ok(id)
    }

    fn allocate_volatile(&mut self) -> Result<KeyId, ErrorCode> {
        let span = KeyId::VOLATILE_MAX - KeyId::VOLATILE_MIN;
        for _ in 0..=span {
            let id = KeyId(self.next_volatile);
            self.next_volatile = if self.next_volatile == KeyId::VOLATILE_MAX {
                KeyId::VOLATILE_MIN
            } else {
                self.next_volatile + 1
            };
            if !self.slots.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(ErrorCode::InsufficientMemory)
    }
}

fn check_new(attrs: &KeyAttributes) -> Result<(), ErrorCode> {
    if attrs.key_type == KeyType::NONE {
        return Err(ErrorCode::InvalidArgument);
    }
    check_lifetime(attrs)
}

fn check_lifetime(attrs: &KeyAttributes) -> Result<(), ErrorCode> {
    let id_ok = match attrs.lifetime {
        KeyLifetime::Persistent => attrs.id.is_user(),
        KeyLifetime::Volatile => attrs.id == KeyId::NULL,
    };
    if id_ok { Ok(()) } else { Err(ErrorCode::InvalidArgument) }
}
