//! Model world: the oracle the real service is checked against.

use std::collections::BTreeMap;

use tessera_proto::{ErrorCode, KeyId};

use super::operation::{ClientIndex, KeyRef, Operation, OperationResult, SlotIndex, SmallUsage, resolve_key};

/// Sizes and limits shared by the model and the real service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldConfig {
    /// Clients taking part.
    pub clients: usize,
    /// Hash operation slots per client.
    pub slots: usize,
    /// Live multi-part operations across all connections.
    pub max_operations: usize,
    /// Keys held at once.
    pub max_keys: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self { clients: 3, slots: 2, max_operations: 4, max_keys: 6 }
    }
}

impl WorldConfig {
    /// Client an operation's index names.
    pub fn client(&self, client: ClientIndex) -> usize {
        usize::from(client) % self.clients
    }

    /// Slot an operation's index names.
    pub fn slot(&self, slot: SlotIndex) -> usize {
        usize::from(slot) % self.slots
    }

    /// Persistent id an import names.
    pub fn persistent_id(persistent: u8) -> KeyId {
        KeyId(u32::from(persistent % 4) + KeyId::USER_MIN)
    }
}

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Whether each client holds a connection.
    pub connected: Vec<bool>,
    /// Per-client, per-slot active flags.
    pub active: Vec<Vec<bool>>,
    /// Live operation contexts in the service.
    pub live_operations: usize,
    /// Keys held by the service.
    pub loaded_keys: usize,
    /// Every key id handed out, in order.
    pub issued: Vec<KeyId>,
}

#[derive(Debug, Clone)]
struct ModelKey {
    owner: usize,
    usage: SmallUsage,
    material: u8,
}

/// Reference implementation of the crypto service's client-visible rules.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    config: WorldConfig,
    connected: Vec<bool>,
    active: Vec<Vec<bool>>,
    keys: BTreeMap<KeyId, ModelKey>,
    issued: Vec<KeyId>,
    next_volatile: u32,
}

impl ModelWorld {
    /// Empty world: nobody connected, no keys.
    pub fn new(config: WorldConfig) -> Self {
        Self {
            config,
            connected: vec![false; config.clients],
            active: vec![vec![false; config.slots]; config.clients],
            keys: BTreeMap::new(),
            issued: Vec::new(),
            next_volatile: KeyId::VOLATILE_MIN,
        }
    }

    /// World configuration.
    pub fn config(&self) -> WorldConfig {
        self.config
    }

    /// Every key id handed out so far.
    pub fn issued(&self) -> &[KeyId] {
        &self.issued
    }

    /// Apply an operation and return the result the service should give.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        let client = self.config.client(op.client());
        match (op, self.connected[client]) {
            (Operation::Connect { .. }, true) => OperationResult::Skipped,
            (Operation::Connect { .. }, false) => {
                self.connected[client] = true;
                OperationResult::Ok
            },
            (_, false) => OperationResult::Skipped,
            (Operation::Close { .. }, true) => {
                self.connected[client] = false;
                self.active[client].fill(false);
                OperationResult::Ok
            },
            (&Operation::ImportKey { usage, material, persistent, .. }, true) => {
                self.import(client, usage, material, persistent)
            },
            (&Operation::DestroyKey { key, .. }, true) => match self.owned(client, key) {
                Ok(id) => {
                    self.keys.remove(&id);
                    OperationResult::Ok
                },
                Err(code) => OperationResult::Error(code),
            },
            (&Operation::MacCompute { key, .. }, true) => match self.owned(client, key) {
                Ok(id) if self.keys[&id].usage.sign() => OperationResult::Ok,
                Ok(_) => OperationResult::Error(ErrorCode::NotPermitted),
                Err(code) => OperationResult::Error(code),
            },
            (&Operation::ExportKey { key, .. }, true) => match self.owned(client, key) {
                Ok(id) => {
                    let key = &self.keys[&id];
                    if key.usage.export() {
                        OperationResult::Data(vec![key.material; 32])
                    } else {
                        OperationResult::Error(ErrorCode::NotPermitted)
                    }
                },
                Err(code) => OperationResult::Error(code),
            },
            (&Operation::HashSetup { slot, .. }, true) => {
                let slot = self.config.slot(slot);
                if self.active[client][slot] {
                    OperationResult::Error(ErrorCode::BadState)
                } else if self.live_operations() >= self.config.max_operations {
                    OperationResult::Error(ErrorCode::InsufficientMemory)
                } else {
                    self.active[client][slot] = true;
                    OperationResult::Ok
                }
            },
            (&Operation::HashUpdate { slot, .. }, true) => {
                if self.active[client][self.config.slot(slot)] {
                    OperationResult::Ok
                } else {
                    OperationResult::Error(ErrorCode::BadState)
                }
            },
            (&Operation::HashFinish { slot, .. }, true) => {
                let slot = self.config.slot(slot);
                if std::mem::replace(&mut self.active[client][slot], false) {
                    OperationResult::Ok
                } else {
                    OperationResult::Error(ErrorCode::BadState)
                }
            },
            (&Operation::HashAbort { slot, .. }, true) => {
                self.active[client][self.config.slot(slot)] = false;
                OperationResult::Ok
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            connected: self.connected.clone(),
            active: self.active.clone(),
            live_operations: self.live_operations(),
            loaded_keys: self.keys.len(),
            issued: self.issued.clone(),
        }
    }

    fn live_operations(&self) -> usize {
        self.active.iter().flatten().filter(|&&active| active).count()
    }

    fn import(&mut self, client: usize, usage: SmallUsage, material: u8, persistent: Option<u8>) -> OperationResult {
        if self.keys.len() >= self.config.max_keys {
            return OperationResult::Error(ErrorCode::InsufficientMemory);
        }
        let id = match persistent {
            Some(p) => {
                let id = WorldConfig::persistent_id(p);
                if self.keys.contains_key(&id) {
                    return OperationResult::Error(ErrorCode::AlreadyExists);
                }
                id
            },
            None => self.allocate_volatile(),
        };
        self.keys.insert(id, ModelKey { owner: client, usage, material });
        self.issued.push(id);
        OperationResult::Ok
    }

    // Never exhausts: the slot limit is far below the volatile range.
    fn allocate_volatile(&mut self) -> KeyId {
        loop {
            let id = KeyId(self.next_volatile);
            self.next_volatile =
                if self.next_volatile == KeyId::VOLATILE_MAX { KeyId::VOLATILE_MIN } else { self.next_volatile + 1 };
            if !self.keys.contains_key(&id) {
                return id;
            }
        }
    }

    /// Key `key` names, if `client` holds it. Missing and foreign keys look
    /// the same.
    fn owned(&self, client: usize, key: KeyRef) -> Result<KeyId, ErrorCode> {
        let id = resolve_key(key, &self.issued);
        match self.keys.get(&id) {
            Some(k) if k.owner == client => Ok(id),
            _ => Err(ErrorCode::InvalidHandle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SmallData;

    fn connected(clients: &[u8]) -> ModelWorld {
        let mut world = ModelWorld::new(WorldConfig::default());
        for &client in clients {
            assert_eq!(world.apply(&Operation::Connect { client }), OperationResult::Ok);
        }
        world
    }

    fn import(client: u8, usage: u8, persistent: Option<u8>) -> Operation {
        Operation::ImportKey { client, usage: SmallUsage(usage), material: 9, persistent }
    }

    #[test]
    fn unconnected_clients_are_skipped() {
        let mut world = connected(&[]);
        assert_eq!(world.apply(&import(0, 3, None)), OperationResult::Skipped);
        assert_eq!(world.apply(&Operation::Connect { client: 0 }), OperationResult::Ok);
        assert_eq!(world.apply(&Operation::Connect { client: 3 }), OperationResult::Skipped);
    }

    #[test]
    fn volatile_ids_count_up_and_skip_live_ones() {
        let mut world = connected(&[0]);
        world.apply(&import(0, 0, None));
        world.apply(&import(0, 0, None));
        assert_eq!(world.apply(&Operation::DestroyKey { client: 0, key: KeyRef(0) }), OperationResult::Ok);
        world.apply(&import(0, 0, None));
        assert_eq!(world.issued(), [
            KeyId(KeyId::VOLATILE_MIN),
            KeyId(KeyId::VOLATILE_MIN + 1),
            KeyId(KeyId::VOLATILE_MIN + 2),
        ]);
    }

    #[test]
    fn keys_are_private_and_policed() {
        let mut world = connected(&[0, 1]);
        world.apply(&import(0, 0b10, None));
        let export = |client| Operation::ExportKey { client, key: KeyRef(0) };
        let mac = |client| Operation::MacCompute { client, key: KeyRef(0), data: SmallData { seed: 0, size_class: 1 } };

        assert_eq!(world.apply(&export(0)), OperationResult::Data(vec![9; 32]));
        assert_eq!(world.apply(&export(1)), OperationResult::Error(ErrorCode::InvalidHandle));
        assert_eq!(world.apply(&mac(0)), OperationResult::Error(ErrorCode::NotPermitted));
        assert_eq!(world.apply(&mac(1)), OperationResult::Error(ErrorCode::InvalidHandle));
    }

    #[test]
    fn key_limit_comes_before_duplicate_id() {
        let mut world = connected(&[0]);
        assert_eq!(world.apply(&import(0, 0, Some(1))), OperationResult::Ok);
        assert_eq!(world.apply(&import(0, 0, Some(5))), OperationResult::Error(ErrorCode::AlreadyExists));
        for _ in 1..WorldConfig::default().max_keys {
            assert_eq!(world.apply(&import(0, 0, None)), OperationResult::Ok);
        }
        assert_eq!(world.apply(&import(0, 0, Some(1))), OperationResult::Error(ErrorCode::InsufficientMemory));
    }

    #[test]
    fn hash_lifecycle_and_global_limit() {
        let mut world = connected(&[0, 1, 2]);
        let setup = |client, slot| Operation::HashSetup { client, slot };

        assert_eq!(world.apply(&setup(0, 0)), OperationResult::Ok);
        assert_eq!(world.apply(&setup(0, 2)), OperationResult::Error(ErrorCode::BadState));
        assert_eq!(world.apply(&setup(0, 1)), OperationResult::Ok);
        assert_eq!(world.apply(&setup(1, 0)), OperationResult::Ok);
        assert_eq!(world.apply(&setup(1, 1)), OperationResult::Ok);
        assert_eq!(world.apply(&setup(2, 0)), OperationResult::Error(ErrorCode::InsufficientMemory));

        assert_eq!(world.apply(&Operation::HashFinish { client: 1, slot: 0 }), OperationResult::Ok);
        assert_eq!(world.apply(&Operation::HashFinish { client: 1, slot: 0 }), OperationResult::Error(ErrorCode::BadState));
        assert_eq!(world.apply(&Operation::Close { client: 0 }), OperationResult::Ok);
        assert_eq!(world.observable_state().live_operations, 1);
        assert_eq!(world.apply(&setup(2, 0)), OperationResult::Ok);
    }

    #[test]
    fn keys_outlive_the_connection() {
        let mut world = connected(&[0]);
        world.apply(&import(0, 0b10, None));
        world.apply(&Operation::Close { client: 0 });
        world.apply(&Operation::Connect { client: 0 });
        assert_eq!(world.apply(&Operation::ExportKey { client: 0, key: KeyRef(0) }), OperationResult::Data(vec![9; 32]));
    }
}
