//! The crypto partition and its service loop.
//!
//! [`CryptoPartition`] owns everything the crypto service keeps between
//! messages: the key store, the operation contexts, and the set of live
//! connection tokens. It is sans-IO like the partition manager; a runtime
//! calls [`serve_one`](CryptoPartition::serve_one) whenever the service
//! should make progress.
//!
//! # Connections
//!
//! Each accepted CONNECT gets a random non-zero token, installed as the
//! connection's reverse handle. Every later message carries it back, and
//! every operation context is tagged with it. DISCONNECT aborts whatever
//! contexts the token still owns.

use std::collections::HashSet;

use tessera_core::{Environment, Message, PartitionId, PartitionManager, SpmError, Timeout};
use tessera_proto::{
    CONNECT, DESCRIPTOR_SIZE, DISCONNECT, ErrorCode, Request, RequestDescriptor, SUCCESS, Signals, Status,
};

use crate::{
    config::ServiceConfig,
    context::OperationContextStore,
    dispatch::dispatch,
    error::{ServerError, ServiceError},
    handlers::Call,
    io::Io,
    key_store::{KeyStorage, KeyStore},
};

/// State of the crypto service partition.
#[derive(Debug)]
pub struct CryptoPartition<E: Environment> {
    pid: PartitionId,
    config: ServiceConfig,
    env: E,
    keys: KeyStore,
    contexts: OperationContextStore,
    tokens: HashSet<u64>,
}

impl<E: Environment> CryptoPartition<E> {
    /// Validate `config` and register the partition with `spm`.
    pub fn register(
        spm: &mut PartitionManager,
        config: ServiceConfig,
        env: E,
        storage: impl KeyStorage,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let pid = spm.register_partition(&config.name, vec![config.manifest()])?;
        tracing::info!(partition = %config.name, sid = config.sid, "crypto partition registered");
        Ok(Self {
            pid,
            keys: KeyStore::new(storage, config.max_keys),
            contexts: OperationContextStore::new(config.max_operations),
            tokens: HashSet::new(),
            config,
            env,
        })
    }

    /// Partition id.
    pub fn pid(&self) -> PartitionId {
        self.pid
    }

    /// Configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Live operation contexts.
    pub fn operations(&self) -> &OperationContextStore {
        &self.contexts
    }

    /// Key store.
    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Connections accepted and not yet disconnected.
    pub fn connections(&self) -> usize {
        self.tokens.len()
    }

    /// Signals the service waits on.
    pub fn wait_mask(&self) -> Signals {
        self.config.signal | Signals::DOORBELL
    }

    /// Wait for and handle at most one message.
    ///
    /// Returns `Ok(false)` when nothing was pending. Errors are partition
    /// manager errors: the partition has done something it must not, and
    /// the manager has already acted on it.
    pub fn serve_one(&mut self, spm: &mut PartitionManager, timeout: Timeout) -> Result<bool, SpmError> {
        let asserted = match spm.wait(self.pid, self.wait_mask(), timeout) {
            Ok(signals) => signals,
            Err(SpmError::Blocked) => return Ok(false),
            Err(err) => return Err(err),
        };
        if asserted.contains(Signals::DOORBELL) {
            spm.clear(self.pid)?;
            tracing::debug!("doorbell cleared");
        }
        if !asserted.contains(self.config.signal) {
            return Ok(asserted.contains(Signals::DOORBELL));
        }
        let msg = match spm.get(self.pid, self.config.signal) {
            Ok(msg) => msg,
            Err(SpmError::Status(ErrorCode::DoesNotExist)) => return Ok(false),
            Err(err) => return Err(err),
        };
        self.handle(spm, msg)?;
        Ok(true)
    }

    /// Handle every message already queued, without blocking.
    pub fn serve_pending(&mut self, spm: &mut PartitionManager) -> Result<usize, SpmError> {
        let mut served = 0;
        while self.serve_one(spm, Timeout::Poll)? {
            served += 1;
        }
        Ok(served)
    }

    fn handle(&mut self, spm: &mut PartitionManager, msg: Message) -> Result<(), SpmError> {
        match msg.msg_type {
            CONNECT => {
                let status = self.accept(spm, &msg)?;
                spm.reply(self.pid, msg.handle, status)
            },
            DISCONNECT => {
                let aborted = self.contexts.abort_owner(msg.rhandle);
                self.tokens.remove(&msg.rhandle);
                tracing::debug!(client = msg.client_id.0, aborted, "connection released");
                spm.reply(self.pid, msg.handle, SUCCESS)
            },
            _ => {
                let status = self.call(spm, &msg)?;
                spm.reply(self.pid, msg.handle, status)
            },
        }
    }

    fn accept(&mut self, spm: &mut PartitionManager, msg: &Message) -> Result<Status, SpmError> {
        if self.tokens.len() >= self.config.max_connections {
            tracing::debug!(client = msg.client_id.0, "connection busy");
            return Ok(ErrorCode::ConnectionBusy.code());
        }
        let token = loop {
            let candidate = self.env.random_u64();
            if candidate != 0 && !self.tokens.contains(&candidate) {
                break candidate;
            }
        };
        spm.set_rhandle(self.pid, msg.handle, token)?;
        self.tokens.insert(token);
        tracing::debug!(client = msg.client_id.0, "connection accepted");
        Ok(SUCCESS)
    }

    fn call(&mut self, spm: &mut PartitionManager, msg: &Message) -> Result<Status, SpmError> {
        if msg.in_size[0] != DESCRIPTOR_SIZE {
            tracing::warn!(client = msg.client_id.0, len = msg.in_size[0], "malformed request descriptor");
            return Ok(ErrorCode::ProgrammerError.code());
        }
        let bytes = spm.read_to_vec(self.pid, msg.handle, 0)?;
        let Some(desc) = RequestDescriptor::parse(&bytes) else {
            return Ok(ErrorCode::ProgrammerError.code());
        };
        let request = match Request::decode(&desc) {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(client = msg.client_id.0, %err, "request rejected");
                return Ok(ErrorCode::from(err).code());
            },
        };
        if let Request::AeadEncrypt { nonce, .. } | Request::AeadDecrypt { nonce, .. } = &request {
            if nonce.len() > self.config.max_nonce_length {
                return Ok(ErrorCode::InvalidArgument.code());
            }
        }

        let mut call = Call {
            io: Io::new(spm, self.pid, *msg),
            keys: &mut self.keys,
            contexts: &mut self.contexts,
            env: &self.env,
            client: msg.client_id,
            token: msg.rhandle,
            aead_buffer: self.config.max_aead_buffer,
        };
        match dispatch(&mut call, request) {
            Ok(()) => Ok(SUCCESS),
            Err(ServiceError::Status(code)) => Ok(code.code()),
            Err(ServiceError::Runtime(err)) => Err(err),
        }
    }
}
