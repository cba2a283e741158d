//! Tokio runtime.
//!
//! The partition manager lives behind a [`tokio::sync::Mutex`]. The service
//! loop is a task that handles messages until nothing is pending and then
//! parks on a [`Notify`]; clients ring it after queueing a message. A
//! [`watch`] counter is bumped after every handled message, and a waiting
//! client re-checks for its reply whenever it moves. Clients mark the
//! counter as seen before each check, so a reply that lands between the
//! check and the wait is never missed.

use std::sync::Arc;

use tessera_core::{
    ClientId, Environment, Fault, Handle, PartitionManager, Reply, Sid, SpmError, StagedCall, Timeout,
    Transport,
};
use tessera_proto::ErrorCode;
use tokio::{
    sync::{Mutex, Notify, watch},
    task::JoinHandle,
};

use super::connect_outcome;
use crate::{
    config::ServiceConfig,
    error::ServerError,
    key_store::KeyStorage,
    partition::CryptoPartition,
};

#[derive(Debug)]
struct Shared {
    spm: Mutex<PartitionManager>,
    work: Notify,
    served: watch::Sender<u64>,
}

impl Shared {
    fn bump(&self) {
        self.served.send_modify(|n| *n = n.wrapping_add(1));
    }
}

/// Partition manager shared between a service task and client tasks.
#[derive(Debug)]
pub struct SharedRuntime<E: Environment> {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    service: JoinHandle<Result<CryptoPartition<E>, ServerError>>,
}

impl<E: Environment> SharedRuntime<E> {
    /// Register the crypto partition and spawn its service loop. Must be
    /// called from within a tokio runtime.
    pub fn start(config: ServiceConfig, env: E, storage: impl KeyStorage) -> Result<Self, ServerError> {
        let mut spm = PartitionManager::new();
        let partition = CryptoPartition::register(&mut spm, config, env, storage)?;
        let shared = Arc::new(Shared {
            spm: Mutex::new(spm),
            work: Notify::new(),
            served: watch::channel(0).0,
        });
        let (shutdown, stop) = watch::channel(false);
        let service = tokio::spawn(serve(Arc::clone(&shared), partition, stop));
        Ok(Self { shared, shutdown, service })
    }

    /// Register `client` and return a handle for it.
    pub async fn client(&self, client: ClientId) -> Result<SharedClient, ServerError> {
        self.shared.spm.lock().await.register_client(client)?;
        Ok(SharedClient { shared: Arc::clone(&self.shared), client })
    }

    /// Stop the service loop and hand back the partition.
    pub async fn shutdown(self) -> Result<CryptoPartition<E>, ServerError> {
        let _ = self.shutdown.send(true);
        self.service.await?
    }
}

async fn serve<E: Environment>(
    shared: Arc<Shared>,
    mut partition: CryptoPartition<E>,
    mut stop: watch::Receiver<bool>,
) -> Result<CryptoPartition<E>, ServerError> {
    tracing::info!(partition = %partition.config().name, "service loop started");
    loop {
        let progressed = {
            let mut spm = shared.spm.lock().await;
            partition.serve_one(&mut spm, Timeout::Block)
        };
        match progressed {
            Ok(true) => {
                shared.bump();
                continue;
            },
            Ok(false) => {},
            Err(err) => {
                tracing::warn!(%err, "crypto partition faulted, service loop stopped");
                shared.bump();
                return Err(err.into());
            },
        }
        tokio::select! {
            () = shared.work.notified() => {},
            _ = stop.changed() => {
                tracing::info!("service loop stopped");
                return Ok(partition);
            },
        }
    }
}

/// Async client of a [`SharedRuntime`].
#[derive(Debug, Clone)]
pub struct SharedClient {
    shared: Arc<Shared>,
    client: ClientId,
}

impl SharedClient {
    /// Client id.
    pub fn id(&self) -> ClientId {
        self.client
    }

    /// Open a connection to `sid`.
    pub async fn connect(&self, sid: Sid, version: u32) -> Result<Handle, SpmError> {
        let mut served = self.shared.served.subscribe();
        let handle = self.shared.spm.lock().await.connect(self.client, sid, version)?;
        self.shared.work.notify_one();
        let reply = self.reply(handle, &mut served).await?;
        connect_outcome(&reply)?;
        Ok(handle)
    }

    /// Issue a call and wait for the reply. Output slices receive what the
    /// service wrote.
    pub async fn call(
        &self,
        handle: Handle,
        msg_type: i32,
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
    ) -> Result<Reply, SpmError> {
        let mut served = self.shared.served.subscribe();
        let staged = {
            let mut spm = self.shared.spm.lock().await;
            let space = spm.address_space_mut(self.client).ok_or(Fault::UnknownClient)?;
            let staged = StagedCall::stage(space, inputs, outputs);
            if let Err(err) = spm.call(self.client, handle, msg_type, staged.inputs(), staged.outputs()) {
                if let Some(space) = spm.address_space_mut(self.client) {
                    staged.discard(space);
                }
                return Err(err);
            }
            staged
        };
        self.shared.work.notify_one();

        let outcome = self.reply(handle, &mut served).await;
        let mut spm = self.shared.spm.lock().await;
        let space = spm.address_space_mut(self.client).ok_or(Fault::UnknownClient)?;
        match outcome {
            Ok(reply) => {
                staged.finish(space, &reply, outputs)?;
                Ok(reply)
            },
            Err(err) => {
                staged.discard(space);
                Err(err)
            },
        }
    }

    /// Close a connection. The service releases it asynchronously.
    pub async fn close(&self, handle: Handle) -> Result<(), SpmError> {
        self.shared.spm.lock().await.close(self.client, handle)?;
        self.shared.work.notify_one();
        Ok(())
    }

    async fn reply(&self, handle: Handle, served: &mut watch::Receiver<u64>) -> Result<Reply, SpmError> {
        loop {
            served.borrow_and_update();
            if let Some(reply) = self.shared.spm.lock().await.take_reply(self.client, handle)? {
                return Ok(reply);
            }
            if served.changed().await.is_err() {
                return Err(ErrorCode::CommunicationFailure.into());
            }
        }
    }

    /// Blocking adapter for use on threads outside the tokio runtime, such
    /// as those from `spawn_blocking`.
    pub fn blocking(self) -> BlockingClient {
        BlockingClient { client: self, runtime: tokio::runtime::Handle::current() }
    }
}

/// [`Transport`] over a [`SharedClient`], blocking the calling thread.
#[derive(Debug)]
pub struct BlockingClient {
    client: SharedClient,
    runtime: tokio::runtime::Handle,
}

impl Transport for BlockingClient {
    fn connect(&mut self, sid: Sid, version: u32) -> Result<Handle, SpmError> {
        self.runtime.block_on(self.client.connect(sid, version))
    }

    fn call(
        &mut self,
        handle: Handle,
        msg_type: i32,
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
    ) -> Result<Reply, SpmError> {
        self.runtime.block_on(self.client.call(handle, msg_type, inputs, outputs))
    }

    fn close(&mut self, handle: Handle) -> Result<(), SpmError> {
        self.runtime.block_on(self.client.close(handle))
    }
}
