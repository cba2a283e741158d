//! Single-threaded runtime.

use tessera_core::{
    ClientId, Environment, Fault, Handle, PartitionManager, Reply, Sid, SpmError, StagedCall, Timeout,
    Transport,
};
use tessera_proto::ErrorCode;

use super::connect_outcome;
use crate::{
    config::ServiceConfig,
    error::ServerError,
    key_store::KeyStorage,
    partition::CryptoPartition,
};

/// Partition manager, crypto partition and the current client on one
/// thread.
///
/// Calls are cooperative: the service runs only while a client waits for
/// a reply, and handles every message queued so far.
#[derive(Debug)]
pub struct LocalRuntime<E: Environment> {
    spm: PartitionManager,
    partition: CryptoPartition<E>,
    client: ClientId,
}

impl<E: Environment> LocalRuntime<E> {
    /// Register the crypto partition and one client, which becomes current.
    pub fn new(config: ServiceConfig, env: E, storage: impl KeyStorage, client: ClientId) -> Result<Self, ServerError> {
        let mut spm = PartitionManager::new();
        let partition = CryptoPartition::register(&mut spm, config, env, storage)?;
        spm.register_client(client)?;
        Ok(Self { spm, partition, client })
    }

    /// Register another client.
    pub fn add_client(&mut self, client: ClientId) -> Result<(), ServerError> {
        self.spm.register_client(client)?;
        Ok(())
    }

    /// Issue later calls as `client`.
    pub fn switch_client(&mut self, client: ClientId) {
        self.client = client;
    }

    /// Current client.
    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Partition manager.
    pub fn spm(&self) -> &PartitionManager {
        &self.spm
    }

    /// Crypto partition.
    pub fn partition(&self) -> &CryptoPartition<E> {
        &self.partition
    }

    /// Handle every message already queued.
    pub fn run_pending(&mut self) -> Result<usize, SpmError> {
        self.partition.serve_pending(&mut self.spm)
    }

    /// Run the service until the completion for `handle` is in.
    fn drive(&mut self, handle: Handle) -> Result<Reply, SpmError> {
        loop {
            if let Some(reply) = self.spm.take_reply(self.client, handle)? {
                return Ok(reply);
            }
            match self.partition.serve_one(&mut self.spm, Timeout::Poll) {
                Ok(true) => {},
                Ok(false) => return Err(ErrorCode::CommunicationFailure.into()),
                Err(err) => {
                    tracing::warn!(%err, "crypto partition faulted");
                    return match self.spm.take_reply(self.client, handle) {
                        Ok(Some(reply)) => Ok(reply),
                        _ => Err(err),
                    };
                },
            }
        }
    }
}

impl<E: Environment> Transport for LocalRuntime<E> {
    fn connect(&mut self, sid: Sid, version: u32) -> Result<Handle, SpmError> {
        let handle = self.spm.connect(self.client, sid, version)?;
        let reply = self.drive(handle)?;
        connect_outcome(&reply)?;
        Ok(handle)
    }

    fn call(
        &mut self,
        handle: Handle,
        msg_type: i32,
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
    ) -> Result<Reply, SpmError> {
        let client = self.client;
        let space = self.spm.address_space_mut(client).ok_or(Fault::UnknownClient)?;
        let staged = StagedCall::stage(space, inputs, outputs);

        let outcome = self
            .spm
            .call(client, handle, msg_type, staged.inputs(), staged.outputs())
            .and_then(|()| self.drive(handle));

        let space = self.spm.address_space_mut(client).ok_or(Fault::UnknownClient)?;
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

    fn close(&mut self, handle: Handle) -> Result<(), SpmError> {
        self.spm.close(self.client, handle)?;
        self.run_pending()?;
        Ok(())
    }
}
