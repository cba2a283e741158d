//! Messages delivered to services.

use tessera_proto::{MAX_IOVEC, Region};

use crate::{handle::Handle, spm::ClientId, spm::PartitionId};

/// Message as seen by the service after `get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    /// Message handle for `read`, `write` and `reply`.
    pub handle: Handle,
    /// `CONNECT`, `DISCONNECT`, or a non-negative call type.
    pub msg_type: i32,
    /// Calling client.
    pub client_id: ClientId,
    /// Reverse handle of the connection.
    pub rhandle: u64,
    /// Length of each input vector; absent vectors are zero.
    pub in_size: [usize; MAX_IOVEC],
    /// Length of each output vector; absent vectors are zero.
    pub out_size: [usize; MAX_IOVEC],
}

/// Manager-side record of an outstanding message.
#[derive(Debug, Clone)]
pub(crate) struct PendingMessage {
    pub partition: PartitionId,
    pub connection: Handle,
    pub client: ClientId,
    pub msg_type: i32,
    pub inputs: Vec<Region>,
    pub outputs: Vec<Region>,
    pub read_pos: [u64; MAX_IOVEC],
    pub written: [u64; MAX_IOVEC],
    pub delivered: bool,
    /// Client side is gone: reads see no data, writes and the reply are
    /// discarded.
    pub orphaned: bool,
}

impl PendingMessage {
    pub fn new(
        partition: PartitionId,
        connection: Handle,
        client: ClientId,
        msg_type: i32,
        inputs: Vec<Region>,
        outputs: Vec<Region>,
    ) -> Self {
        Self {
            partition,
            connection,
            client,
            msg_type,
            inputs,
            outputs,
            read_pos: [0; MAX_IOVEC],
            written: [0; MAX_IOVEC],
            delivered: false,
            orphaned: false,
        }
    }

    pub fn view(&self, handle: Handle, rhandle: u64) -> Message {
        let mut in_size = [0; MAX_IOVEC];
        let mut out_size = [0; MAX_IOVEC];
        for (slot, region) in in_size.iter_mut().zip(&self.inputs) {
            *slot = usize::try_from(region.len).unwrap_or(usize::MAX);
        }
        for (slot, region) in out_size.iter_mut().zip(&self.outputs) {
            *slot = usize::try_from(region.len).unwrap_or(usize::MAX);
        }
        Message { handle, msg_type: self.msg_type, client_id: self.client, rhandle, in_size, out_size }
    }

    pub fn input(&self, idx: usize) -> Region {
        self.inputs.get(idx).copied().unwrap_or(Region::NULL)
    }

    pub fn output(&self, idx: usize) -> Region {
        self.outputs.get(idx).copied().unwrap_or(Region::NULL)
    }

    pub fn written_lengths(&self) -> Vec<usize> {
        self.written[..self.outputs.len()]
            .iter()
            .map(|n| usize::try_from(*n).unwrap_or(usize::MAX))
            .collect()
    }
}
