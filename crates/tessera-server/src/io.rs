//! Client vectors of the message being handled.
//!
//! Handlers never touch client memory directly. [`Io`] reads inputs and
//! writes outputs through the partition manager, and keeps track of what
//! has been written so that an output that does not fit is reported as
//! `BUFFER_TOO_SMALL` instead of a write past the end of the region, which
//! the partition manager would treat as a partition fault.

use tessera_core::{Message, PartitionId, PartitionManager};
use tessera_proto::{ErrorCode, MAX_IOVEC, OpHandle};

use crate::error::ServiceError;

/// Size of an operation handle in `out[0]`.
pub const HANDLE_SIZE: usize = 4;

/// Vector access for one message.
#[derive(Debug)]
pub struct Io<'a> {
    spm: &'a mut PartitionManager,
    pid: PartitionId,
    msg: Message,
    written: [usize; MAX_IOVEC],
}

impl<'a> Io<'a> {
    /// Access the vectors of `msg`, delivered to `pid`.
    pub fn new(spm: &'a mut PartitionManager, pid: PartitionId, msg: Message) -> Self {
        Self { spm, pid, msg, written: [0; MAX_IOVEC] }
    }

    /// The message.
    pub fn message(&self) -> &Message {
        &self.msg
    }

    /// Length of input vector `idx`. Absent vectors are empty.
    pub fn input_len(&self, idx: usize) -> usize {
        self.msg.in_size.get(idx).copied().unwrap_or(0)
    }

    /// Read all of input vector `idx`. An absent vector reads as empty.
    pub fn input(&mut self, idx: usize) -> Result<Vec<u8>, ServiceError> {
        if self.input_len(idx) == 0 {
            return Ok(Vec::new());
        }
        Ok(self.spm.read_to_vec(self.pid, self.msg.handle, idx)?)
    }

    /// Remaining room in output vector `idx`.
    pub fn output_capacity(&self, idx: usize) -> usize {
        let size = self.msg.out_size.get(idx).copied().unwrap_or(0);
        size.saturating_sub(self.written(idx))
    }

    /// Bytes written to output vector `idx` so far.
    pub fn written(&self, idx: usize) -> usize {
        self.written.get(idx).copied().unwrap_or(0)
    }

    /// Fail with `BUFFER_TOO_SMALL` unless `len` more bytes fit in output
    /// vector `idx`. Used before a step that cannot be undone.
    pub fn require(&self, idx: usize, len: usize) -> Result<(), ServiceError> {
        if self.output_capacity(idx) < len {
            return Err(ErrorCode::BufferTooSmall.into());
        }
        Ok(())
    }

    /// Append `data` to output vector `idx`.
    pub fn write(&mut self, idx: usize, data: &[u8]) -> Result<(), ServiceError> {
        if data.is_empty() {
            return Ok(());
        }
        if data.len() > self.output_capacity(idx) {
            return Err(ErrorCode::BufferTooSmall.into());
        }
        self.spm.write(self.pid, self.msg.handle, idx, data)?;
        self.written[idx] += data.len();
        Ok(())
    }

    /// Write an operation handle into `out[0]`.
    pub fn write_handle(&mut self, op: OpHandle) -> Result<(), ServiceError> {
        self.write(0, &op.to_le_bytes())
    }
}
