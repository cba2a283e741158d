//! Client-side call primitive.
//!
//! [`Transport`] is what the marshaling client is written against: connect,
//! a blocking call with byte-slice vectors, close. Runtimes implement it by
//! staging the slices into the client's address space, driving the service
//! until the reply is in, and copying the outputs back.

use tessera_proto::{ErrorCode, Region};

use crate::{
    connection::Sid,
    error::SpmError,
    handle::Handle,
    memory::{Access, AddressSpace},
    spm::Reply,
};

/// Synchronous connect/call/close.
pub trait Transport {
    /// Open a connection to `sid`. Refusal and busy come back as
    /// [`SpmError::Status`].
    fn connect(&mut self, sid: Sid, version: u32) -> Result<Handle, SpmError>;

    /// Issue a call and block until the reply. On return each output slice
    /// holds what the service wrote, and [`Reply::out_len`] says how much.
    fn call(
        &mut self,
        handle: Handle,
        msg_type: i32,
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
    ) -> Result<Reply, SpmError>;

    /// Close a connection.
    fn close(&mut self, handle: Handle) -> Result<(), SpmError>;
}

/// Call buffers mapped into a client address space for one call.
#[derive(Debug)]
pub struct StagedCall {
    inputs: Vec<Region>,
    outputs: Vec<Region>,
}

impl StagedCall {
    /// Map `inputs` read-only and zeroed output buffers write-only.
    pub fn stage(space: &mut AddressSpace, inputs: &[&[u8]], outputs: &[&mut [u8]]) -> Self {
        let inputs = inputs.iter().map(|data| space.map(data.to_vec(), Access::READ)).collect();
        let outputs = outputs.iter().map(|buf| space.map_zeroed(buf.len(), Access::WRITE)).collect();
        Self { inputs, outputs }
    }

    /// Input regions in call order.
    pub fn inputs(&self) -> &[Region] {
        &self.inputs
    }

    /// Output regions in call order.
    pub fn outputs(&self) -> &[Region] {
        &self.outputs
    }

    /// Copy written output bytes back into `outputs` and unmap everything.
    pub fn finish(self, space: &mut AddressSpace, reply: &Reply, outputs: &mut [&mut [u8]]) -> Result<(), SpmError> {
        for (i, (region, out)) in self.outputs.iter().zip(outputs.iter_mut()).enumerate() {
            let written = reply.out_len.get(i).copied().unwrap_or(0);
            let data = space.unmap(region.base).unwrap_or_default();
            if written > data.len() || written > out.len() {
                return Err(ErrorCode::CommunicationFailure.into());
            }
            out[..written].copy_from_slice(&data[..written]);
        }
        for region in &self.inputs {
            space.unmap(region.base);
        }
        Ok(())
    }

    /// Unmap everything without copying, after a failed call.
    pub fn discard(self, space: &mut AddressSpace) {
        for region in self.inputs.iter().chain(&self.outputs) {
            space.unmap(region.base);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn staged_outputs_copy_back_written_prefix() {
        let mut space = AddressSpace::new();
        let mut out = [0xaau8; 4];
        let staged = StagedCall::stage(&mut space, &[b"in".as_slice()], &[&mut out[..]]);
        assert_eq!(space.mapped(), 2);

        let region = staged.outputs()[0];
        space.store(region, 0, b"ok").unwrap();
        let reply = Reply { status: 0, out_len: vec![2] };
        staged.finish(&mut space, &reply, &mut [&mut out[..]]).unwrap();

        assert_eq!(out, [b'o', b'k', 0xaa, 0xaa]);
        assert_eq!(space.mapped(), 0);
    }
}
