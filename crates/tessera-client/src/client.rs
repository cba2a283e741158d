//! Connection to the crypto service and call marshaling.

use tessera_core::{Handle, Reply, Sid, Transport};
use tessera_proto::{ErrorCode, OpHandle, Request};

use crate::error::{ClientError, Result};

/// Message type of every crypto call. The descriptor selects the operation.
pub const CALL_TYPE: i32 = 0;

/// A connection to the crypto service over a [`Transport`].
///
/// Operations are grouped by family in separate `impl` blocks: keys,
/// hashes, MACs, ciphers, AEAD, signatures and derivation.
#[derive(Debug)]
pub struct CryptoClient<T: Transport> {
    transport: T,
    handle: Handle,
}

impl<T: Transport> CryptoClient<T> {
    /// Connect to service `sid` at `version`.
    pub fn connect(mut transport: T, sid: Sid, version: u32) -> Result<Self> {
        let handle = transport.connect(sid, version)?;
        Ok(Self { transport, handle })
    }

    /// Connection handle.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Close the connection and hand back the transport.
    pub fn close(mut self) -> Result<T> {
        self.transport.close(self.handle)?;
        Ok(self.transport)
    }

    /// Fill `out` with random bytes.
    pub fn generate_random(&mut self, out: &mut [u8]) -> Result<()> {
        let written = self.call(&Request::GenerateRandom, &[], &mut [&mut *out])?;
        if written.first().copied().unwrap_or(0) != out.len() {
            return Err(ErrorCode::CommunicationFailure.into());
        }
        Ok(())
    }

    /// Issue `request` and return the written length of each output.
    pub(crate) fn call(&mut self, request: &Request, inputs: &[&[u8]], outputs: &mut [&mut [u8]]) -> Result<Vec<usize>> {
        let reply = self.raw_call(request, inputs, outputs)?;
        check(reply)
    }

    /// Issue `request` without judging the status.
    pub(crate) fn raw_call(
        &mut self,
        request: &Request,
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
    ) -> Result<Reply> {
        let descriptor = request.to_descriptor().to_bytes();
        let mut vectors: Vec<&[u8]> = Vec::with_capacity(1 + inputs.len());
        vectors.push(&descriptor);
        vectors.extend_from_slice(inputs);
        Ok(self.transport.call(self.handle, CALL_TYPE, &vectors, outputs)?)
    }

    /// Issue a multi-part step for the operation at `*handle`.
    ///
    /// `out[0]` is the handle slot; whatever the service writes there, on
    /// success or failure, becomes the new handle. `extra` are the outputs
    /// after it. Returns the written lengths of `extra`.
    pub(crate) fn step(
        &mut self,
        handle: &mut OpHandle,
        request: &Request,
        inputs: &[&[u8]],
        extra: &mut [&mut [u8]],
    ) -> Result<Vec<usize>> {
        let mut slot = [0u8; 4];
        let reply = {
            let mut outputs: Vec<&mut [u8]> = Vec::with_capacity(1 + extra.len());
            outputs.push(&mut slot);
            outputs.extend(extra.iter_mut().map(|buf| &mut **buf));
            self.raw_call(request, inputs, &mut outputs)
        };
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                if err.is_fatal() {
                    *handle = 0;
                }
                return Err(err);
            },
        };
        if reply.out_len.first() == Some(&slot.len()) {
            *handle = u32::from_le_bytes(slot);
        }
        let mut written = check(reply)?;
        if !written.is_empty() {
            written.remove(0);
        }
        Ok(written)
    }
}

fn check(reply: Reply) -> Result<Vec<usize>> {
    if reply.is_success() { Ok(reply.out_len) } else { Err(ClientError::from_status(reply.status)) }
}

/// Truncate `buf` to the length the service wrote into output `idx`.
pub(crate) fn truncate(mut buf: Vec<u8>, written: &[usize], idx: usize) -> Vec<u8> {
    buf.truncate(written.get(idx).copied().unwrap_or(0));
    buf
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;

    use tessera_core::{Fault, SpmError};
    use tessera_proto::{DESCRIPTOR_SIZE, RequestDescriptor, ServiceId, Status};

    use super::*;
    use crate::{AeadOperation, HashOperation};

    /// Scripted transport: each call pops one `(status, writes)` entry and
    /// copies `writes[i]` into output `i`.
    #[derive(Debug, Default)]
    struct Scripted {
        replies: VecDeque<std::result::Result<(Status, Vec<Vec<u8>>), SpmError>>,
        calls: Vec<Vec<Vec<u8>>>,
    }

    impl Scripted {
        fn reply(mut self, status: Status, writes: Vec<Vec<u8>>) -> Self {
            self.replies.push_back(Ok((status, writes)));
            self
        }

        fn fail(mut self, err: SpmError) -> Self {
            self.replies.push_back(Err(err));
            self
        }
    }

    impl Transport for Scripted {
        fn connect(&mut self, _sid: Sid, _version: u32) -> std::result::Result<Handle, SpmError> {
            Ok(Handle::from_raw(1))
        }

        fn call(
            &mut self,
            _handle: Handle,
            _msg_type: i32,
            inputs: &[&[u8]],
            outputs: &mut [&mut [u8]],
        ) -> std::result::Result<Reply, SpmError> {
            self.calls.push(inputs.iter().map(|v| v.to_vec()).collect());
            let (status, writes) = self.replies.pop_front().unwrap()?;
            let mut out_len = vec![0; outputs.len()];
            for (idx, data) in writes.iter().enumerate() {
                outputs[idx][..data.len()].copy_from_slice(data);
                out_len[idx] = data.len();
            }
            Ok(Reply { status, out_len })
        }

        fn close(&mut self, _handle: Handle) -> std::result::Result<(), SpmError> {
            Ok(())
        }
    }

    fn client(transport: Scripted) -> CryptoClient<Scripted> {
        CryptoClient::connect(transport, 0x80, 1).unwrap()
    }

    #[test]
    fn descriptor_leads_every_call() {
        let mut c = client(Scripted::default().reply(0, vec![vec![9; 32]]));
        let digest = c.hash_compute(tessera_proto::Algorithm::SHA_256, b"abc").unwrap();
        assert_eq!(digest, vec![9; 32]);

        let call = &c.transport().calls[0];
        assert_eq!(call.len(), 2);
        assert_eq!(call[0].len(), DESCRIPTOR_SIZE);
        let desc = RequestDescriptor::parse(&call[0]).unwrap();
        assert_eq!(desc.srv_id.get(), ServiceId::HashCompute as u16);
        assert_eq!(call[1], b"abc");
    }

    #[test]
    fn handle_follows_what_the_service_wrote() {
        let mut c = client(
            Scripted::default()
                .reply(0, vec![7u32.to_le_bytes().to_vec()])
                .reply(ErrorCode::InvalidArgument.code(), vec![0u32.to_le_bytes().to_vec()]),
        );
        let mut op = HashOperation::new();
        c.hash_setup(&mut op, tessera_proto::Algorithm::SHA_256).unwrap();
        assert_eq!(op.handle(), 7);

        let err = c.hash_update(&mut op, b"x").unwrap_err();
        assert_eq!(err, ClientError::Status(ErrorCode::InvalidArgument));
        assert!(!op.is_active());
    }

    #[test]
    fn unwritten_handle_slot_keeps_the_handle() {
        let mut c = client(Scripted::default().reply(ErrorCode::BadState.code(), vec![]));
        let mut op = HashOperation { handle: 5 };
        let err = c.hash_setup(&mut op, tessera_proto::Algorithm::SHA_256).unwrap_err();
        assert_eq!(err.status(), ErrorCode::BadState);
        assert_eq!(op.handle(), 5);
    }

    #[test]
    fn fatal_fault_deactivates_operation() {
        let mut c = client(Scripted::default().fail(SpmError::Fatal(Fault::ServiceRejected)));
        let mut op = HashOperation { handle: 5 };
        let err = c.hash_update(&mut op, b"x").unwrap_err();
        assert!(err.is_fatal());
        assert!(!op.is_active());
    }

    #[test]
    fn long_nonce_never_reaches_the_service() {
        let mut c = client(Scripted::default());
        let err = c
            .aead_encrypt(
                tessera_proto::KeyId(1),
                tessera_proto::Algorithm::CHACHA20_POLY1305,
                &[0u8; 17],
                b"",
                b"data",
            )
            .unwrap_err();
        assert_eq!(err, ClientError::Status(ErrorCode::InvalidArgument));
        assert!(c.transport().calls.is_empty());
    }

    #[test]
    fn empty_associated_data_is_omitted() {
        let mut c = client(Scripted::default().reply(0, vec![vec![1; 20]]));
        c.aead_encrypt(
            tessera_proto::KeyId(1),
            tessera_proto::Algorithm::CHACHA20_POLY1305,
            &[0u8; 12],
            b"",
            b"data",
        )
        .unwrap();
        assert_eq!(c.transport().calls[0].len(), 2);
    }

    #[test]
    fn aead_finish_sizes_output_from_fed_input() {
        let mut c = client(
            Scripted::default()
                .reply(0, vec![3u32.to_le_bytes().to_vec()])
                .reply(0, vec![3u32.to_le_bytes().to_vec()])
                .reply(0, vec![3u32.to_le_bytes().to_vec()])
                .reply(0, vec![0u32.to_le_bytes().to_vec(), vec![0xaa; 16], vec![0xbb; 10]]),
        );
        let mut op = AeadOperation::new();
        let alg = tessera_proto::Algorithm::CHACHA20_POLY1305;
        c.aead_encrypt_setup(&mut op, tessera_proto::KeyId(1), alg).unwrap();
        c.aead_update(&mut op, &[0; 6]).unwrap();
        c.aead_update(&mut op, &[0; 4]).unwrap();
        let (ciphertext, tag) = c.aead_finish(&mut op).unwrap();
        assert_eq!(ciphertext, vec![0xbb; 10]);
        assert_eq!(tag, vec![0xaa; 16]);
        assert!(!op.is_active());
        assert_eq!(op.pending, 0);
    }

    #[test]
    fn generate_random_rejects_short_fill() {
        let mut c = client(Scripted::default().reply(0, vec![vec![1; 8]]));
        let mut buf = [0u8; 16];
        let err = c.generate_random(&mut buf).unwrap_err();
        assert_eq!(err, ClientError::Status(ErrorCode::CommunicationFailure));
    }
}
