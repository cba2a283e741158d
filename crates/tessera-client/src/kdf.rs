//! Key derivation and key agreement.

use tessera_core::Transport;
use tessera_proto::{Algorithm, DerivationStep, ErrorCode, KeyAttributes, KeyId, Request};
use zeroize::Zeroizing;

use crate::{
    CryptoClient, MAX_SHARED_SECRET_LENGTH,
    error::{ClientError, Result},
    operation::KeyDerivationOperation,
};

impl<T: Transport> CryptoClient<T> {
    /// Raw shared secret between `key` and the peer's public key.
    pub fn raw_key_agreement(&mut self, key: KeyId, alg: Algorithm, peer: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let mut buf = Zeroizing::new(vec![0u8; MAX_SHARED_SECRET_LENGTH]);
        let written = self.call(&Request::RawKeyAgreement { key, alg }, &[peer], &mut [buf.as_mut_slice()])?;
        buf.truncate(written.first().copied().unwrap_or(0));
        Ok(buf)
    }

    /// Start a derivation.
    pub fn key_derivation_setup(&mut self, op: &mut KeyDerivationOperation, alg: Algorithm) -> Result<()> {
        let request = Request::KeyDerivationSetup { op: op.handle, alg };
        self.step(&mut op.handle, &request, &[], &mut [])?;
        Ok(())
    }

    /// Bytes the derivation can still produce.
    pub fn key_derivation_get_capacity(&mut self, op: &mut KeyDerivationOperation) -> Result<u64> {
        let mut buf = [0u8; 8];
        let request = Request::KeyDerivationGetCapacity { op: op.handle };
        let written = self.step(&mut op.handle, &request, &[], &mut [buf.as_mut_slice()])?;
        if written.first() != Some(&buf.len()) {
            return Err(ClientError::Status(ErrorCode::CommunicationFailure));
        }
        Ok(u64::from_le_bytes(buf))
    }

    /// Lower the capacity.
    pub fn key_derivation_set_capacity(&mut self, op: &mut KeyDerivationOperation, capacity: u64) -> Result<()> {
        let request = Request::KeyDerivationSetCapacity { op: op.handle, capacity };
        self.step(&mut op.handle, &request, &[], &mut [])?;
        Ok(())
    }

    /// Feed `data` as input `step`.
    pub fn key_derivation_input_bytes(
        &mut self,
        op: &mut KeyDerivationOperation,
        step: DerivationStep,
        data: &[u8],
    ) -> Result<()> {
        let request = Request::KeyDerivationInputBytes { op: op.handle, step };
        self.step(&mut op.handle, &request, &[data], &mut [])?;
        Ok(())
    }

    /// Feed a stored key as input `step`.
    pub fn key_derivation_input_key(
        &mut self,
        op: &mut KeyDerivationOperation,
        step: DerivationStep,
        key: KeyId,
    ) -> Result<()> {
        let request = Request::KeyDerivationInputKey { op: op.handle, step, key };
        self.step(&mut op.handle, &request, &[], &mut [])?;
        Ok(())
    }

    /// Feed the agreement between `key` and `peer` as input `step`.
    pub fn key_derivation_key_agreement(
        &mut self,
        op: &mut KeyDerivationOperation,
        step: DerivationStep,
        key: KeyId,
        peer: &[u8],
    ) -> Result<()> {
        let request = Request::KeyDerivationKeyAgreement { op: op.handle, step, key };
        self.step(&mut op.handle, &request, &[peer], &mut [])?;
        Ok(())
    }

    /// Draw `len` bytes.
    pub fn key_derivation_output_bytes(
        &mut self,
        op: &mut KeyDerivationOperation,
        len: usize,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let mut buf = Zeroizing::new(vec![0u8; len]);
        let request = Request::KeyDerivationOutputBytes { op: op.handle };
        let written = self.step(&mut op.handle, &request, &[], &mut [buf.as_mut_slice()])?;
        buf.truncate(written.first().copied().unwrap_or(0));
        Ok(buf)
    }

    /// Draw a new key with `attributes`.
    pub fn key_derivation_output_key(
        &mut self,
        op: &mut KeyDerivationOperation,
        attributes: &KeyAttributes,
    ) -> Result<KeyId> {
        let mut slot = [0u8; 4];
        let attributes = attributes.to_bytes();
        let request = Request::KeyDerivationOutputKey { op: op.handle };
        let written = self.step(&mut op.handle, &request, &[attributes.as_slice()], &mut [slot.as_mut_slice()])?;
        if written.first() != Some(&slot.len()) {
            return Err(ClientError::Status(ErrorCode::CommunicationFailure));
        }
        Ok(KeyId(u32::from_le_bytes(slot)))
    }

    /// Abort. Always leaves `op` inactive.
    pub fn key_derivation_abort(&mut self, op: &mut KeyDerivationOperation) -> Result<()> {
        let request = Request::KeyDerivationAbort { op: op.handle };
        self.step(&mut op.handle, &request, &[], &mut [])?;
        Ok(())
    }
}
