//! Hashing.

use tessera_core::Transport;
use tessera_proto::{Algorithm, Request};

use crate::{CryptoClient, MAX_HASH_LENGTH, client::truncate, error::Result, operation::HashOperation};

impl<T: Transport> CryptoClient<T> {
    /// Digest of `input`.
    pub fn hash_compute(&mut self, alg: Algorithm, input: &[u8]) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_HASH_LENGTH];
        let written = self.call(&Request::HashCompute { alg }, &[input], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }

    /// Check that `input` hashes to `hash`.
    pub fn hash_compare(&mut self, alg: Algorithm, input: &[u8], hash: &[u8]) -> Result<()> {
        self.call(&Request::HashCompare { alg }, &[input, hash], &mut [])?;
        Ok(())
    }

    /// Start a multi-part hash.
    pub fn hash_setup(&mut self, op: &mut HashOperation, alg: Algorithm) -> Result<()> {
        let request = Request::HashSetup { op: op.handle, alg };
        self.step(&mut op.handle, &request, &[], &mut [])?;
        Ok(())
    }

    /// Absorb `input`.
    pub fn hash_update(&mut self, op: &mut HashOperation, input: &[u8]) -> Result<()> {
        let request = Request::HashUpdate { op: op.handle };
        self.step(&mut op.handle, &request, &[input], &mut [])?;
        Ok(())
    }

    /// Finish and return the digest.
    pub fn hash_finish(&mut self, op: &mut HashOperation) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_HASH_LENGTH];
        let request = Request::HashFinish { op: op.handle };
        let written = self.step(&mut op.handle, &request, &[], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }

    /// Finish and compare against `hash`.
    pub fn hash_verify(&mut self, op: &mut HashOperation, hash: &[u8]) -> Result<()> {
        let request = Request::HashVerify { op: op.handle };
        self.step(&mut op.handle, &request, &[hash], &mut [])?;
        Ok(())
    }

    /// Copy the state of `source` into `target`, which must be inactive.
    pub fn hash_clone(&mut self, source: &HashOperation, target: &mut HashOperation) -> Result<()> {
        let request = Request::HashClone { op: source.handle, target: target.handle };
        self.step(&mut target.handle, &request, &[], &mut [])?;
        Ok(())
    }

    /// Abort. Always leaves `op` inactive.
    pub fn hash_abort(&mut self, op: &mut HashOperation) -> Result<()> {
        let request = Request::HashAbort { op: op.handle };
        self.step(&mut op.handle, &request, &[], &mut [])?;
        Ok(())
    }
}
