//! Message authentication codes.

use tessera_core::Transport;
use tessera_proto::{Algorithm, KeyId, Request};

use crate::{CryptoClient, MAX_MAC_LENGTH, client::truncate, error::Result, operation::MacOperation};

impl<T: Transport> CryptoClient<T> {
    /// MAC of `input` under `key`.
    pub fn mac_compute(&mut self, key: KeyId, alg: Algorithm, input: &[u8]) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_MAC_LENGTH];
        let written = self.call(&Request::MacCompute { key, alg }, &[input], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }

    /// Check `mac` over `input`.
    pub fn mac_verify(&mut self, key: KeyId, alg: Algorithm, input: &[u8], mac: &[u8]) -> Result<()> {
        self.call(&Request::MacVerify { key, alg }, &[input, mac], &mut [])?;
        Ok(())
    }

    /// Start a multi-part MAC computation.
    pub fn mac_sign_setup(&mut self, op: &mut MacOperation, key: KeyId, alg: Algorithm) -> Result<()> {
        let request = Request::MacSignSetup { op: op.handle, key, alg };
        self.step(&mut op.handle, &request, &[], &mut [])?;
        Ok(())
    }

    /// Start a multi-part MAC verification.
    pub fn mac_verify_setup(&mut self, op: &mut MacOperation, key: KeyId, alg: Algorithm) -> Result<()> {
        let request = Request::MacVerifySetup { op: op.handle, key, alg };
        self.step(&mut op.handle, &request, &[], &mut [])?;
        Ok(())
    }

    /// Absorb `input`.
    pub fn mac_update(&mut self, op: &mut MacOperation, input: &[u8]) -> Result<()> {
        let request = Request::MacUpdate { op: op.handle };
        self.step(&mut op.handle, &request, &[input], &mut [])?;
        Ok(())
    }

    /// Finish a computation and return the MAC.
    pub fn mac_sign_finish(&mut self, op: &mut MacOperation) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_MAC_LENGTH];
        let request = Request::MacSignFinish { op: op.handle };
        let written = self.step(&mut op.handle, &request, &[], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }

    /// Finish a verification against `mac`.
    pub fn mac_verify_finish(&mut self, op: &mut MacOperation, mac: &[u8]) -> Result<()> {
        let request = Request::MacVerifyFinish { op: op.handle };
        self.step(&mut op.handle, &request, &[mac], &mut [])?;
        Ok(())
    }

    /// Abort. Always leaves `op` inactive.
    pub fn mac_abort(&mut self, op: &mut MacOperation) -> Result<()> {
        let request = Request::MacAbort { op: op.handle };
        self.step(&mut op.handle, &request, &[], &mut [])?;
        Ok(())
    }
}
