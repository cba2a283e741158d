//! Unauthenticated ciphers.

use tessera_core::Transport;
use tessera_proto::{Algorithm, KeyId, Request};

use crate::{CryptoClient, IV_LENGTH, client::truncate, error::Result, operation::CipherOperation};

impl<T: Transport> CryptoClient<T> {
    /// Encrypt under a fresh IV. Returns `IV || ciphertext`.
    pub fn cipher_encrypt(&mut self, key: KeyId, alg: Algorithm, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; IV_LENGTH + plaintext.len()];
        let written = self.call(&Request::CipherEncrypt { key, alg }, &[plaintext], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }

    /// Decrypt `IV || ciphertext`.
    pub fn cipher_decrypt(&mut self, key: KeyId, alg: Algorithm, input: &[u8]) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; input.len().saturating_sub(IV_LENGTH)];
        let written = self.call(&Request::CipherDecrypt { key, alg }, &[input], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }

    /// Start a multi-part encryption.
    pub fn cipher_encrypt_setup(&mut self, op: &mut CipherOperation, key: KeyId, alg: Algorithm) -> Result<()> {
        let request = Request::CipherEncryptSetup { op: op.handle, key, alg };
        self.step(&mut op.handle, &request, &[], &mut [])?;
        Ok(())
    }

    /// Start a multi-part decryption.
    pub fn cipher_decrypt_setup(&mut self, op: &mut CipherOperation, key: KeyId, alg: Algorithm) -> Result<()> {
        let request = Request::CipherDecryptSetup { op: op.handle, key, alg };
        self.step(&mut op.handle, &request, &[], &mut [])?;
        Ok(())
    }

    /// Let the service pick the IV and return it.
    pub fn cipher_generate_iv(&mut self, op: &mut CipherOperation) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; IV_LENGTH];
        let request = Request::CipherGenerateIv { op: op.handle };
        let written = self.step(&mut op.handle, &request, &[], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }

    /// Set the IV.
    pub fn cipher_set_iv(&mut self, op: &mut CipherOperation, iv: &[u8]) -> Result<()> {
        let request = Request::CipherSetIv { op: op.handle };
        self.step(&mut op.handle, &request, &[iv], &mut [])?;
        Ok(())
    }

    /// Transform `input`.
    pub fn cipher_update(&mut self, op: &mut CipherOperation, input: &[u8]) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; input.len()];
        let request = Request::CipherUpdate { op: op.handle };
        let written = self.step(&mut op.handle, &request, &[input], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }

    /// Finish and return any remaining output.
    pub fn cipher_finish(&mut self, op: &mut CipherOperation) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; IV_LENGTH];
        let request = Request::CipherFinish { op: op.handle };
        let written = self.step(&mut op.handle, &request, &[], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }

    /// Abort. Always leaves `op` inactive.
    pub fn cipher_abort(&mut self, op: &mut CipherOperation) -> Result<()> {
        let request = Request::CipherAbort { op: op.handle };
        self.step(&mut op.handle, &request, &[], &mut [])?;
        Ok(())
    }
}
