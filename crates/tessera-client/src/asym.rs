//! Signatures and asymmetric encryption.

use tessera_core::Transport;
use tessera_proto::{Algorithm, KeyId, Request};

use crate::{CryptoClient, MAX_EXPORT_LENGTH, SIGNATURE_LENGTH, client::truncate, error::Result};

impl<T: Transport> CryptoClient<T> {
    /// Sign `message`.
    pub fn sign_message(&mut self, key: KeyId, alg: Algorithm, message: &[u8]) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; SIGNATURE_LENGTH];
        let written = self.call(&Request::SignMessage { key, alg }, &[message], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }

    /// Check `signature` over `message`.
    pub fn verify_message(&mut self, key: KeyId, alg: Algorithm, message: &[u8], signature: &[u8]) -> Result<()> {
        self.call(&Request::VerifyMessage { key, alg }, &[message, signature], &mut [])?;
        Ok(())
    }

    /// Sign a precomputed digest.
    pub fn sign_hash(&mut self, key: KeyId, alg: Algorithm, hash: &[u8]) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; SIGNATURE_LENGTH];
        let written = self.call(&Request::SignHash { key, alg }, &[hash], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }

    /// Check `signature` over a precomputed digest.
    pub fn verify_hash(&mut self, key: KeyId, alg: Algorithm, hash: &[u8], signature: &[u8]) -> Result<()> {
        self.call(&Request::VerifyHash { key, alg }, &[hash, signature], &mut [])?;
        Ok(())
    }

    /// Encrypt to a public key. `salt` may be empty.
    pub fn asymmetric_encrypt(&mut self, key: KeyId, alg: Algorithm, input: &[u8], salt: &[u8]) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_EXPORT_LENGTH];
        let written =
            self.call(&Request::AsymmetricEncrypt { key, alg }, &[input, salt], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }

    /// Decrypt with a key pair. `salt` may be empty.
    pub fn asymmetric_decrypt(&mut self, key: KeyId, alg: Algorithm, input: &[u8], salt: &[u8]) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_EXPORT_LENGTH];
        let written =
            self.call(&Request::AsymmetricDecrypt { key, alg }, &[input, salt], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }
}
