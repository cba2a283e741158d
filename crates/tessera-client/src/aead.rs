//! Authenticated encryption.
//!
//! The multi-part operation releases all output at the end: `aead_update`
//! returns nothing, and `aead_finish` / `aead_verify` return everything fed
//! since setup.

use tessera_core::Transport;
use tessera_proto::{Algorithm, ErrorCode, KeyId, Nonce, Request};

use crate::{
    CryptoClient, NONCE_LENGTH, TAG_LENGTH,
    client::truncate,
    error::{ClientError, Result},
    operation::AeadOperation,
};

fn nonce(bytes: &[u8]) -> Result<Nonce> {
    Nonce::new(bytes).ok_or(ClientError::Status(ErrorCode::InvalidArgument))
}

impl<T: Transport> CryptoClient<T> {
    /// Seal `plaintext`. Returns `ciphertext || tag`.
    pub fn aead_encrypt(
        &mut self,
        key: KeyId,
        alg: Algorithm,
        nonce_bytes: &[u8],
        ad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let request = Request::AeadEncrypt { key, alg, nonce: nonce(nonce_bytes)? };
        let mut buf = vec![0u8; plaintext.len() + TAG_LENGTH];
        let written = if ad.is_empty() {
            self.call(&request, &[plaintext], &mut [buf.as_mut_slice()])?
        } else {
            self.call(&request, &[plaintext, ad], &mut [buf.as_mut_slice()])?
        };
        Ok(truncate(buf, &written, 0))
    }

    /// Open `ciphertext || tag`.
    pub fn aead_decrypt(
        &mut self,
        key: KeyId,
        alg: Algorithm,
        nonce_bytes: &[u8],
        ad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        let request = Request::AeadDecrypt { key, alg, nonce: nonce(nonce_bytes)? };
        let mut buf = vec![0u8; ciphertext.len().saturating_sub(TAG_LENGTH)];
        let written = if ad.is_empty() {
            self.call(&request, &[ciphertext], &mut [buf.as_mut_slice()])?
        } else {
            self.call(&request, &[ciphertext, ad], &mut [buf.as_mut_slice()])?
        };
        Ok(truncate(buf, &written, 0))
    }

    /// Start a multi-part encryption.
    pub fn aead_encrypt_setup(&mut self, op: &mut AeadOperation, key: KeyId, alg: Algorithm) -> Result<()> {
        let request = Request::AeadEncryptSetup { op: op.handle, key, alg };
        self.aead_setup(op, &request)
    }

    /// Start a multi-part decryption.
    pub fn aead_decrypt_setup(&mut self, op: &mut AeadOperation, key: KeyId, alg: Algorithm) -> Result<()> {
        let request = Request::AeadDecryptSetup { op: op.handle, key, alg };
        self.aead_setup(op, &request)
    }

    fn aead_setup(&mut self, op: &mut AeadOperation, request: &Request) -> Result<()> {
        let was_active = op.is_active();
        self.step(&mut op.handle, request, &[], &mut [])?;
        if !was_active {
            op.pending = 0;
        }
        Ok(())
    }

    /// Let the service pick the nonce and return it.
    pub fn aead_generate_nonce(&mut self, op: &mut AeadOperation) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; NONCE_LENGTH];
        let request = Request::AeadGenerateNonce { op: op.handle };
        let written = self.aead_step(op, &request, &[], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }

    /// Set the nonce.
    pub fn aead_set_nonce(&mut self, op: &mut AeadOperation, nonce: &[u8]) -> Result<()> {
        let request = Request::AeadSetNonce { op: op.handle };
        self.aead_step(op, &request, &[nonce], &mut [])?;
        Ok(())
    }

    /// Declare the total associated data and message lengths up front.
    pub fn aead_set_lengths(&mut self, op: &mut AeadOperation, ad_length: u64, plaintext_length: u64) -> Result<()> {
        let request = Request::AeadSetLengths { op: op.handle, ad_length, plaintext_length };
        self.aead_step(op, &request, &[], &mut [])?;
        Ok(())
    }

    /// Absorb associated data.
    pub fn aead_update_ad(&mut self, op: &mut AeadOperation, ad: &[u8]) -> Result<()> {
        let request = Request::AeadUpdateAd { op: op.handle };
        self.aead_step(op, &request, &[ad], &mut [])?;
        Ok(())
    }

    /// Absorb message input.
    pub fn aead_update(&mut self, op: &mut AeadOperation, input: &[u8]) -> Result<()> {
        let request = Request::AeadUpdate { op: op.handle };
        self.aead_step(op, &request, &[input], &mut [])?;
        op.pending += input.len();
        Ok(())
    }

    /// Seal. Returns `(ciphertext, tag)`.
    pub fn aead_finish(&mut self, op: &mut AeadOperation) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut tag = vec![0u8; TAG_LENGTH];
        let mut ciphertext = vec![0u8; op.pending];
        let request = Request::AeadFinish { op: op.handle };
        let written =
            self.aead_step(op, &request, &[], &mut [tag.as_mut_slice(), ciphertext.as_mut_slice()])?;
        Ok((truncate(ciphertext, &written, 1), truncate(tag, &written, 0)))
    }

    /// Open with `tag`. Returns the plaintext.
    pub fn aead_verify(&mut self, op: &mut AeadOperation, tag: &[u8]) -> Result<Vec<u8>> {
        let mut plaintext = vec![0u8; op.pending];
        let request = Request::AeadVerify { op: op.handle };
        let written = self.aead_step(op, &request, &[tag], &mut [plaintext.as_mut_slice()])?;
        Ok(truncate(plaintext, &written, 0))
    }

    /// Abort. Always leaves `op` inactive.
    pub fn aead_abort(&mut self, op: &mut AeadOperation) -> Result<()> {
        let request = Request::AeadAbort { op: op.handle };
        self.aead_step(op, &request, &[], &mut [])?;
        Ok(())
    }

    fn aead_step(
        &mut self,
        op: &mut AeadOperation,
        request: &Request,
        inputs: &[&[u8]],
        extra: &mut [&mut [u8]],
    ) -> Result<Vec<usize>> {
        let result = self.step(&mut op.handle, request, inputs, extra);
        if !op.is_active() {
            op.pending = 0;
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn nonce_longer_than_descriptor_slot_is_rejected() {
        let err = nonce(&[0u8; 17]).unwrap_err();
        assert_eq!(err, ClientError::Status(ErrorCode::InvalidArgument));
        assert_eq!(nonce(&[7u8; 12]).unwrap().as_slice(), &[7u8; 12]);
    }
}
