//! Unauthenticated stream cipher (ChaCha20).
//!
//! The IV is the 12-byte ChaCha20 nonce; the block counter starts at zero.
//! Encryption and decryption are the same keystream XOR, but the direction
//! still matters to the multi-part API: only an encrypting operation may
//! generate its IV.

use chacha20::{
    ChaCha20,
    cipher::{KeyIvInit, StreamCipher},
};
use tessera_proto::{Algorithm, KeyType};
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

/// IV length of the supported cipher.
pub const IV_LENGTH: usize = 12;

const KEY_LENGTH: usize = 32;

/// Direction of a cipher operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Encrypting.
    Encrypt,
    /// Decrypting.
    Decrypt,
}

fn check(alg: Algorithm, key_type: KeyType, key: &[u8]) -> Result<()> {
    if !alg.is_cipher() {
        return Err(CryptoError::InvalidArgument("not a cipher algorithm"));
    }
    if alg != Algorithm::STREAM_CIPHER || key_type != KeyType::CHACHA20 {
        return Err(CryptoError::NotSupported);
    }
    if key.len() != KEY_LENGTH {
        return Err(CryptoError::InvalidArgument("ChaCha20 key must be 32 bytes"));
    }
    Ok(())
}

fn keystream(key: &[u8], iv: &[u8]) -> Result<ChaCha20> {
    if iv.len() != IV_LENGTH {
        return Err(CryptoError::InvalidArgument("IV must be 12 bytes"));
    }
    ChaCha20::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidArgument("cipher key"))
}

/// Multi-part cipher state.
pub struct CipherEngine {
    direction: Direction,
    key: Zeroizing<Vec<u8>>,
    stream: Option<ChaCha20>,
}

impl std::fmt::Debug for CipherEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherEngine")
            .field("direction", &self.direction)
            .field("iv_set", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl CipherEngine {
    /// Prepare an operation. The IV must be set before any data.
    pub fn new(alg: Algorithm, key_type: KeyType, key: &[u8], direction: Direction) -> Result<Self> {
        check(alg, key_type, key)?;
        Ok(Self { direction, key: Zeroizing::new(key.to_vec()), stream: None })
    }

    /// Direction chosen at setup.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Install a caller-chosen IV.
    pub fn set_iv(&mut self, iv: &[u8]) -> Result<()> {
        if self.stream.is_some() {
            return Err(CryptoError::BadState("IV already set"));
        }
        self.stream = Some(keystream(&self.key, iv)?);
        Ok(())
    }

    /// Install a fresh IV drawn from `fill` and return it.
    pub fn generate_iv(&mut self, fill: impl FnOnce(&mut [u8])) -> Result<[u8; IV_LENGTH]> {
        if self.direction != Direction::Encrypt {
            return Err(CryptoError::BadState("IV generation needs an encrypt operation"));
        }
        let mut iv = [0u8; IV_LENGTH];
        fill(&mut iv);
        self.set_iv(&iv)?;
        Ok(iv)
    }

    /// Transform `data`. Output length equals input length.
    pub fn update(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(CryptoError::BadState("IV not set"))?;
        let mut out = data.to_vec();
        stream.apply_keystream(&mut out);
        Ok(out)
    }

    /// Complete the operation. A stream cipher has nothing buffered.
    pub fn finish(self) -> Result<Vec<u8>> {
        if self.stream.is_none() {
            return Err(CryptoError::BadState("IV not set"));
        }
        Ok(Vec::new())
    }
}

/// One-shot encryption under a caller-supplied IV.
pub fn encrypt(alg: Algorithm, key_type: KeyType, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    check(alg, key_type, key)?;
    let mut out = plaintext.to_vec();
    keystream(key, iv)?.apply_keystream(&mut out);
    Ok(out)
}

/// One-shot decryption of `IV || ciphertext`.
pub fn decrypt(alg: Algorithm, key_type: KeyType, key: &[u8], input: &[u8]) -> Result<Vec<u8>> {
    check(alg, key_type, key)?;
    if input.len() < IV_LENGTH {
        return Err(CryptoError::InvalidArgument("input shorter than the IV"));
    }
    let (iv, ciphertext) = input.split_at(IV_LENGTH);
    let mut out = ciphertext.to_vec();
    keystream(key, iv)?.apply_keystream(&mut out);
    Ok(out)
}
