//! Authenticated encryption: AES-GCM and ChaCha20-Poly1305.
//!
//! Both use a 12-byte nonce and a 16-byte tag. One-shot encryption returns
//! `ciphertext || tag`. The multi-part engine buffers associated data and
//! input and seals or opens everything at `finish` / `verify`, so `update`
//! produces no output.

use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::{
    ChaCha20Poly1305,
    aead::{Aead, KeyInit, Payload},
};
use tessera_proto::{Algorithm, KeyType};
use zeroize::Zeroizing;

use crate::{
    cipher::Direction,
    error::{CryptoError, Result},
};

/// Nonce length of every supported AEAD.
pub const NONCE_LENGTH: usize = 12;

/// Tag length of every supported AEAD.
pub const TAG_LENGTH: usize = 16;

/// Default bound on associated data plus input buffered by one multi-part
/// operation.
pub const DEFAULT_BUFFER_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl Scheme {
    fn select(alg: Algorithm, key_type: KeyType, key: &[u8]) -> Result<Self> {
        if !alg.is_aead() {
            return Err(CryptoError::InvalidArgument("not an AEAD algorithm"));
        }
        match (alg, key_type, key.len()) {
            (Algorithm::GCM, KeyType::AES, 16) => Ok(Self::Aes128Gcm),
            (Algorithm::GCM, KeyType::AES, 32) => Ok(Self::Aes256Gcm),
            (Algorithm::GCM, KeyType::AES, 24) => Err(CryptoError::NotSupported),
            (Algorithm::GCM, KeyType::AES, _) => Err(CryptoError::InvalidArgument("AES key size")),
            (Algorithm::CHACHA20_POLY1305, KeyType::CHACHA20, 32) => Ok(Self::ChaCha20Poly1305),
            (Algorithm::CHACHA20_POLY1305, KeyType::CHACHA20, _) => {
                Err(CryptoError::InvalidArgument("ChaCha20 key must be 32 bytes"))
            },
            (Algorithm::GCM | Algorithm::CHACHA20_POLY1305, _, _) => {
                Err(CryptoError::InvalidArgument("key type does not match algorithm"))
            },
            _ => Err(CryptoError::NotSupported),
        }
    }

    fn seal(self, key: &[u8], nonce: &[u8], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
        check_nonce(nonce)?;
        let payload = Payload { msg, aad };
        let key_err = |_| CryptoError::InvalidArgument("AEAD key");
        let sealed = match self {
            Self::Aes128Gcm => Aes128Gcm::new_from_slice(key).map_err(key_err)?.encrypt(nonce.into(), payload),
            Self::Aes256Gcm => Aes256Gcm::new_from_slice(key).map_err(key_err)?.encrypt(nonce.into(), payload),
            Self::ChaCha20Poly1305 => {
                ChaCha20Poly1305::new_from_slice(key).map_err(key_err)?.encrypt(nonce.into(), payload)
            },
        };
        sealed.map_err(|_| CryptoError::InvalidArgument("AEAD input too long"))
    }

    fn open(self, key: &[u8], nonce: &[u8], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
        check_nonce(nonce)?;
        if msg.len() < TAG_LENGTH {
            return Err(CryptoError::InvalidSignature);
        }
        let payload = Payload { msg, aad };
        let key_err = |_| CryptoError::InvalidArgument("AEAD key");
        let opened = match self {
            Self::Aes128Gcm => Aes128Gcm::new_from_slice(key).map_err(key_err)?.decrypt(nonce.into(), payload),
            Self::Aes256Gcm => Aes256Gcm::new_from_slice(key).map_err(key_err)?.decrypt(nonce.into(), payload),
            Self::ChaCha20Poly1305 => {
                ChaCha20Poly1305::new_from_slice(key).map_err(key_err)?.decrypt(nonce.into(), payload)
            },
        };
        opened.map_err(|_| CryptoError::InvalidSignature)
    }
}

fn check_nonce(nonce: &[u8]) -> Result<()> {
    if nonce.len() == NONCE_LENGTH {
        Ok(())
    } else {
        Err(CryptoError::InvalidArgument("AEAD nonce must be 12 bytes"))
    }
}

/// One-shot encryption. Returns `ciphertext || tag`.
pub fn encrypt(
    alg: Algorithm,
    key_type: KeyType,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    Scheme::select(alg, key_type, key)?.seal(key, nonce, aad, plaintext)
}

/// One-shot decryption of `ciphertext || tag`.
pub fn decrypt(
    alg: Algorithm,
    key_type: KeyType,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    Scheme::select(alg, key_type, key)?.open(key, nonce, aad, ciphertext)
}

/// Multi-part AEAD state.
pub struct AeadEngine {
    scheme: Scheme,
    direction: Direction,
    key: Zeroizing<Vec<u8>>,
    nonce: Option<[u8; NONCE_LENGTH]>,
    lengths: Option<(u64, u64)>,
    aad: Vec<u8>,
    input: Zeroizing<Vec<u8>>,
    input_started: bool,
    buffer_limit: usize,
}

impl std::fmt::Debug for AeadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadEngine")
            .field("scheme", &self.scheme)
            .field("direction", &self.direction)
            .field("nonce_set", &self.nonce.is_some())
            .field("lengths", &self.lengths)
            .finish_non_exhaustive()
    }
}

impl AeadEngine {
    /// Prepare an operation. A nonce must be set before any data.
    pub fn new(alg: Algorithm, key_type: KeyType, key: &[u8], direction: Direction) -> Result<Self> {
        let scheme = Scheme::select(alg, key_type, key)?;
        Ok(Self {
            scheme,
            direction,
            key: Zeroizing::new(key.to_vec()),
            nonce: None,
            lengths: None,
            aad: Vec::new(),
            input: Zeroizing::new(Vec::new()),
            input_started: false,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
        })
    }

    /// Bound the associated data and input buffered until `finish` /
    /// `verify`.
    #[must_use]
    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = limit;
        self
    }

    /// Direction chosen at setup.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Install a caller-chosen nonce.
    pub fn set_nonce(&mut self, nonce: &[u8]) -> Result<()> {
        if self.nonce.is_some() {
            return Err(CryptoError::BadState("nonce already set"));
        }
        let nonce: [u8; NONCE_LENGTH] =
            nonce.try_into().map_err(|_| CryptoError::InvalidArgument("AEAD nonce must be 12 bytes"))?;
        self.nonce = Some(nonce);
        Ok(())
    }

    /// Install a fresh nonce drawn from `fill` and return it.
    pub fn generate_nonce(&mut self, fill: impl FnOnce(&mut [u8])) -> Result<[u8; NONCE_LENGTH]> {
        if self.direction != Direction::Encrypt {
            return Err(CryptoError::BadState("nonce generation needs an encrypt operation"));
        }
        let mut nonce = [0u8; NONCE_LENGTH];
        fill(&mut nonce);
        self.set_nonce(&nonce)?;
        Ok(nonce)
    }

    /// Declare the total associated-data and plaintext lengths up front.
    pub fn set_lengths(&mut self, ad_length: u64, plaintext_length: u64) -> Result<()> {
        if self.lengths.is_some() {
            return Err(CryptoError::BadState("lengths already set"));
        }
        if !self.aad.is_empty() || self.input_started {
            return Err(CryptoError::BadState("lengths must precede data"));
        }
        self.lengths = Some((ad_length, plaintext_length));
        Ok(())
    }

    /// Absorb associated data. Not allowed once input has started.
    pub fn update_ad(&mut self, data: &[u8]) -> Result<()> {
        self.require_nonce()?;
        if self.input_started {
            return Err(CryptoError::BadState("associated data after input"));
        }
        if let Some((ad_length, _)) = self.lengths {
            if (self.aad.len() + data.len()) as u64 > ad_length {
                return Err(CryptoError::InvalidArgument("more associated data than declared"));
            }
        }
        self.reserve(data.len())?;
        self.aad.extend_from_slice(data);
        Ok(())
    }

    /// Absorb input. Output is produced at `finish` / `verify`.
    pub fn update(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.require_nonce()?;
        if let Some((ad_length, text_length)) = self.lengths {
            if self.aad.len() as u64 != ad_length {
                return Err(CryptoError::InvalidArgument("less associated data than declared"));
            }
            if (self.input.len() + data.len()) as u64 > text_length {
                return Err(CryptoError::InvalidArgument("more input than declared"));
            }
        }
        self.reserve(data.len())?;
        self.input_started = true;
        self.input.extend_from_slice(data);
        Ok(Vec::new())
    }

    /// Seal. Returns `(ciphertext, tag)`.
    pub fn finish(self) -> Result<(Vec<u8>, [u8; TAG_LENGTH])> {
        if self.direction != Direction::Encrypt {
            return Err(CryptoError::BadState("finish needs an encrypt operation"));
        }
        let nonce = self.require_nonce()?;
        self.check_totals()?;
        let mut sealed = self.scheme.seal(&self.key, &nonce, &self.aad, &self.input)?;
        let split = sealed.len() - TAG_LENGTH;
        let mut tag = [0u8; TAG_LENGTH];
        tag.copy_from_slice(&sealed[split..]);
        sealed.truncate(split);
        Ok((sealed, tag))
    }

    /// Open with `tag`. Returns the plaintext.
    pub fn verify(self, tag: &[u8]) -> Result<Vec<u8>> {
        if self.direction != Direction::Decrypt {
            return Err(CryptoError::BadState("verify needs a decrypt operation"));
        }
        let nonce = self.require_nonce()?;
        self.check_totals()?;
        if tag.len() != TAG_LENGTH {
            return Err(CryptoError::InvalidSignature);
        }
        let mut sealed = self.input.to_vec();
        sealed.extend_from_slice(tag);
        self.scheme.open(&self.key, &nonce, &self.aad, &sealed)
    }

    fn reserve(&self, more: usize) -> Result<()> {
        let buffered = self.aad.len() + self.input.len();
        if buffered.saturating_add(more) > self.buffer_limit {
            return Err(CryptoError::InsufficientMemory(self.buffer_limit));
        }
        Ok(())
    }

    fn require_nonce(&self) -> Result<[u8; NONCE_LENGTH]> {
        self.nonce.ok_or(CryptoError::BadState("nonce not set"))
    }

    fn check_totals(&self) -> Result<()> {
        match self.lengths {
            Some((ad, text)) if self.aad.len() as u64 != ad || self.input.len() as u64 != text => {
                Err(CryptoError::InvalidArgument("data length differs from declared length"))
            },
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hex_literal::hex;
    use tessera_proto::ErrorCode;

    use super::*;

    const KEY: [u8; 32] = [0x42; 32];
    const NONCE: [u8; 12] = [7; 12];

    #[test]
    fn aes128_gcm_empty_vector() {
        // NIST GCM test case 1: zero key, zero IV, no data.
        let sealed = encrypt(Algorithm::GCM, KeyType::AES, &[0; 16], &[0; 12], b"", b"").unwrap();
        assert_eq!(sealed, hex!("58e2fccefa7e3061367f1d57a4e7455a"));
    }

    #[test]
    fn chacha_round_trip_and_tamper() {
        let sealed =
            encrypt(Algorithm::CHACHA20_POLY1305, KeyType::CHACHA20, &KEY, &NONCE, b"hdr", b"secret")
                .unwrap();
        assert_eq!(sealed.len(), 6 + TAG_LENGTH);
        let opened =
            decrypt(Algorithm::CHACHA20_POLY1305, KeyType::CHACHA20, &KEY, &NONCE, b"hdr", &sealed)
                .unwrap();
        assert_eq!(opened, b"secret");

        let mut bad = sealed.clone();
        *bad.last_mut().unwrap() ^= 0x80;
        assert_eq!(
            decrypt(Algorithm::CHACHA20_POLY1305, KeyType::CHACHA20, &KEY, &NONCE, b"hdr", &bad),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn multipart_matches_one_shot() {
        let mut op = AeadEngine::new(Algorithm::GCM, KeyType::AES, &KEY, Direction::Encrypt).unwrap();
        op.set_lengths(3, 10).unwrap();
        op.set_nonce(&NONCE).unwrap();
        op.update_ad(b"h").unwrap();
        op.update_ad(b"dr").unwrap();
        assert!(op.update(b"hello").unwrap().is_empty());
        op.update(b"world").unwrap();
        let (ciphertext, tag) = op.finish().unwrap();

        let mut sealed = ciphertext.clone();
        sealed.extend_from_slice(&tag);
        assert_eq!(
            sealed,
            encrypt(Algorithm::GCM, KeyType::AES, &KEY, &NONCE, b"hdr", b"helloworld").unwrap()
        );

        let mut op = AeadEngine::new(Algorithm::GCM, KeyType::AES, &KEY, Direction::Decrypt).unwrap();
        op.set_nonce(&NONCE).unwrap();
        op.update_ad(b"hdr").unwrap();
        op.update(&ciphertext).unwrap();
        assert_eq!(op.verify(&tag).unwrap(), b"helloworld");
    }

    #[test]
    fn multipart_buffer_is_bounded() {
        let mut op =
            AeadEngine::new(Algorithm::GCM, KeyType::AES, &KEY, Direction::Encrypt).unwrap().with_buffer_limit(8);
        op.set_nonce(&NONCE).unwrap();
        op.update_ad(b"abc").unwrap();
        op.update(b"defgh").unwrap();
        assert_eq!(op.update(b"i"), Err(CryptoError::InsufficientMemory(8)));
        assert_eq!(ErrorCode::from(CryptoError::InsufficientMemory(8)), ErrorCode::InsufficientMemory);

        let (ciphertext, _) = op.finish().unwrap();
        assert_eq!(ciphertext.len(), 5);
    }

    #[test]
    fn ordering_rules() {
        let mut op = AeadEngine::new(Algorithm::GCM, KeyType::AES, &KEY, Direction::Encrypt).unwrap();
        assert!(matches!(op.update(b"x"), Err(CryptoError::BadState(_))));
        op.set_nonce(&NONCE).unwrap();
        op.update(b"x").unwrap();
        assert!(matches!(op.update_ad(b"late"), Err(CryptoError::BadState(_))));
        assert!(matches!(op.set_lengths(0, 1), Err(CryptoError::BadState(_))));
    }

    #[test]
    fn declared_lengths_enforced() {
        let mut op = AeadEngine::new(Algorithm::GCM, KeyType::AES, &KEY, Direction::Encrypt).unwrap();
        op.set_lengths(0, 2).unwrap();
        op.set_nonce(&NONCE).unwrap();
        assert!(matches!(op.update(b"abc"), Err(CryptoError::InvalidArgument(_))));
        op.update(b"a").unwrap();
        assert!(matches!(op.finish(), Err(CryptoError::InvalidArgument(_))));
    }

    #[test]
    fn key_and_nonce_checks() {
        assert_eq!(
            encrypt(Algorithm::GCM, KeyType::AES, &[0; 24], &NONCE, b"", b"").unwrap_err(),
            CryptoError::NotSupported
        );
        assert!(matches!(
            encrypt(Algorithm::GCM, KeyType::CHACHA20, &KEY, &NONCE, b"", b""),
            Err(CryptoError::InvalidArgument(_))
        ));
        assert!(matches!(
            encrypt(Algorithm::GCM, KeyType::AES, &KEY, &NONCE[..8], b"", b""),
            Err(CryptoError::InvalidArgument(_))
        ));
    }
}
