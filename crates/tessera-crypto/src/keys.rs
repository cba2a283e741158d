//! Key material checks, generation and public-key export.

use tessera_proto::KeyType;
use zeroize::Zeroizing;

use crate::{
    agreement::{self, X25519_PAIR, X25519_PUBLIC},
    error::{CryptoError, Result},
    sign::{self, ED25519_PAIR, ED25519_PUBLIC},
};

/// Bit size reported for Curve25519 keys.
pub const CURVE25519_BITS: u16 = 255;

/// Largest symmetric key accepted, in bytes.
pub const MAX_SYMMETRIC_KEY: usize = 1024;

/// Byte length of a key of `key_type` with `bits` bits.
///
/// `bits == 0` is only accepted where the type has a single size.
pub fn key_length(key_type: KeyType, bits: u16) -> Result<usize> {
    match key_type {
        KeyType::AES => match bits {
            128 | 192 | 256 => Ok(usize::from(bits / 8)),
            _ => Err(CryptoError::InvalidArgument("AES keys are 128, 192 or 256 bits")),
        },
        KeyType::CHACHA20 => match bits {
            0 | 256 => Ok(32),
            _ => Err(CryptoError::InvalidArgument("ChaCha20 keys are 256 bits")),
        },
        KeyType::HMAC | KeyType::DERIVE | KeyType::RAW_DATA => {
            if bits == 0 || bits % 8 != 0 {
                return Err(CryptoError::InvalidArgument("symmetric key size must be a non-zero byte multiple"));
            }
            let len = usize::from(bits / 8);
            if len > MAX_SYMMETRIC_KEY {
                return Err(CryptoError::NotSupported);
            }
            Ok(len)
        },
        ED25519_PAIR | ED25519_PUBLIC | X25519_PAIR | X25519_PUBLIC => match bits {
            0 | CURVE25519_BITS => Ok(32),
            _ => Err(CryptoError::InvalidArgument("Curve25519 keys are 255 bits")),
        },
        KeyType::NONE => Err(CryptoError::InvalidArgument("key type not set")),
        _ => Err(CryptoError::NotSupported),
    }
}

/// Validate imported material against `key_type` and the declared `bits`
/// (zero for "infer"). Returns the actual bit size.
pub fn validate_import(key_type: KeyType, bits: u16, data: &[u8]) -> Result<u16> {
    if data.is_empty() {
        return Err(CryptoError::InvalidArgument("empty key material"));
    }
    let actual = match key_type {
        KeyType::AES | KeyType::CHACHA20 | KeyType::HMAC | KeyType::DERIVE | KeyType::RAW_DATA => {
            if data.len() > MAX_SYMMETRIC_KEY {
                return Err(CryptoError::NotSupported);
            }
            u16::try_from(data.len() * 8).map_err(|_| CryptoError::NotSupported)?
        },
        ED25519_PAIR | ED25519_PUBLIC | X25519_PAIR | X25519_PUBLIC => CURVE25519_BITS,
        _ => {
            key_length(key_type, bits)?;
            return Err(CryptoError::NotSupported);
        },
    };
    if bits != 0 && bits != actual {
        return Err(CryptoError::InvalidArgument("declared size differs from material"));
    }
    if key_length(key_type, actual)? != data.len() {
        return Err(CryptoError::InvalidArgument("key material has the wrong length"));
    }
    if key_type == ED25519_PUBLIC {
        sign::verifying_key(data)?;
    }
    Ok(actual)
}

/// Generate fresh material for `key_type`, drawing randomness from `fill`.
/// Returns the material and its bit size.
pub fn generate(key_type: KeyType, bits: u16, fill: impl FnOnce(&mut [u8])) -> Result<(Zeroizing<Vec<u8>>, u16)> {
    if key_type.is_public_key() {
        return Err(CryptoError::InvalidArgument("public keys cannot be generated"));
    }
    if bits == 0 && !matches!(key_type, KeyType::CHACHA20 | ED25519_PAIR | X25519_PAIR) {
        return Err(CryptoError::InvalidArgument("key size required"));
    }
    let len = key_length(key_type, bits)?;
    let mut material = Zeroizing::new(vec![0u8; len]);
    fill(&mut material);
    let bits = u16::try_from(len * 8).map_err(|_| CryptoError::NotSupported)?;
    let bits = if key_type.ecc_family().is_some() { CURVE25519_BITS } else { bits };
    Ok((material, bits))
}

/// Public half of `data`. Public keys export as themselves.
pub fn export_public(key_type: KeyType, data: &[u8]) -> Result<Vec<u8>> {
    match key_type {
        ED25519_PAIR => Ok(sign::signing_key(data)?.verifying_key().to_bytes().to_vec()),
        X25519_PAIR => Ok(agreement::public_key(data)?.to_vec()),
        ED25519_PUBLIC | X25519_PUBLIC => Ok(data.to_vec()),
        _ => Err(CryptoError::InvalidArgument("not an asymmetric key")),
    }
}
