//! Ed25519 signatures (pure EdDSA).

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use tessera_proto::{Algorithm, KeyType};
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

/// Length of an Ed25519 signature.
pub const SIGNATURE_LENGTH: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// Ed25519 key pair type.
pub const ED25519_PAIR: KeyType = KeyType::ecc_key_pair(KeyType::FAMILY_TWISTED_EDWARDS);

/// Ed25519 public key type.
pub const ED25519_PUBLIC: KeyType = KeyType::ecc_public_key(KeyType::FAMILY_TWISTED_EDWARDS);

fn check_algorithm(alg: Algorithm) -> Result<()> {
    if !alg.is_sign() {
        return Err(CryptoError::InvalidArgument("not a signature algorithm"));
    }
    if alg != Algorithm::PURE_EDDSA {
        return Err(CryptoError::NotSupported);
    }
    Ok(())
}

pub(crate) fn signing_key(key: &[u8]) -> Result<SigningKey> {
    let seed: Zeroizing<[u8; 32]> = Zeroizing::new(
        key.try_into().map_err(|_| CryptoError::InvalidArgument("Ed25519 private key must be 32 bytes"))?,
    );
    Ok(SigningKey::from_bytes(&seed))
}

pub(crate) fn verifying_key(key: &[u8]) -> Result<VerifyingKey> {
    let bytes: [u8; 32] =
        key.try_into().map_err(|_| CryptoError::InvalidArgument("Ed25519 public key must be 32 bytes"))?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidArgument("Ed25519 public key"))
}

/// Sign `message` with a key pair.
pub fn sign_message(alg: Algorithm, key_type: KeyType, key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    check_algorithm(alg)?;
    if key_type != ED25519_PAIR {
        return Err(CryptoError::InvalidArgument("signing needs an Ed25519 key pair"));
    }
    Ok(signing_key(key)?.sign(message).to_bytes().to_vec())
}

/// Verify `signature` over `message` with a key pair or public key.
pub fn verify_message(
    alg: Algorithm,
    key_type: KeyType,
    key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<()> {
    check_algorithm(alg)?;
    let public = match key_type {
        ED25519_PAIR => signing_key(key)?.verifying_key(),
        ED25519_PUBLIC => verifying_key(key)?,
        _ => return Err(CryptoError::InvalidArgument("verification needs an Ed25519 key")),
    };
    let signature = Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;
    public.verify(message, &signature).map_err(|_| CryptoError::InvalidSignature)
}

/// Hash signing. Pure EdDSA signs messages only, and no hash-and-sign
/// scheme is provided, so a valid request is reported as unsupported.
pub fn sign_hash(alg: Algorithm, key_type: KeyType) -> Result<Vec<u8>> {
    if !alg.is_sign() {
        return Err(CryptoError::InvalidArgument("not a signature algorithm"));
    }
    if alg == Algorithm::PURE_EDDSA {
        return Err(CryptoError::InvalidArgument("pure EdDSA cannot sign a hash"));
    }
    if !key_type.is_key_pair() {
        return Err(CryptoError::InvalidArgument("signing needs a key pair"));
    }
    Err(CryptoError::NotSupported)
}

/// Hash verification. See [`sign_hash`].
pub fn verify_hash(alg: Algorithm, key_type: KeyType) -> Result<()> {
    if !alg.is_sign() {
        return Err(CryptoError::InvalidArgument("not a signature algorithm"));
    }
    if alg == Algorithm::PURE_EDDSA {
        return Err(CryptoError::InvalidArgument("pure EdDSA cannot verify a hash"));
    }
    if !key_type.is_key_pair() && !key_type.is_public_key() {
        return Err(CryptoError::InvalidArgument("verification needs an asymmetric key"));
    }
    Err(CryptoError::NotSupported)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hex_literal::hex;

    use super::*;

    // RFC 8032 test 2.
    const SECRET: [u8; 32] = hex!("4ccd089b28ff96da9db6c346ec114e0f5b8a319f35aba624da8cf6ed4fb8a6fb");
    const PUBLIC: [u8; 32] = hex!("3d4017c3e843895a92b70aa74d1b7ebc9c982ccf2ec4968cc0cd55f12af4660c");

    #[test]
    fn rfc8032_one_byte_message() {
        let sig = sign_message(Algorithm::PURE_EDDSA, ED25519_PAIR, &SECRET, &[0x72]).unwrap();
        assert_eq!(
            sig,
            hex!(
                "92a009a9f0d4cab8720e820b5f642540a2b27b5416503f8fb3762223ebdb69da"
                "085ac1e43e15996e458f3613d0f11d8c387b2eaeb4302aeeb00d291612bb0c00"
            )
        );
        verify_message(Algorithm::PURE_EDDSA, ED25519_PUBLIC, &PUBLIC, &[0x72], &sig).unwrap();
        verify_message(Algorithm::PURE_EDDSA, ED25519_PAIR, &SECRET, &[0x72], &sig).unwrap();
    }

    #[test]
    fn altered_message_fails() {
        let sig = sign_message(Algorithm::PURE_EDDSA, ED25519_PAIR, &SECRET, b"hello").unwrap();
        assert_eq!(
            verify_message(Algorithm::PURE_EDDSA, ED25519_PUBLIC, &PUBLIC, b"hellp", &sig),
            Err(CryptoError::InvalidSignature)
        );
        assert_eq!(
            verify_message(Algorithm::PURE_EDDSA, ED25519_PUBLIC, &PUBLIC, b"hello", &sig[..10]),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn public_key_cannot_sign() {
        assert!(matches!(
            sign_message(Algorithm::PURE_EDDSA, ED25519_PUBLIC, &PUBLIC, b"x"),
            Err(CryptoError::InvalidArgument(_))
        ));
        assert!(matches!(
            sign_message(Algorithm::GCM, ED25519_PAIR, &SECRET, b"x"),
            Err(CryptoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn hash_signing_unsupported() {
        assert_eq!(sign_hash(Algorithm(0x0600_0609), ED25519_PAIR), Err(CryptoError::NotSupported));
        assert!(matches!(sign_hash(Algorithm::PURE_EDDSA, ED25519_PAIR), Err(CryptoError::InvalidArgument(_))));
        assert!(matches!(verify_hash(Algorithm::SHA_256, ED25519_PUBLIC), Err(CryptoError::InvalidArgument(_))));
    }
}
