//! X25519 key agreement.

use tessera_proto::{Algorithm, KeyType};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

/// X25519 key pair type.
pub const X25519_PAIR: KeyType = KeyType::ecc_key_pair(KeyType::FAMILY_MONTGOMERY);

/// X25519 public key type.
pub const X25519_PUBLIC: KeyType = KeyType::ecc_public_key(KeyType::FAMILY_MONTGOMERY);

/// Length of a shared secret.
pub const SHARED_SECRET_LENGTH: usize = 32;

pub(crate) fn static_secret(key: &[u8]) -> Result<StaticSecret> {
    let bytes: Zeroizing<[u8; 32]> = Zeroizing::new(
        key.try_into().map_err(|_| CryptoError::InvalidArgument("X25519 private key must be 32 bytes"))?,
    );
    Ok(StaticSecret::from(*bytes))
}

/// Public key of an X25519 private key.
pub(crate) fn public_key(key: &[u8]) -> Result<[u8; 32]> {
    Ok(PublicKey::from(&static_secret(key)?).to_bytes())
}

/// Raw agreement between our key pair and `peer`'s public key.
///
/// `alg` is either raw ECDH or a combined ECDH + KDF algorithm; only the
/// agreement half is used here. An all-zero shared secret (small-order peer
/// point) is rejected.
pub fn agree(alg: Algorithm, key_type: KeyType, key: &[u8], peer: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if !alg.is_raw_key_agreement() && !alg.is_combined_key_agreement() {
        return Err(CryptoError::InvalidArgument("not a key agreement algorithm"));
    }
    if alg.agreement_base() != Algorithm::ECDH {
        return Err(CryptoError::NotSupported);
    }
    if key_type != X25519_PAIR {
        return Err(CryptoError::InvalidArgument("agreement needs an X25519 key pair"));
    }
    let peer: [u8; 32] =
        peer.try_into().map_err(|_| CryptoError::InvalidArgument("peer key must be 32 bytes"))?;

    let shared = static_secret(key)?.diffie_hellman(&PublicKey::from(peer));
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidArgument("peer key has small order"));
    }
    Ok(Zeroizing::new(shared.as_bytes().to_vec()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hex_literal::hex;

    use super::*;

    // RFC 7748 section 6.1.
    const ALICE: [u8; 32] = hex!("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a");
    const ALICE_PUBLIC: [u8; 32] = hex!("8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a");
    const BOB: [u8; 32] = hex!("5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb");
    const BOB_PUBLIC: [u8; 32] = hex!("de9edb7d7b7dc1b4d35b61c2ece435373f8343c85b78674dadfc7e146f882b4f");
    const SHARED: [u8; 32] = hex!("4a5d9d5ba4ce2de1728e3bf480350f25e07e21c947d19e3376f09b3c1e161742");

    #[test]
    fn rfc7748_exchange() {
        assert_eq!(public_key(&ALICE).unwrap(), ALICE_PUBLIC);
        assert_eq!(public_key(&BOB).unwrap(), BOB_PUBLIC);

        let a = agree(Algorithm::ECDH, X25519_PAIR, &ALICE, &BOB_PUBLIC).unwrap();
        let b = agree(Algorithm::ECDH, X25519_PAIR, &BOB, &ALICE_PUBLIC).unwrap();
        assert_eq!(a.as_slice(), SHARED);
        assert_eq!(b.as_slice(), SHARED);
    }

    #[test]
    fn small_order_peer_rejected() {
        assert!(matches!(
            agree(Algorithm::ECDH, X25519_PAIR, &ALICE, &[0u8; 32]),
            Err(CryptoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn combined_algorithm_uses_agreement_half() {
        let alg = Algorithm::key_agreement(Algorithm::ECDH, Algorithm::hkdf(Algorithm::SHA_256));
        let a = agree(alg, X25519_PAIR, &ALICE, &BOB_PUBLIC).unwrap();
        assert_eq!(a.as_slice(), SHARED);
        assert!(matches!(
            agree(Algorithm::SHA_256, X25519_PAIR, &ALICE, &BOB_PUBLIC),
            Err(CryptoError::InvalidArgument(_))
        ));
        assert!(matches!(
            agree(Algorithm::ECDH, X25519_PUBLIC, &ALICE_PUBLIC, &BOB_PUBLIC),
            Err(CryptoError::InvalidArgument(_))
        ));
    }
}
