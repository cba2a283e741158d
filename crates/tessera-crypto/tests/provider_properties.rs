//! Property tests for the provider's authenticated encryption, hashing and
//! derivation.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use tessera_crypto::{
    AeadEngine, CryptoError, Direction, HashEngine, KeyDerivation,
    aead::{self, TAG_LENGTH},
    hash,
};
use tessera_proto::{Algorithm, DerivationStep, KeyType};

fn aead_scheme() -> impl Strategy<Value = (Algorithm, KeyType, Vec<u8>)> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 16).prop_map(|k| (Algorithm::GCM, KeyType::AES, k)),
        prop::collection::vec(any::<u8>(), 32).prop_map(|k| (Algorithm::GCM, KeyType::AES, k)),
        prop::collection::vec(any::<u8>(), 32)
            .prop_map(|k| (Algorithm::CHACHA20_POLY1305, KeyType::CHACHA20, k)),
    ]
}

proptest! {
    #[test]
    fn aead_round_trip_and_tag_corruption(
        (alg, key_type, key) in aead_scheme(),
        nonce in any::<[u8; 12]>(),
        ad in prop::collection::vec(any::<u8>(), 0..64),
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
        flip in any::<(usize, u8)>(),
    ) {
        let sealed = aead::encrypt(alg, key_type, &key, &nonce, &ad, &plaintext).unwrap();
        prop_assert_eq!(sealed.len(), plaintext.len() + TAG_LENGTH);

        let opened = aead::decrypt(alg, key_type, &key, &nonce, &ad, &sealed).unwrap();
        prop_assert_eq!(&opened, &plaintext);

        let (index, mask) = flip;
        let tag_byte = plaintext.len() + index % TAG_LENGTH;
        let mut corrupted = sealed.clone();
        corrupted[tag_byte] ^= mask.max(1);
        prop_assert_eq!(
            aead::decrypt(alg, key_type, &key, &nonce, &ad, &corrupted),
            Err(CryptoError::InvalidSignature)
        );

        let (ciphertext, tag) = sealed.split_at(plaintext.len());
        let mut tag = tag.to_vec();
        tag[index % TAG_LENGTH] ^= mask.max(1);
        let mut op = AeadEngine::new(alg, key_type, &key, Direction::Decrypt).unwrap();
        op.set_nonce(&nonce).unwrap();
        op.update_ad(&ad).unwrap();
        op.update(ciphertext).unwrap();
        prop_assert_eq!(op.verify(&tag), Err(CryptoError::InvalidSignature));
    }

    #[test]
    fn hash_clone_branches_match_single_stream(
        prefix in prop::collection::vec(any::<u8>(), 0..128),
        left in prop::collection::vec(any::<u8>(), 1..64),
        right in prop::collection::vec(any::<u8>(), 1..64),
    ) {
        prop_assume!(left != right);

        let mut base = HashEngine::new(Algorithm::SHA_256).unwrap();
        base.update(&prefix);
        let mut branch = base.clone();
        base.update(&left);
        branch.update(&right);

        let a = base.finalize();
        let b = branch.finalize();
        prop_assert_ne!(&a, &b);
        prop_assert_eq!(a, hash::compute(Algorithm::SHA_256, &[prefix.as_slice(), left.as_slice()].concat()).unwrap());
        prop_assert_eq!(b, hash::compute(Algorithm::SHA_256, &[prefix.as_slice(), right.as_slice()].concat()).unwrap());
    }

    #[test]
    fn derivation_never_exceeds_capacity(
        capacity in 0u64..512,
        reads in prop::collection::vec(0usize..96, 1..12),
    ) {
        let mut kdf = KeyDerivation::new(Algorithm::hkdf(Algorithm::SHA_256)).unwrap();
        kdf.input_bytes(DerivationStep::Secret, b"input keying material").unwrap();
        kdf.set_capacity(capacity).unwrap();

        let mut produced = 0u64;
        for len in reads {
            let mut out = vec![0u8; len];
            match kdf.output_bytes(&mut out) {
                Ok(()) => produced += len as u64,
                Err(err) => prop_assert_eq!(err, CryptoError::InsufficientData),
            }
            prop_assert!(produced <= capacity);
        }
    }
}
