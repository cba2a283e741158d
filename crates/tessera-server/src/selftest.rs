//! Self-test workload.
//!
//! Exercises every operation family once through a [`CryptoClient`] and
//! checks that single-part and multi-part paths agree. Keys are volatile
//! and destroyed after each check, so the workload can run repeatedly and
//! from many clients at once.

use tessera_client::{
    AeadOperation, CipherOperation, ClientError, CryptoClient, HashOperation, KeyDerivationOperation,
    MacOperation, Transport,
};
use tessera_crypto::{agreement, sign};
use tessera_proto::{Algorithm, DerivationStep, KeyAttributes, KeyId, KeyType, KeyUsage};
use thiserror::Error;

/// Self-test failure.
#[derive(Debug, Error)]
pub enum SelfTestError {
    /// A call failed.
    #[error("{check}: {source}")]
    Call {
        /// Check that was running.
        check: &'static str,
        /// Client error.
        source: ClientError,
    },

    /// Two paths that must agree did not.
    #[error("{0}: results disagree")]
    Mismatch(&'static str),
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelfTestReport {
    /// Checks that passed.
    pub checks: usize,
}

struct Run<'c, T: Transport> {
    client: &'c mut CryptoClient<T>,
    keys: Vec<KeyId>,
    checks: usize,
}

trait Context<V> {
    fn check(self, name: &'static str) -> Result<V, SelfTestError>;
}

impl<V> Context<V> for Result<V, ClientError> {
    fn check(self, name: &'static str) -> Result<V, SelfTestError> {
        self.map_err(|source| SelfTestError::Call { check: name, source })
    }
}

fn agree(name: &'static str, ok: bool) -> Result<(), SelfTestError> {
    if ok { Ok(()) } else { Err(SelfTestError::Mismatch(name)) }
}

/// Run every check once.
pub fn run_selftest<T: Transport>(client: &mut CryptoClient<T>) -> Result<SelfTestReport, SelfTestError> {
    let mut run = Run { client, keys: Vec::new(), checks: 0 };
    let outcome = run.all();
    run.release();
    outcome.map(|()| SelfTestReport { checks: run.checks })
}

impl<T: Transport> Run<'_, T> {
    fn all(&mut self) -> Result<(), SelfTestError> {
        self.random()?;
        self.hash()?;
        self.mac()?;
        self.cipher()?;
        self.aead()?;
        self.signature()?;
        self.derivation()?;
        Ok(())
    }

    fn pass(&mut self, name: &'static str) {
        tracing::debug!(check = name, "self-test check passed");
        self.checks += 1;
        self.release();
    }

    /// Destroy the keys the current check created.
    fn release(&mut self) {
        for key in std::mem::take(&mut self.keys) {
            if let Err(err) = self.client.destroy_key(key) {
                tracing::warn!(key = key.0, %err, "self-test key not destroyed");
            }
        }
    }

    fn generate(&mut self, attributes: KeyAttributes) -> Result<KeyId, SelfTestError> {
        let key = self.client.generate_key(&attributes).check("generate_key")?;
        self.keys.push(key);
        Ok(key)
    }

    fn random(&mut self) -> Result<(), SelfTestError> {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        self.client.generate_random(&mut a).check("random")?;
        self.client.generate_random(&mut b).check("random")?;
        agree("random", a != b)?;
        self.pass("random");
        Ok(())
    }

    fn hash(&mut self) -> Result<(), SelfTestError> {
        let alg = Algorithm::SHA_256;
        let digest = self.client.hash_compute(alg, b"tessera self-test").check("hash_compute")?;
        self.client.hash_compare(alg, b"tessera self-test", &digest).check("hash_compare")?;

        let mut op = HashOperation::new();
        let mut copy = HashOperation::new();
        self.client.hash_setup(&mut op, alg).check("hash_setup")?;
        self.client.hash_update(&mut op, b"tessera ").check("hash_update")?;
        self.client.hash_clone(&op, &mut copy).check("hash_clone")?;
        self.client.hash_update(&mut op, b"self-test").check("hash_update")?;
        self.client.hash_update(&mut copy, b"self-test").check("hash_update")?;
        let multi = self.client.hash_finish(&mut op).check("hash_finish")?;
        self.client.hash_verify(&mut copy, &digest).check("hash_verify")?;
        agree("hash", multi == digest)?;
        self.pass("hash");
        Ok(())
    }

    fn mac(&mut self) -> Result<(), SelfTestError> {
        let alg = Algorithm::hmac(Algorithm::SHA_256);
        let key = self.generate(
            KeyAttributes::new(KeyType::HMAC)
                .with_bits(256)
                .with_usage(KeyUsage::SIGN_MESSAGE | KeyUsage::VERIFY_MESSAGE)
                .with_algorithm(alg),
        )?;
        let mac = self.client.mac_compute(key, alg, b"message").check("mac_compute")?;
        self.client.mac_verify(key, alg, b"message", &mac).check("mac_verify")?;

        let mut op = MacOperation::new();
        self.client.mac_sign_setup(&mut op, key, alg).check("mac_sign_setup")?;
        self.client.mac_update(&mut op, b"mess").check("mac_update")?;
        self.client.mac_update(&mut op, b"age").check("mac_update")?;
        let multi = self.client.mac_sign_finish(&mut op).check("mac_sign_finish")?;
        agree("mac", multi == mac)?;

        self.client.mac_verify_setup(&mut op, key, alg).check("mac_verify_setup")?;
        self.client.mac_update(&mut op, b"message").check("mac_update")?;
        self.client.mac_verify_finish(&mut op, &mac).check("mac_verify_finish")?;
        self.pass("mac");
        Ok(())
    }

    fn cipher(&mut self) -> Result<(), SelfTestError> {
        let alg = Algorithm::STREAM_CIPHER;
        let key = self.generate(
            KeyAttributes::new(KeyType::CHACHA20)
                .with_bits(256)
                .with_usage(KeyUsage::ENCRYPT | KeyUsage::DECRYPT)
                .with_algorithm(alg),
        )?;
        let plaintext = b"stream cipher self-test";
        let sealed = self.client.cipher_encrypt(key, alg, plaintext).check("cipher_encrypt")?;
        let opened = self.client.cipher_decrypt(key, alg, &sealed).check("cipher_decrypt")?;
        agree("cipher", opened == plaintext)?;

        let mut op = CipherOperation::new();
        self.client.cipher_encrypt_setup(&mut op, key, alg).check("cipher_encrypt_setup")?;
        let iv = self.client.cipher_generate_iv(&mut op).check("cipher_generate_iv")?;
        let mut ciphertext = self.client.cipher_update(&mut op, plaintext).check("cipher_update")?;
        ciphertext.extend(self.client.cipher_finish(&mut op).check("cipher_finish")?);

        self.client.cipher_decrypt_setup(&mut op, key, alg).check("cipher_decrypt_setup")?;
        self.client.cipher_set_iv(&mut op, &iv).check("cipher_set_iv")?;
        let mut recovered = self.client.cipher_update(&mut op, &ciphertext).check("cipher_update")?;
        recovered.extend(self.client.cipher_finish(&mut op).check("cipher_finish")?);
        agree("cipher", recovered == plaintext)?;
        self.pass("cipher");
        Ok(())
    }

    fn aead(&mut self) -> Result<(), SelfTestError> {
        let alg = Algorithm::CHACHA20_POLY1305;
        let key = self.generate(
            KeyAttributes::new(KeyType::CHACHA20)
                .with_bits(256)
                .with_usage(KeyUsage::ENCRYPT | KeyUsage::DECRYPT)
                .with_algorithm(alg),
        )?;
        let nonce = [0x24u8; 12];
        let sealed = self.client.aead_encrypt(key, alg, &nonce, b"header", b"payload").check("aead_encrypt")?;

        let mut op = AeadOperation::new();
        self.client.aead_encrypt_setup(&mut op, key, alg).check("aead_encrypt_setup")?;
        self.client.aead_set_nonce(&mut op, &nonce).check("aead_set_nonce")?;
        self.client.aead_set_lengths(&mut op, 6, 7).check("aead_set_lengths")?;
        self.client.aead_update_ad(&mut op, b"header").check("aead_update_ad")?;
        self.client.aead_update(&mut op, b"pay").check("aead_update")?;
        self.client.aead_update(&mut op, b"load").check("aead_update")?;
        let (mut ciphertext, tag) = self.client.aead_finish(&mut op).check("aead_finish")?;
        let split = ciphertext.len();
        ciphertext.extend_from_slice(&tag);
        agree("aead", ciphertext == sealed)?;

        self.client.aead_decrypt_setup(&mut op, key, alg).check("aead_decrypt_setup")?;
        self.client.aead_set_nonce(&mut op, &nonce).check("aead_set_nonce")?;
        self.client.aead_update_ad(&mut op, b"header").check("aead_update_ad")?;
        self.client.aead_update(&mut op, &sealed[..split]).check("aead_update")?;
        let opened = self.client.aead_verify(&mut op, &tag).check("aead_verify")?;
        agree("aead", opened == b"payload")?;

        let direct = self.client.aead_decrypt(key, alg, &nonce, b"header", &sealed).check("aead_decrypt")?;
        agree("aead", direct == b"payload")?;
        self.pass("aead");
        Ok(())
    }

    fn signature(&mut self) -> Result<(), SelfTestError> {
        let alg = Algorithm::PURE_EDDSA;
        let key = self.generate(
            KeyAttributes::new(sign::ED25519_PAIR)
                .with_usage(KeyUsage::SIGN_MESSAGE | KeyUsage::VERIFY_MESSAGE)
                .with_algorithm(alg),
        )?;
        let signature = self.client.sign_message(key, alg, b"signed").check("sign_message")?;
        self.client.verify_message(key, alg, b"signed", &signature).check("verify_message")?;

        let public = self.client.export_public_key(key).check("export_public_key")?;
        let attributes = KeyAttributes::new(sign::ED25519_PUBLIC)
            .with_usage(KeyUsage::VERIFY_MESSAGE)
            .with_algorithm(alg);
        let verifier = self.client.import_key(&attributes, &public).check("import_key")?;
        self.keys.push(verifier);
        self.client.verify_message(verifier, alg, b"signed", &signature).check("verify_message")?;
        self.pass("signature");
        Ok(())
    }

    fn derivation(&mut self) -> Result<(), SelfTestError> {
        let ecdh = Algorithm::ECDH;
        let attributes = KeyAttributes::new(agreement::X25519_PAIR).with_usage(KeyUsage::DERIVE).with_algorithm(ecdh);
        let ours = self.generate(attributes)?;
        let theirs = self.generate(attributes)?;
        let our_public = self.client.export_public_key(ours).check("export_public_key")?;
        let their_public = self.client.export_public_key(theirs).check("export_public_key")?;
        let a = self.client.raw_key_agreement(ours, ecdh, &their_public).check("raw_key_agreement")?;
        let b = self.client.raw_key_agreement(theirs, ecdh, &our_public).check("raw_key_agreement")?;
        agree("agreement", a == b)?;

        let hkdf = Algorithm::hkdf(Algorithm::SHA_256);
        let secret = self.generate(
            KeyAttributes::new(KeyType::DERIVE).with_bits(256).with_usage(KeyUsage::DERIVE).with_algorithm(hkdf),
        )?;
        let mut op = KeyDerivationOperation::new();
        self.client.key_derivation_setup(&mut op, hkdf).check("key_derivation_setup")?;
        self.client.key_derivation_input_bytes(&mut op, DerivationStep::Salt, b"salt").check("input_bytes")?;
        self.client.key_derivation_input_key(&mut op, DerivationStep::Secret, secret).check("input_key")?;
        self.client.key_derivation_input_bytes(&mut op, DerivationStep::Info, b"info").check("input_bytes")?;
        let before = self.client.key_derivation_get_capacity(&mut op).check("get_capacity")?;
        let bytes = self.client.key_derivation_output_bytes(&mut op, 16).check("output_bytes")?;
        let after = self.client.key_derivation_get_capacity(&mut op).check("get_capacity")?;
        agree("derivation", bytes.len() == 16 && before.checked_sub(after) == Some(16))?;

        let derived = KeyAttributes::new(KeyType::HMAC)
            .with_bits(256)
            .with_usage(KeyUsage::SIGN_MESSAGE)
            .with_algorithm(Algorithm::hmac(Algorithm::SHA_256));
        let key = self.client.key_derivation_output_key(&mut op, &derived).check("output_key")?;
        self.keys.push(key);
        self.client.key_derivation_abort(&mut op).check("key_derivation_abort")?;
        agree("derivation", !op.is_active())?;
        self.pass("derivation");
        Ok(())
    }
}
