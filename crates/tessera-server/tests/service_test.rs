//! Crypto service tests over the single-threaded runtime.

use tessera_client::{
    AeadOperation, ClientError, CryptoClient, HashOperation, KeyDerivationOperation, MacOperation,
};
use tessera_core::{ClientId, Fault, SpmError, Transport};
use tessera_crypto::{agreement, sign};
use tessera_proto::{
    Algorithm, DerivationStep, ErrorCode, KeyAttributes, KeyId, KeyType, KeyUsage, Nonce, Request,
};
use tessera_server::{CRYPTO_SID, CRYPTO_VERSION, LocalRuntime, MemoryStorage, ServiceConfig, run_selftest};

// Test environment using the thread RNG
#[derive(Clone, Debug)]
struct TestEnv;

impl tessera_core::Environment for TestEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::thread_rng().fill_bytes(buffer);
    }
}

type Client = CryptoClient<LocalRuntime<TestEnv>>;

const ALICE: ClientId = ClientId(1);
const BOB: ClientId = ClientId(2);

fn runtime(config: ServiceConfig, storage: MemoryStorage) -> LocalRuntime<TestEnv> {
    LocalRuntime::new(config, TestEnv, storage, ALICE).unwrap()
}

fn client_with(config: ServiceConfig) -> Client {
    CryptoClient::connect(runtime(config, MemoryStorage::new()), CRYPTO_SID, CRYPTO_VERSION).unwrap()
}

fn client() -> Client {
    client_with(ServiceConfig::default())
}

fn hmac_key(client: &mut Client, usage: KeyUsage) -> KeyId {
    let attributes = KeyAttributes::new(KeyType::HMAC)
        .with_bits(256)
        .with_usage(usage)
        .with_algorithm(Algorithm::hmac(Algorithm::SHA_256));
    client.import_key(&attributes, &[0x0b; 32]).unwrap()
}

fn status(err: ClientError) -> ErrorCode {
    assert!(!err.is_fatal(), "unexpected fatal error: {err}");
    err.status()
}

#[test]
fn selftest_passes() {
    let mut client = client();
    let report = run_selftest(&mut client).unwrap();
    assert_eq!(report.checks, 7);

    // Everything the workload created is gone again
    let partition = client.transport().partition();
    assert_eq!(partition.keys().loaded(), 0);
    assert!(partition.operations().is_empty());
}

#[test]
fn hash_matches_known_vector() {
    let mut client = client();
    let digest = client.hash_compute(Algorithm::SHA_256, b"abc").unwrap();
    assert_eq!(
        digest,
        hex_literal::hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
    );
}

#[test]
fn terminal_step_releases_the_operation() {
    let mut client = client();
    let mut op = HashOperation::new();
    client.hash_setup(&mut op, Algorithm::SHA_256).unwrap();
    assert!(op.is_active());
    assert_eq!(client.transport().partition().operations().len(), 1);

    client.hash_update(&mut op, b"abc").unwrap();
    client.hash_finish(&mut op).unwrap();
    assert!(!op.is_active());
    assert!(client.transport().partition().operations().is_empty());

    let err = client.hash_update(&mut op, b"more").unwrap_err();
    assert_eq!(status(err), ErrorCode::BadState);
}

#[test]
fn failed_step_aborts_the_operation() {
    let mut client = client();
    let mut op = HashOperation::new();
    client.hash_setup(&mut op, Algorithm::SHA_256).unwrap();
    client.hash_update(&mut op, b"abc").unwrap();

    let err = client.hash_verify(&mut op, &[0u8; 32]).unwrap_err();
    assert_eq!(status(err), ErrorCode::InvalidSignature);
    assert!(!op.is_active());
    assert!(client.transport().partition().operations().is_empty());
}

#[test]
fn setup_on_active_operation_is_bad_state() {
    let mut client = client();
    let mut op = HashOperation::new();
    client.hash_setup(&mut op, Algorithm::SHA_256).unwrap();
    let handle = op.handle();

    let err = client.hash_setup(&mut op, Algorithm::SHA_512).unwrap_err();
    assert_eq!(status(err), ErrorCode::BadState);

    // The live operation is untouched and still usable
    assert_eq!(op.handle(), handle);
    client.hash_update(&mut op, b"abc").unwrap();
    client.hash_finish(&mut op).unwrap();
}

#[test]
fn clone_needs_an_inactive_target() {
    let mut client = client();
    let mut source = HashOperation::new();
    let mut target = HashOperation::new();
    client.hash_setup(&mut source, Algorithm::SHA_256).unwrap();
    client.hash_setup(&mut target, Algorithm::SHA_256).unwrap();

    let err = client.hash_clone(&source, &mut target).unwrap_err();
    assert_eq!(status(err), ErrorCode::BadState);
    assert!(target.is_active());

    client.hash_abort(&mut target).unwrap();
    client.hash_update(&mut source, b"ab").unwrap();
    client.hash_clone(&source, &mut target).unwrap();
    client.hash_update(&mut source, b"c").unwrap();
    client.hash_update(&mut target, b"c").unwrap();
    assert_eq!(client.hash_finish(&mut source).unwrap(), client.hash_finish(&mut target).unwrap());
}

#[test]
fn abort_of_inactive_operation_succeeds() {
    let mut client = client();
    let mut op = MacOperation::new();
    client.mac_abort(&mut op).unwrap();
    assert!(!op.is_active());
}

#[test]
fn operation_limit_is_insufficient_memory() {
    let mut client = client_with(ServiceConfig { max_operations: 2, ..Default::default() });
    let mut ops = [HashOperation::new(); 3];
    client.hash_setup(&mut ops[0], Algorithm::SHA_256).unwrap();
    client.hash_setup(&mut ops[1], Algorithm::SHA_256).unwrap();
    let err = client.hash_setup(&mut ops[2], Algorithm::SHA_256).unwrap_err();
    assert_eq!(status(err), ErrorCode::InsufficientMemory);
    assert!(!ops[2].is_active());

    client.hash_abort(&mut ops[0]).unwrap();
    client.hash_setup(&mut ops[2], Algorithm::SHA_256).unwrap();
}

#[test]
fn close_releases_connection_contexts() {
    let mut client = client();
    let mut hash = HashOperation::new();
    let mut aead = AeadOperation::new();
    client.hash_setup(&mut hash, Algorithm::SHA_256).unwrap();
    let key = client
        .generate_key(
            &KeyAttributes::new(KeyType::CHACHA20)
                .with_bits(256)
                .with_usage(KeyUsage::ENCRYPT)
                .with_algorithm(Algorithm::CHACHA20_POLY1305),
        )
        .unwrap();
    client.aead_encrypt_setup(&mut aead, key, Algorithm::CHACHA20_POLY1305).unwrap();
    assert_eq!(client.transport().partition().operations().len(), 2);

    let runtime = client.close().unwrap();
    assert!(runtime.partition().operations().is_empty());
    assert_eq!(runtime.partition().connections(), 0);
}

#[test]
fn keys_are_private_to_their_owner() {
    let mut alice = client();
    let key = hmac_key(&mut alice, KeyUsage::SIGN_MESSAGE);

    let mut runtime = alice.close().unwrap();
    runtime.add_client(BOB).unwrap();
    runtime.switch_client(BOB);
    let mut bob = CryptoClient::connect(runtime, CRYPTO_SID, CRYPTO_VERSION).unwrap();

    let err = bob.mac_compute(key, Algorithm::hmac(Algorithm::SHA_256), b"msg").unwrap_err();
    assert_eq!(status(err), ErrorCode::InvalidHandle);
    let err = bob.destroy_key(key).unwrap_err();
    assert_eq!(status(err), ErrorCode::InvalidHandle);
}

#[test]
fn key_policy_is_enforced() {
    let mut client = client();
    let alg = Algorithm::hmac(Algorithm::SHA_256);
    let key = hmac_key(&mut client, KeyUsage::VERIFY_MESSAGE);

    let err = client.mac_compute(key, alg, b"msg").unwrap_err();
    assert_eq!(status(err), ErrorCode::NotPermitted);

    let err = client.mac_compute(key, Algorithm::hmac(Algorithm::SHA_512), b"msg").unwrap_err();
    assert_eq!(status(err), ErrorCode::NotPermitted);

    let err = client.export_key(key).unwrap_err();
    assert_eq!(status(err), ErrorCode::NotPermitted);
}

#[test]
fn mac_verify_rejects_wrong_tag() {
    let mut client = client();
    let alg = Algorithm::hmac(Algorithm::SHA_256);
    let key = hmac_key(&mut client, KeyUsage::SIGN_MESSAGE | KeyUsage::VERIFY_MESSAGE);

    let mut mac = client.mac_compute(key, alg, b"msg").unwrap();
    mac[0] ^= 1;
    let err = client.mac_verify(key, alg, b"msg", &mac).unwrap_err();
    assert_eq!(status(err), ErrorCode::InvalidSignature);
}

#[test]
fn attributes_read_back_with_allocated_id() {
    let mut client = client();
    let key = hmac_key(&mut client, KeyUsage::SIGN_MESSAGE | KeyUsage::EXPORT);
    assert!(key.is_volatile());

    let attributes = client.get_key_attributes(key).unwrap();
    assert_eq!(attributes.key_type, KeyType::HMAC);
    assert_eq!(attributes.bits, 256);
    assert_eq!(attributes.id, key);
    assert_eq!(client.export_key(key).unwrap().as_slice(), &[0x0b; 32]);

    assert_eq!(client.reset_key_attributes().unwrap(), KeyAttributes::default());
}

#[test]
fn persistent_key_survives_restart() {
    let storage = MemoryStorage::new();
    let id = KeyId(0x42);
    let attributes = KeyAttributes::new(KeyType::AES)
        .with_bits(128)
        .with_usage(KeyUsage::EXPORT)
        .with_algorithm(Algorithm::GCM)
        .persistent(id);

    let mut client = CryptoClient::connect(
        runtime(ServiceConfig::default(), storage.clone()),
        CRYPTO_SID,
        CRYPTO_VERSION,
    )
    .unwrap();
    assert_eq!(client.import_key(&attributes, &[7u8; 16]).unwrap(), id);
    let err = client.import_key(&attributes, &[7u8; 16]).unwrap_err();
    assert_eq!(status(err), ErrorCode::AlreadyExists);
    drop(client);
    assert_eq!(storage.len(), 1);

    let mut client =
        CryptoClient::connect(runtime(ServiceConfig::default(), storage), CRYPTO_SID, CRYPTO_VERSION).unwrap();
    assert_eq!(client.transport().partition().keys().loaded(), 0);
    assert_eq!(client.open_key(id).unwrap(), id);
    assert_eq!(client.export_key(id).unwrap().as_slice(), &[7u8; 16]);

    client.destroy_key(id).unwrap();
    assert_eq!(status(client.open_key(id).unwrap_err()), ErrorCode::DoesNotExist);
}

#[test]
fn aead_one_shot_and_multi_part_agree() {
    let mut client = client();
    let alg = Algorithm::GCM;
    let attributes = KeyAttributes::new(KeyType::AES)
        .with_bits(256)
        .with_usage(KeyUsage::ENCRYPT | KeyUsage::DECRYPT)
        .with_algorithm(alg);
    let key = client.generate_key(&attributes).unwrap();
    let nonce = [1u8; 12];

    let sealed = client.aead_encrypt(key, alg, &nonce, b"", b"plaintext").unwrap();
    assert_eq!(sealed.len(), 9 + 16);

    let mut op = AeadOperation::new();
    client.aead_encrypt_setup(&mut op, key, alg).unwrap();
    client.aead_set_nonce(&mut op, &nonce).unwrap();
    client.aead_update(&mut op, b"plain").unwrap();
    client.aead_update(&mut op, b"text").unwrap();
    let (ciphertext, tag) = client.aead_finish(&mut op).unwrap();
    assert_eq!([ciphertext, tag].concat(), sealed);

    let mut tampered = sealed.clone();
    tampered[0] ^= 1;
    let err = client.aead_decrypt(key, alg, &nonce, b"", &tampered).unwrap_err();
    assert_eq!(status(err), ErrorCode::InvalidSignature);
}

#[test]
fn empty_optional_vector_matches_an_absent_one() {
    let mut client = client();
    let alg = Algorithm::GCM;
    let attributes = KeyAttributes::new(KeyType::AES)
        .with_bits(128)
        .with_usage(KeyUsage::ENCRYPT)
        .with_algorithm(alg);
    let key = client.generate_key(&attributes).unwrap();
    let handle = client.handle();
    let nonce = Nonce::new(&[3u8; 12]).unwrap();
    let descriptor = Request::AeadEncrypt { key, alg, nonce }.to_descriptor().to_bytes();

    let mut without = [0u8; 32];
    let mut with_empty = [0u8; 32];
    let transport = client.transport_mut();
    let a = transport
        .call(handle, 0, &[descriptor.as_slice(), b"plain"], &mut [without.as_mut_slice()])
        .unwrap();
    let b = transport
        .call(handle, 0, &[descriptor.as_slice(), b"plain", b""], &mut [with_empty.as_mut_slice()])
        .unwrap();
    assert!(a.is_success());
    assert_eq!(a, b);
    assert_eq!(a.out_len, vec![5 + 16]);
    assert_eq!(without, with_empty);

    // Salt of an asymmetric encryption behaves the same way
    let rsa = Algorithm::RSA_PKCS1V15_CRYPT;
    let attributes = KeyAttributes::new(sign::ED25519_PAIR).with_usage(KeyUsage::ENCRYPT).with_algorithm(rsa);
    let key = client.generate_key(&attributes).unwrap();
    let descriptor = Request::AsymmetricEncrypt { key, alg: rsa }.to_descriptor().to_bytes();
    let mut without = [0u8; 64];
    let mut with_empty = [0u8; 64];
    let transport = client.transport_mut();
    let a = transport
        .call(handle, 0, &[descriptor.as_slice(), b"data"], &mut [without.as_mut_slice()])
        .unwrap();
    let b = transport
        .call(handle, 0, &[descriptor.as_slice(), b"data", b""], &mut [with_empty.as_mut_slice()])
        .unwrap();
    assert_eq!(a, b);
    assert_eq!(a.status, ErrorCode::NotSupported.code());
    assert_eq!(without, with_empty);
}

#[test]
fn multi_part_aead_buffer_is_bounded() {
    let mut client = client_with(ServiceConfig { max_aead_buffer: 16, ..Default::default() });
    let alg = Algorithm::CHACHA20_POLY1305;
    let attributes = KeyAttributes::new(KeyType::CHACHA20)
        .with_bits(256)
        .with_usage(KeyUsage::ENCRYPT)
        .with_algorithm(alg);
    let key = client.generate_key(&attributes).unwrap();

    let mut op = AeadOperation::new();
    client.aead_encrypt_setup(&mut op, key, alg).unwrap();
    client.aead_set_nonce(&mut op, &[0u8; 12]).unwrap();
    client.aead_update_ad(&mut op, &[1u8; 8]).unwrap();
    client.aead_update(&mut op, &[2u8; 8]).unwrap();
    let err = client.aead_update(&mut op, &[3u8; 1]).unwrap_err();
    assert_eq!(status(err), ErrorCode::InsufficientMemory);
    assert!(!op.is_active());
    assert!(client.transport().partition().operations().is_empty());
}

#[test]
fn aead_nonce_of_wrong_length_is_invalid_argument() {
    let mut client = client();
    let alg = Algorithm::CHACHA20_POLY1305;
    let attributes = KeyAttributes::new(KeyType::CHACHA20)
        .with_bits(256)
        .with_usage(KeyUsage::ENCRYPT)
        .with_algorithm(alg);
    let key = client.generate_key(&attributes).unwrap();

    let err = client.aead_encrypt(key, alg, &[0u8; 16], b"", b"data").unwrap_err();
    assert_eq!(status(err), ErrorCode::InvalidArgument);
}

#[test]
fn nonce_bound_from_config_is_enforced_by_the_service() {
    let mut client = client_with(ServiceConfig { max_nonce_length: 8, ..Default::default() });
    let alg = Algorithm::CHACHA20_POLY1305;
    let attributes = KeyAttributes::new(KeyType::CHACHA20)
        .with_bits(256)
        .with_usage(KeyUsage::ENCRYPT)
        .with_algorithm(alg);
    let key = client.generate_key(&attributes).unwrap();

    let err = client.aead_encrypt(key, alg, &[0u8; 12], b"", b"data").unwrap_err();
    assert_eq!(status(err), ErrorCode::InvalidArgument);
}

#[test]
fn signature_roundtrip_and_hash_signing() {
    let mut client = client();
    let alg = Algorithm::PURE_EDDSA;
    let attributes = KeyAttributes::new(sign::ED25519_PAIR)
        .with_usage(KeyUsage::SIGN_MESSAGE | KeyUsage::VERIFY_MESSAGE | KeyUsage::SIGN_HASH)
        .with_algorithm(alg);
    let key = client.generate_key(&attributes).unwrap();

    let signature = client.sign_message(key, alg, b"hello").unwrap();
    client.verify_message(key, alg, b"hello", &signature).unwrap();
    let err = client.verify_message(key, alg, b"hellO", &signature).unwrap_err();
    assert_eq!(status(err), ErrorCode::InvalidSignature);

    // Pure EdDSA signs messages, never digests
    let err = client.sign_hash(key, alg, &[0u8; 32]).unwrap_err();
    assert_eq!(status(err), ErrorCode::InvalidArgument);
}

#[test]
fn asymmetric_encryption_is_not_supported() {
    let mut client = client();
    let alg = Algorithm::PURE_EDDSA;
    let attributes = KeyAttributes::new(sign::ED25519_PAIR).with_usage(KeyUsage::ENCRYPT).with_algorithm(alg);
    let key = client.generate_key(&attributes).unwrap();

    // Not an encryption algorithm
    let err = client.asymmetric_encrypt(key, alg, b"data", b"").unwrap_err();
    assert_eq!(status(err), ErrorCode::InvalidArgument);

    let rsa = Algorithm::RSA_PKCS1V15_CRYPT;
    let attributes = KeyAttributes::new(sign::ED25519_PAIR).with_usage(KeyUsage::ENCRYPT).with_algorithm(rsa);
    let key = client.generate_key(&attributes).unwrap();
    let err = client.asymmetric_encrypt(key, rsa, b"data", b"").unwrap_err();
    assert_eq!(status(err), ErrorCode::NotSupported);
}

#[test]
fn derivation_with_key_agreement() {
    let mut client = client();
    let alg = Algorithm::key_agreement(Algorithm::ECDH, Algorithm::hkdf(Algorithm::SHA_256));
    let attributes = KeyAttributes::new(agreement::X25519_PAIR).with_usage(KeyUsage::DERIVE).with_algorithm(alg);
    let ours = client.generate_key(&attributes).unwrap();
    let theirs = client.generate_key(&attributes).unwrap();
    let our_public = client.export_public_key(ours).unwrap();
    let their_public = client.export_public_key(theirs).unwrap();

    let mut a = KeyDerivationOperation::new();
    let mut b = KeyDerivationOperation::new();
    client.key_derivation_setup(&mut a, alg).unwrap();
    client.key_derivation_setup(&mut b, alg).unwrap();
    client.key_derivation_key_agreement(&mut a, DerivationStep::Secret, ours, &their_public).unwrap();
    client.key_derivation_key_agreement(&mut b, DerivationStep::Secret, theirs, &our_public).unwrap();
    client.key_derivation_set_capacity(&mut a, 32).unwrap();

    let out_a = client.key_derivation_output_bytes(&mut a, 32).unwrap();
    let out_b = client.key_derivation_output_bytes(&mut b, 32).unwrap();
    assert_eq!(out_a, out_b);
    assert_eq!(client.key_derivation_get_capacity(&mut a).unwrap(), 0);

    // Exhausted: the step fails and the operation is gone
    let err = client.key_derivation_output_bytes(&mut a, 1).unwrap_err();
    assert_eq!(status(err), ErrorCode::InsufficientData);
    assert!(!a.is_active());
    client.key_derivation_abort(&mut b).unwrap();
}

#[test]
fn raw_agreement_needs_a_raw_algorithm() {
    let mut client = client();
    let attributes =
        KeyAttributes::new(agreement::X25519_PAIR).with_usage(KeyUsage::DERIVE).with_algorithm(Algorithm::ECDH);
    let key = client.generate_key(&attributes).unwrap();
    let public = client.export_public_key(key).unwrap();

    let alg = Algorithm::key_agreement(Algorithm::ECDH, Algorithm::hkdf(Algorithm::SHA_256));
    let err = client.raw_key_agreement(key, alg, &public).unwrap_err();
    assert_eq!(status(err), ErrorCode::InvalidArgument);
    assert_eq!(client.raw_key_agreement(key, Algorithm::ECDH, &public).unwrap().len(), 32);
}

#[test]
fn connection_limit_reports_busy() {
    let mut runtime = runtime(ServiceConfig { max_connections: 1, ..Default::default() }, MemoryStorage::new());
    let first = runtime.connect(CRYPTO_SID, CRYPTO_VERSION).unwrap();
    assert_eq!(
        runtime.connect(CRYPTO_SID, CRYPTO_VERSION),
        Err(SpmError::Status(ErrorCode::ConnectionBusy))
    );
    runtime.close(first).unwrap();
    runtime.connect(CRYPTO_SID, CRYPTO_VERSION).unwrap();
}

#[test]
fn malformed_descriptor_is_fatal_to_the_connection_only() {
    let mut runtime = runtime(ServiceConfig::default(), MemoryStorage::new());
    let bad = runtime.connect(CRYPTO_SID, CRYPTO_VERSION).unwrap();
    let good = runtime.connect(CRYPTO_SID, CRYPTO_VERSION).unwrap();

    let err = runtime.call(bad, 0, &[[0u8; 10].as_slice()], &mut []).unwrap_err();
    assert_eq!(err, SpmError::Fatal(Fault::ServiceRejected));
    runtime.run_pending().unwrap();
    assert_eq!(runtime.partition().connections(), 1);

    let descriptor = Request::GenerateRandom.to_descriptor().to_bytes();
    let mut out = [0u8; 8];
    let reply = runtime.call(good, 0, &[descriptor.as_slice()], &mut [out.as_mut_slice()]).unwrap();
    assert!(reply.is_success());
    assert_eq!(reply.out_len, vec![8]);
}

#[test]
fn unknown_service_id_is_not_supported() {
    let mut runtime = runtime(ServiceConfig::default(), MemoryStorage::new());
    let handle = runtime.connect(CRYPTO_SID, CRYPTO_VERSION).unwrap();
    let mut descriptor = Request::GenerateRandom.to_descriptor().to_bytes();
    descriptor[0] = 0xff;
    descriptor[1] = 0xff;

    let reply = runtime.call(handle, 0, &[descriptor.as_slice()], &mut []).unwrap();
    assert_eq!(reply.status, ErrorCode::NotSupported.code());
}
