//! Unauthenticated cipher operations.
//!
//! One-shot encryption picks a fresh IV and returns `IV || ciphertext`;
//! one-shot decryption expects the same layout.

use tessera_core::Environment;
use tessera_crypto::{CipherEngine, Direction, cipher};
use tessera_proto::{Algorithm, ErrorCode, KeyId, KeyUsage, OpHandle};

use super::{Call, Step};
use crate::{
    context::{OperationContextStore, OperationKind, OperationState},
    error::ServiceError,
};

pub(crate) fn encrypt<E: Environment>(call: &mut Call<'_, E>, key: KeyId, alg: Algorithm) -> Result<(), ServiceError> {
    let key = call.key(key, KeyUsage::ENCRYPT, alg)?;
    let plaintext = call.io.input(1)?;
    call.io.require(0, cipher::IV_LENGTH + plaintext.len())?;
    let mut iv = [0u8; cipher::IV_LENGTH];
    call.env.random_bytes(&mut iv);
    let ciphertext = cipher::encrypt(alg, key.key_type(), &key.material, &iv, &plaintext)?;
    call.io.write(0, &iv)?;
    call.io.write(0, &ciphertext)
}

pub(crate) fn decrypt<E: Environment>(call: &mut Call<'_, E>, key: KeyId, alg: Algorithm) -> Result<(), ServiceError> {
    let key = call.key(key, KeyUsage::DECRYPT, alg)?;
    let input = call.io.input(1)?;
    let plaintext = cipher::decrypt(alg, key.key_type(), &key.material, &input)?;
    call.io.write(0, &plaintext)
}

pub(crate) fn setup<E: Environment>(call: &mut Call<'_, E>, key: KeyId, alg: Algorithm, direction: Direction) -> Step {
    let usage = match direction {
        Direction::Encrypt => KeyUsage::ENCRYPT,
        Direction::Decrypt => KeyUsage::DECRYPT,
    };
    let key = call.key(key, usage, alg)?;
    let engine = CipherEngine::new(alg, key.key_type(), &key.material, direction)?;
    Ok(call.contexts.create(call.token, OperationState::Cipher(engine))?)
}

fn engine<'c>(
    contexts: &'c mut OperationContextStore,
    token: u64,
    op: OpHandle,
) -> Result<&'c mut CipherEngine, ErrorCode> {
    match contexts.get_mut(token, op, OperationKind::Cipher)? {
        OperationState::Cipher(engine) => Ok(engine),
        _ => Err(ErrorCode::BadState),
    }
}

pub(crate) fn generate_iv<E: Environment>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    call.io.require(1, cipher::IV_LENGTH)?;
    let env = call.env;
    let iv = engine(call.contexts, call.token, op)?.generate_iv(|buf| env.random_bytes(buf))?;
    call.io.write(1, &iv)?;
    Ok(op)
}

pub(crate) fn set_iv<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let iv = call.io.input(1)?;
    engine(call.contexts, call.token, op)?.set_iv(&iv)?;
    Ok(op)
}

pub(crate) fn update<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let input = call.io.input(1)?;
    call.io.require(1, input.len())?;
    let output = engine(call.contexts, call.token, op)?.update(&input)?;
    call.io.write(1, &output)?;
    Ok(op)
}

pub(crate) fn finish<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let OperationState::Cipher(engine) = call.contexts.take(call.token, op, OperationKind::Cipher)? else {
        return Err(ErrorCode::BadState.into());
    };
    call.io.write(1, &engine.finish()?)?;
    Ok(0)
}
