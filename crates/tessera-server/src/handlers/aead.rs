//! AEAD operations.
//!
//! One-shot calls take the nonce from the request descriptor and the
//! optional associated data from `in[2]`; a missing and an empty AD vector
//! are the same thing. The multi-part finish writes the tag to `out[1]`
//! before the ciphertext to `out[2]`, so a short ciphertext buffer still
//! reports the tag length that was written.

use tessera_core::Environment;
use tessera_crypto::{AeadEngine, Direction, aead};
use tessera_proto::{Algorithm, ErrorCode, KeyId, KeyUsage, Nonce, OpHandle};

use super::{Call, Step};
use crate::{
    context::{OperationContextStore, OperationKind, OperationState},
    error::ServiceError,
};

pub(crate) fn encrypt<E: Environment>(
    call: &mut Call<'_, E>,
    key: KeyId,
    alg: Algorithm,
    nonce: &Nonce,
) -> Result<(), ServiceError> {
    let key = call.key(key, KeyUsage::ENCRYPT, alg)?;
    let plaintext = call.io.input(1)?;
    let ad = call.io.input(2)?;
    let sealed = aead::encrypt(alg, key.key_type(), &key.material, nonce.as_slice(), &ad, &plaintext)?;
    call.io.write(0, &sealed)
}

pub(crate) fn decrypt<E: Environment>(
    call: &mut Call<'_, E>,
    key: KeyId,
    alg: Algorithm,
    nonce: &Nonce,
) -> Result<(), ServiceError> {
    let key = call.key(key, KeyUsage::DECRYPT, alg)?;
    let ciphertext = call.io.input(1)?;
    let ad = call.io.input(2)?;
    let plaintext = aead::decrypt(alg, key.key_type(), &key.material, nonce.as_slice(), &ad, &ciphertext)?;
    call.io.write(0, &plaintext)
}

pub(crate) fn setup<E: Environment>(call: &mut Call<'_, E>, key: KeyId, alg: Algorithm, direction: Direction) -> Step {
    let usage = match direction {
        Direction::Encrypt => KeyUsage::ENCRYPT,
        Direction::Decrypt => KeyUsage::DECRYPT,
    };
    let key = call.key(key, usage, alg)?;
    let engine = AeadEngine::new(alg, key.key_type(), &key.material, direction)?.with_buffer_limit(call.aead_buffer);
    Ok(call.contexts.create(call.token, OperationState::Aead(engine))?)
}

fn engine<'c>(contexts: &'c mut OperationContextStore, token: u64, op: OpHandle) -> Result<&'c mut AeadEngine, ErrorCode> {
    match contexts.get_mut(token, op, OperationKind::Aead)? {
        OperationState::Aead(engine) => Ok(engine),
        _ => Err(ErrorCode::BadState),
    }
}

fn take(contexts: &mut OperationContextStore, token: u64, op: OpHandle) -> Result<AeadEngine, ErrorCode> {
    match contexts.take(token, op, OperationKind::Aead)? {
        OperationState::Aead(engine) => Ok(engine),
        _ => Err(ErrorCode::BadState),
    }
}

pub(crate) fn generate_nonce<E: Environment>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    call.io.require(1, aead::NONCE_LENGTH)?;
    let env = call.env;
    let nonce = engine(call.contexts, call.token, op)?.generate_nonce(|buf| env.random_bytes(buf))?;
    call.io.write(1, &nonce)?;
    Ok(op)
}

pub(crate) fn set_nonce<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let nonce = call.io.input(1)?;
    engine(call.contexts, call.token, op)?.set_nonce(&nonce)?;
    Ok(op)
}

pub(crate) fn set_lengths<E>(call: &mut Call<'_, E>, op: OpHandle, ad_length: u64, plaintext_length: u64) -> Step {
    engine(call.contexts, call.token, op)?.set_lengths(ad_length, plaintext_length)?;
    Ok(op)
}

pub(crate) fn update_ad<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let ad = call.io.input(1)?;
    engine(call.contexts, call.token, op)?.update_ad(&ad)?;
    Ok(op)
}

pub(crate) fn update<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let input = call.io.input(1)?;
    let output = engine(call.contexts, call.token, op)?.update(&input)?;
    call.io.write(1, &output)?;
    Ok(op)
}

pub(crate) fn finish<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let (ciphertext, tag) = take(call.contexts, call.token, op)?.finish()?;
    call.io.write(1, &tag)?;
    call.io.write(2, &ciphertext)?;
    Ok(0)
}

pub(crate) fn verify<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let tag = call.io.input(1)?;
    let plaintext = take(call.contexts, call.token, op)?.verify(&tag)?;
    call.io.write(1, &plaintext)?;
    Ok(0)
}
