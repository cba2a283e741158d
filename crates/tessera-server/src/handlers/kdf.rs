//! Key derivation and key agreement.
//!
//! A key fed into a derivation must permit the derivation's own algorithm,
//! including the agreement half of a combined `ECDH + HKDF` algorithm.

use tessera_core::Environment;
use tessera_crypto::{KeyDerivation, agreement, keys};
use tessera_proto::{Algorithm, DerivationStep, ErrorCode, KeyAttributes, KeyId, KeyUsage, OpHandle};
use zeroize::Zeroizing;

use super::{Call, Step};
use crate::{
    context::{OperationContextStore, OperationKind, OperationState},
    error::ServiceError,
};

pub(crate) fn raw_key_agreement<E: Environment>(
    call: &mut Call<'_, E>,
    key: KeyId,
    alg: Algorithm,
) -> Result<(), ServiceError> {
    if !alg.is_raw_key_agreement() {
        return Err(ErrorCode::InvalidArgument.into());
    }
    let key = call.key(key, KeyUsage::DERIVE, alg)?;
    let peer = call.io.input(1)?;
    let shared = agreement::agree(alg, key.key_type(), &key.material, &peer)?;
    call.io.write(0, &shared)
}

pub(crate) fn setup<E>(call: &mut Call<'_, E>, alg: Algorithm) -> Step {
    let derivation = KeyDerivation::new(alg)?;
    Ok(call.contexts.create(call.token, OperationState::Derivation(derivation))?)
}

fn derivation<'c>(
    contexts: &'c mut OperationContextStore,
    token: u64,
    op: OpHandle,
) -> Result<&'c mut KeyDerivation, ErrorCode> {
    match contexts.get_mut(token, op, OperationKind::Derivation)? {
        OperationState::Derivation(d) => Ok(d),
        _ => Err(ErrorCode::BadState),
    }
}

pub(crate) fn get_capacity<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let capacity = derivation(call.contexts, call.token, op)?.capacity();
    call.io.write(1, &capacity.to_le_bytes())?;
    Ok(op)
}

pub(crate) fn set_capacity<E>(call: &mut Call<'_, E>, op: OpHandle, capacity: u64) -> Step {
    derivation(call.contexts, call.token, op)?.set_capacity(capacity)?;
    Ok(op)
}

pub(crate) fn input_bytes<E>(call: &mut Call<'_, E>, op: OpHandle, step: DerivationStep) -> Step {
    let data = Zeroizing::new(call.io.input(1)?);
    derivation(call.contexts, call.token, op)?.input_bytes(step, &data)?;
    Ok(op)
}

pub(crate) fn input_key<E: Environment>(call: &mut Call<'_, E>, op: OpHandle, step: DerivationStep, key: KeyId) -> Step {
    let alg = derivation(call.contexts, call.token, op)?.algorithm();
    let key = call.key(key, KeyUsage::DERIVE, alg)?;
    derivation(call.contexts, call.token, op)?.input_key(step, key.key_type(), &key.material)?;
    Ok(op)
}

pub(crate) fn key_agreement<E: Environment>(
    call: &mut Call<'_, E>,
    op: OpHandle,
    step: DerivationStep,
    key: KeyId,
) -> Step {
    let alg = derivation(call.contexts, call.token, op)?.algorithm();
    let key = call.key(key, KeyUsage::DERIVE, alg)?;
    let peer = call.io.input(1)?;
    derivation(call.contexts, call.token, op)?.key_agreement(step, key.key_type(), &key.material, &peer)?;
    Ok(op)
}

/// Fill `out[1]` with the next bytes of the stream.
pub(crate) fn output_bytes<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let len = call.io.output_capacity(1);
    let output = derivation(call.contexts, call.token, op)?.output_vec(len)?;
    call.io.write(1, &output)?;
    Ok(op)
}

/// Draw a key of the size its attributes name and store it.
pub(crate) fn output_key<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    call.io.require(1, 4)?;
    let attrs = KeyAttributes::from_bytes(&call.io.input(1)?)?;
    let len = keys::key_length(attrs.key_type, attrs.bits)?;
    let material = derivation(call.contexts, call.token, op)?.output_vec(len)?;
    let id = call.keys.insert_derived(call.client, attrs, material)?;
    call.io.write(1, &id.0.to_le_bytes())?;
    Ok(op)
}
