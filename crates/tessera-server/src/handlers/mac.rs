//! MAC operations. Keys must be `HMAC` keys.

use tessera_core::Environment;
use tessera_crypto::{MacEngine, mac};
use tessera_proto::{Algorithm, ErrorCode, KeyId, KeyType, KeyUsage, OpHandle};

use super::{Call, Step};
use crate::{
    context::{OperationKind, OperationState},
    error::ServiceError,
    key_store::ResolvedKey,
};

fn mac_key<E: Environment>(
    call: &mut Call<'_, E>,
    key: KeyId,
    usage: KeyUsage,
    alg: Algorithm,
) -> Result<ResolvedKey, ServiceError> {
    let key = call.key(key, usage, alg)?;
    if key.key_type() != KeyType::HMAC {
        return Err(ErrorCode::InvalidArgument.into());
    }
    Ok(key)
}

pub(crate) fn compute<E: Environment>(call: &mut Call<'_, E>, key: KeyId, alg: Algorithm) -> Result<(), ServiceError> {
    let key = mac_key(call, key, KeyUsage::SIGN_MESSAGE, alg)?;
    let input = call.io.input(1)?;
    let tag = mac::compute(alg, &key.material, &input)?;
    call.io.write(0, &tag)
}

pub(crate) fn verify<E: Environment>(call: &mut Call<'_, E>, key: KeyId, alg: Algorithm) -> Result<(), ServiceError> {
    let key = mac_key(call, key, KeyUsage::VERIFY_MESSAGE, alg)?;
    let input = call.io.input(1)?;
    let tag = call.io.input(2)?;
    Ok(mac::verify(alg, &key.material, &input, &tag)?)
}

pub(crate) fn setup<E: Environment>(call: &mut Call<'_, E>, key: KeyId, alg: Algorithm, verify: bool) -> Step {
    let usage = if verify { KeyUsage::VERIFY_MESSAGE } else { KeyUsage::SIGN_MESSAGE };
    let key = mac_key(call, key, usage, alg)?;
    let engine = MacEngine::new(alg, &key.material)?;
    Ok(call.contexts.create(call.token, OperationState::Mac { engine, verify })?)
}

pub(crate) fn update<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let input = call.io.input(1)?;
    match call.contexts.get_mut(call.token, op, OperationKind::Mac)? {
        OperationState::Mac { engine, .. } => engine.update(&input),
        _ => return Err(ErrorCode::BadState.into()),
    }
    Ok(op)
}

fn take<E>(call: &mut Call<'_, E>, op: OpHandle, verify: bool) -> Result<MacEngine, ServiceError> {
    match call.contexts.take(call.token, op, OperationKind::Mac)? {
        OperationState::Mac { engine, verify: set_up_for } if set_up_for == verify => Ok(engine),
        _ => Err(ErrorCode::BadState.into()),
    }
}

pub(crate) fn sign_finish<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let engine = take(call, op, false)?;
    call.io.write(1, &engine.finalize())?;
    Ok(0)
}

pub(crate) fn verify_finish<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let tag = call.io.input(1)?;
    take(call, op, true)?.verify(&tag)?;
    Ok(0)
}
