//! Hash operations.

use tessera_crypto::{HashEngine, hash};
use tessera_proto::{Algorithm, ErrorCode, OpHandle};

use super::{Call, Step};
use crate::{
    context::{OperationKind, OperationState},
    error::ServiceError,
};

pub(crate) fn compute<E>(call: &mut Call<'_, E>, alg: Algorithm) -> Result<(), ServiceError> {
    let input = call.io.input(1)?;
    let digest = hash::compute(alg, &input)?;
    call.io.write(0, &digest)
}

pub(crate) fn compare<E>(call: &mut Call<'_, E>, alg: Algorithm) -> Result<(), ServiceError> {
    let input = call.io.input(1)?;
    let expected = call.io.input(2)?;
    Ok(hash::compare(alg, &input, &expected)?)
}

pub(crate) fn setup<E>(call: &mut Call<'_, E>, alg: Algorithm) -> Step {
    let engine = HashEngine::new(alg)?;
    Ok(call.contexts.create(call.token, OperationState::Hash(engine))?)
}

fn engine<'c, E>(call: &'c mut Call<'_, E>, op: OpHandle) -> Result<&'c mut HashEngine, ErrorCode> {
    match call.contexts.get_mut(call.token, op, OperationKind::Hash)? {
        OperationState::Hash(engine) => Ok(engine),
        _ => Err(ErrorCode::BadState),
    }
}

pub(crate) fn update<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let input = call.io.input(1)?;
    engine(call, op)?.update(&input);
    Ok(op)
}

pub(crate) fn finish<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let len = engine(call, op)?.output_len();
    call.io.require(1, len)?;
    let OperationState::Hash(engine) = call.contexts.take(call.token, op, OperationKind::Hash)? else {
        return Err(ErrorCode::BadState.into());
    };
    call.io.write(1, &engine.finalize())?;
    Ok(0)
}

pub(crate) fn verify<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let expected = call.io.input(1)?;
    let OperationState::Hash(engine) = call.contexts.take(call.token, op, OperationKind::Hash)? else {
        return Err(ErrorCode::BadState.into());
    };
    engine.verify(&expected)?;
    Ok(0)
}

/// Copy the state of `op` into a new context.
pub(crate) fn clone<E>(call: &mut Call<'_, E>, op: OpHandle) -> Step {
    let copy = engine(call, op)?.clone();
    Ok(call.contexts.create(call.token, OperationState::Hash(copy))?)
}
