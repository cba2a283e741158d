//! Key management.
//!
//! New key ids are written to `out[0]` as little-endian `u32`. Room for
//! the id is checked before the key is created so that a short output
//! never leaves an unreachable key behind.

use tessera_core::Environment;
use tessera_proto::{KeyAttributes, KeyId};
use zeroize::Zeroizing;

use super::Call;
use crate::error::ServiceError;

const KEY_ID_SIZE: usize = 4;

fn write_id<E>(call: &mut Call<'_, E>, id: KeyId) -> Result<(), ServiceError> {
    call.io.write(0, &id.0.to_le_bytes())
}

fn attributes_input<E>(call: &mut Call<'_, E>) -> Result<KeyAttributes, ServiceError> {
    Ok(KeyAttributes::from_bytes(&call.io.input(1)?)?)
}

pub(crate) fn get_attributes<E>(call: &mut Call<'_, E>, key: KeyId) -> Result<(), ServiceError> {
    let attrs = call.keys.attributes(call.client, key)?;
    call.io.write(0, &attrs.to_bytes())
}

pub(crate) fn reset_attributes<E>(call: &mut Call<'_, E>) -> Result<(), ServiceError> {
    call.io.write(0, &KeyAttributes::default().to_bytes())
}

pub(crate) fn open<E>(call: &mut Call<'_, E>, key: KeyId) -> Result<(), ServiceError> {
    call.io.require(0, KEY_ID_SIZE)?;
    let id = call.keys.open(call.client, key)?;
    write_id(call, id)
}

pub(crate) fn close<E>(call: &mut Call<'_, E>, key: KeyId) -> Result<(), ServiceError> {
    Ok(call.keys.close(call.client, key)?)
}

pub(crate) fn destroy<E>(call: &mut Call<'_, E>, key: KeyId) -> Result<(), ServiceError> {
    Ok(call.keys.destroy(call.client, key)?)
}

pub(crate) fn purge<E>(call: &mut Call<'_, E>, key: KeyId) -> Result<(), ServiceError> {
    Ok(call.keys.purge(call.client, key)?)
}

pub(crate) fn import<E>(call: &mut Call<'_, E>) -> Result<(), ServiceError> {
    call.io.require(0, KEY_ID_SIZE)?;
    let attrs = attributes_input(call)?;
    let data = Zeroizing::new(call.io.input(2)?);
    let id = call.keys.import(call.client, attrs, &data)?;
    write_id(call, id)
}

pub(crate) fn generate<E: Environment>(call: &mut Call<'_, E>) -> Result<(), ServiceError> {
    call.io.require(0, KEY_ID_SIZE)?;
    let attrs = attributes_input(call)?;
    let env = call.env;
    let id = call.keys.generate(call.client, attrs, |buf| env.random_bytes(buf))?;
    write_id(call, id)
}

pub(crate) fn copy<E>(call: &mut Call<'_, E>, source: KeyId) -> Result<(), ServiceError> {
    call.io.require(0, KEY_ID_SIZE)?;
    let attrs = attributes_input(call)?;
    let id = call.keys.copy(call.client, source, attrs)?;
    write_id(call, id)
}

pub(crate) fn export<E>(call: &mut Call<'_, E>, key: KeyId) -> Result<(), ServiceError> {
    let material = call.keys.export(call.client, key)?;
    call.io.write(0, &material)
}

pub(crate) fn export_public<E>(call: &mut Call<'_, E>, key: KeyId) -> Result<(), ServiceError> {
    let public = call.keys.export_public(call.client, key)?;
    call.io.write(0, &public)
}
