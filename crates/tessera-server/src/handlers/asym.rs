//! Signatures and asymmetric encryption.

use tessera_core::Environment;
use tessera_crypto::sign;
use tessera_proto::{Algorithm, ErrorCode, KeyId, KeyUsage};

use super::Call;
use crate::error::ServiceError;

pub(crate) fn sign_message<E: Environment>(call: &mut Call<'_, E>, key: KeyId, alg: Algorithm) -> Result<(), ServiceError> {
    let key = call.key(key, KeyUsage::SIGN_MESSAGE, alg)?;
    let message = call.io.input(1)?;
    call.io.require(0, sign::SIGNATURE_LENGTH)?;
    let signature = sign::sign_message(alg, key.key_type(), &key.material, &message)?;
    call.io.write(0, &signature)
}

pub(crate) fn verify_message<E: Environment>(
    call: &mut Call<'_, E>,
    key: KeyId,
    alg: Algorithm,
) -> Result<(), ServiceError> {
    let key = call.key(key, KeyUsage::VERIFY_MESSAGE, alg)?;
    let message = call.io.input(1)?;
    let signature = call.io.input(2)?;
    Ok(sign::verify_message(alg, key.key_type(), &key.material, &message, &signature)?)
}

pub(crate) fn sign_hash<E: Environment>(call: &mut Call<'_, E>, key: KeyId, alg: Algorithm) -> Result<(), ServiceError> {
    let key = call.key(key, KeyUsage::SIGN_HASH, alg)?;
    let signature = sign::sign_hash(alg, key.key_type())?;
    call.io.write(0, &signature)
}

pub(crate) fn verify_hash<E: Environment>(call: &mut Call<'_, E>, key: KeyId, alg: Algorithm) -> Result<(), ServiceError> {
    let key = call.key(key, KeyUsage::VERIFY_HASH, alg)?;
    Ok(sign::verify_hash(alg, key.key_type())?)
}

/// Asymmetric encryption and decryption. Algorithm, policy and key are
/// checked, but no scheme is provided.
pub(crate) fn encrypt_or_decrypt<E: Environment>(
    call: &mut Call<'_, E>,
    key: KeyId,
    alg: Algorithm,
    usage: KeyUsage,
) -> Result<(), ServiceError> {
    if !alg.is_asymmetric_encryption() {
        return Err(ErrorCode::InvalidArgument.into());
    }
    let key = call.key(key, usage, alg)?;
    if !key.key_type().is_key_pair() && !key.key_type().is_public_key() {
        return Err(ErrorCode::InvalidArgument.into());
    }
    if usage == KeyUsage::DECRYPT && !key.key_type().is_key_pair() {
        return Err(ErrorCode::InvalidArgument.into());
    }
    Err(ErrorCode::NotSupported.into())
}
