//! Crypto Operation Dispatcher.
//!
//! Maps a decoded [`Request`] onto its handler. Single-part requests go
//! straight through. Multi-part requests share one protocol for `out[0]`:
//!
//! - a setup (or clone) reports the new handle; on a live handle it fails
//!   with `BAD_STATE` and leaves both the context and `out[0]` untouched
//! - an intermediate step reports the same handle, a terminal step zero
//! - any failing step destroys its context and reports zero
//! - abort always succeeds and reports zero

use tessera_core::Environment;
use tessera_crypto::Direction;
use tessera_proto::{ErrorCode, KeyUsage, OpHandle, Request, ServiceGroup};
use tracing::instrument;

use crate::{
    context::OperationKind,
    error::ServiceError,
    handlers::{Call, aead, asym, cipher, hash, kdf, key, mac, random},
    io::HANDLE_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Setup,
    Step,
    Abort,
}

/// Serve one request.
#[instrument(skip_all, fields(service = ?request.service_id(), client = call.client.0))]
pub(crate) fn dispatch<E: Environment>(call: &mut Call<'_, E>, request: Request) -> Result<(), ServiceError> {
    match request.op_handle() {
        None => single(call, &request),
        Some(op) => multipart(call, &request, op),
    }
}

fn single<E: Environment>(call: &mut Call<'_, E>, request: &Request) -> Result<(), ServiceError> {
    match *request {
        Request::GenerateRandom => random::generate(call),

        Request::GetKeyAttributes { key: k } => key::get_attributes(call, k),
        Request::ResetKeyAttributes => key::reset_attributes(call),
        Request::OpenKey { key: k } => key::open(call, k),
        Request::CloseKey { key: k } => key::close(call, k),
        Request::ImportKey => key::import(call),
        Request::DestroyKey { key: k } => key::destroy(call, k),
        Request::ExportKey { key: k } => key::export(call, k),
        Request::ExportPublicKey { key: k } => key::export_public(call, k),
        Request::PurgeKey { key: k } => key::purge(call, k),
        Request::CopyKey { source } => key::copy(call, source),
        Request::GenerateKey => key::generate(call),

        Request::HashCompute { alg } => hash::compute(call, alg),
        Request::HashCompare { alg } => hash::compare(call, alg),

        Request::MacCompute { key, alg } => mac::compute(call, key, alg),
        Request::MacVerify { key, alg } => mac::verify(call, key, alg),

        Request::CipherEncrypt { key, alg } => cipher::encrypt(call, key, alg),
        Request::CipherDecrypt { key, alg } => cipher::decrypt(call, key, alg),

        Request::AeadEncrypt { key, alg, ref nonce } => aead::encrypt(call, key, alg, nonce),
        Request::AeadDecrypt { key, alg, ref nonce } => aead::decrypt(call, key, alg, nonce),

        Request::SignMessage { key, alg } => asym::sign_message(call, key, alg),
        Request::VerifyMessage { key, alg } => asym::verify_message(call, key, alg),
        Request::SignHash { key, alg } => asym::sign_hash(call, key, alg),
        Request::VerifyHash { key, alg } => asym::verify_hash(call, key, alg),
        Request::AsymmetricEncrypt { key, alg } => asym::encrypt_or_decrypt(call, key, alg, KeyUsage::ENCRYPT),
        Request::AsymmetricDecrypt { key, alg } => asym::encrypt_or_decrypt(call, key, alg, KeyUsage::DECRYPT),

        Request::RawKeyAgreement { key, alg } => kdf::raw_key_agreement(call, key, alg),

        _ => Err(ErrorCode::ProgrammerError.into()),
    }
}

fn phase(request: &Request) -> Phase {
    match request {
        Request::HashSetup { .. }
        | Request::HashClone { .. }
        | Request::MacSignSetup { .. }
        | Request::MacVerifySetup { .. }
        | Request::CipherEncryptSetup { .. }
        | Request::CipherDecryptSetup { .. }
        | Request::AeadEncryptSetup { .. }
        | Request::AeadDecryptSetup { .. }
        | Request::KeyDerivationSetup { .. } => Phase::Setup,
        Request::HashAbort { .. }
        | Request::MacAbort { .. }
        | Request::CipherAbort { .. }
        | Request::AeadAbort { .. }
        | Request::KeyDerivationAbort { .. } => Phase::Abort,
        _ => Phase::Step,
    }
}

fn kind(request: &Request) -> OperationKind {
    match request.service_id().group() {
        ServiceGroup::Hash => OperationKind::Hash,
        ServiceGroup::Mac => OperationKind::Mac,
        ServiceGroup::Cipher => OperationKind::Cipher,
        ServiceGroup::Aead => OperationKind::Aead,
        _ => OperationKind::Derivation,
    }
}

fn multipart<E: Environment>(call: &mut Call<'_, E>, request: &Request, op: OpHandle) -> Result<(), ServiceError> {
    if call.io.output_capacity(0) < HANDLE_SIZE {
        return Err(ErrorCode::BufferTooSmall.into());
    }
    let kind = kind(request);
    let phase = phase(request);

    match phase {
        Phase::Abort => {
            call.contexts.abort(call.token, op, kind);
            return call.io.write_handle(0);
        },
        Phase::Setup => {
            let claimed = match *request {
                Request::HashClone { target, .. } => target,
                _ => op,
            };
            if call.contexts.is_live(call.token, claimed) {
                tracing::debug!(op = claimed, ?kind, "setup on a live operation");
                return Err(ErrorCode::BadState.into());
            }
        },
        Phase::Step => {},
    }

    match step(call, request) {
        Ok(handle) => call.io.write_handle(handle),
        Err(ServiceError::Status(code)) => {
            if phase == Phase::Step && call.contexts.abort(call.token, op, kind) {
                tracing::debug!(op, ?kind, %code, "operation failed and was aborted");
            }
            if call.io.written(0) == 0 {
                call.io.write_handle(0)?;
            }
            Err(code.into())
        },
        Err(err) => Err(err),
    }
}

fn step<E: Environment>(call: &mut Call<'_, E>, request: &Request) -> Result<OpHandle, ServiceError> {
    match *request {
        Request::HashSetup { alg, .. } => hash::setup(call, alg),
        Request::HashUpdate { op } => hash::update(call, op),
        Request::HashClone { op, .. } => hash::clone(call, op),
        Request::HashFinish { op } => hash::finish(call, op),
        Request::HashVerify { op } => hash::verify(call, op),

        Request::MacSignSetup { key, alg, .. } => mac::setup(call, key, alg, false),
        Request::MacVerifySetup { key, alg, .. } => mac::setup(call, key, alg, true),
        Request::MacUpdate { op } => mac::update(call, op),
        Request::MacSignFinish { op } => mac::sign_finish(call, op),
        Request::MacVerifyFinish { op } => mac::verify_finish(call, op),

        Request::CipherEncryptSetup { key, alg, .. } => cipher::setup(call, key, alg, Direction::Encrypt),
        Request::CipherDecryptSetup { key, alg, .. } => cipher::setup(call, key, alg, Direction::Decrypt),
        Request::CipherGenerateIv { op } => cipher::generate_iv(call, op),
        Request::CipherSetIv { op } => cipher::set_iv(call, op),
        Request::CipherUpdate { op } => cipher::update(call, op),
        Request::CipherFinish { op } => cipher::finish(call, op),

        Request::AeadEncryptSetup { key, alg, .. } => aead::setup(call, key, alg, Direction::Encrypt),
        Request::AeadDecryptSetup { key, alg, .. } => aead::setup(call, key, alg, Direction::Decrypt),
        Request::AeadGenerateNonce { op } => aead::generate_nonce(call, op),
        Request::AeadSetNonce { op } => aead::set_nonce(call, op),
        Request::AeadSetLengths { op, ad_length, plaintext_length } => {
            aead::set_lengths(call, op, ad_length, plaintext_length)
        },
        Request::AeadUpdateAd { op } => aead::update_ad(call, op),
        Request::AeadUpdate { op } => aead::update(call, op),
        Request::AeadFinish { op } => aead::finish(call, op),
        Request::AeadVerify { op } => aead::verify(call, op),

        Request::KeyDerivationSetup { alg, .. } => kdf::setup(call, alg),
        Request::KeyDerivationGetCapacity { op } => kdf::get_capacity(call, op),
        Request::KeyDerivationSetCapacity { op, capacity } => kdf::set_capacity(call, op, capacity),
        Request::KeyDerivationInputBytes { op, step } => kdf::input_bytes(call, op, step),
        Request::KeyDerivationInputKey { op, step, key } => kdf::input_key(call, op, step, key),
        Request::KeyDerivationKeyAgreement { op, step, key } => kdf::key_agreement(call, op, step, key),
        Request::KeyDerivationOutputBytes { op } => kdf::output_bytes(call, op),
        Request::KeyDerivationOutputKey { op } => kdf::output_key(call, op),

        _ => Err(ErrorCode::ProgrammerError.into()),
    }
}
