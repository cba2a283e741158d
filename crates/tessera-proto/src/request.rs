//! Typed view of a request descriptor.
//!
//! The flat wire descriptor is decoded into one [`Request`] variant per
//! operation, so the service dispatcher matches exhaustively and each handler
//! sees only the fields its operation defines.

use thiserror::Error;
use zerocopy::little_endian::{U16, U32, U64};

use crate::{
    Algorithm, ErrorCode, KeyId, MAX_NONCE_LENGTH, Nonce, RequestDescriptor, ServiceId,
};

/// Raw operation handle as carried on the wire. Zero means none.
pub type OpHandle = u32;

/// Key-derivation input step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DerivationStep {
    /// Secret input keying material.
    Secret = 0x0101,
    /// Label.
    Label = 0x0201,
    /// Salt.
    Salt = 0x0202,
    /// Context information.
    Info = 0x0203,
    /// Seed.
    Seed = 0x0204,
}

impl DerivationStep {
    /// Decode a raw step.
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0x0101 => Some(Self::Secret),
            0x0201 => Some(Self::Label),
            0x0202 => Some(Self::Salt),
            0x0203 => Some(Self::Info),
            0x0204 => Some(Self::Seed),
            _ => None,
        }
    }
}

/// Descriptor contents that do not form a valid request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Selector names no operation.
    #[error("unknown service id {0:#06x}")]
    UnknownService(u16),
    /// Declared nonce length exceeds the embedded buffer.
    #[error("nonce length {0} exceeds {MAX_NONCE_LENGTH}")]
    NonceTooLong(u32),
    /// Step value names no derivation step.
    #[error("unknown derivation step {0:#06x}")]
    UnknownStep(u16),
}

impl From<DecodeError> for ErrorCode {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnknownService(_) => Self::NotSupported,
            DecodeError::NonceTooLong(_) | DecodeError::UnknownStep(_) => Self::InvalidArgument,
        }
    }
}

/// A decoded request.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    GenerateRandom,

    GetKeyAttributes { key: KeyId },
    ResetKeyAttributes,
    OpenKey { key: KeyId },
    CloseKey { key: KeyId },
    ImportKey,
    DestroyKey { key: KeyId },
    ExportKey { key: KeyId },
    ExportPublicKey { key: KeyId },
    PurgeKey { key: KeyId },
    CopyKey { source: KeyId },
    GenerateKey,

    HashCompute { alg: Algorithm },
    HashCompare { alg: Algorithm },
    HashSetup { op: OpHandle, alg: Algorithm },
    HashUpdate { op: OpHandle },
    HashClone { op: OpHandle, target: OpHandle },
    HashFinish { op: OpHandle },
    HashVerify { op: OpHandle },
    HashAbort { op: OpHandle },

    MacCompute { key: KeyId, alg: Algorithm },
    MacVerify { key: KeyId, alg: Algorithm },
    MacSignSetup { op: OpHandle, key: KeyId, alg: Algorithm },
    MacVerifySetup { op: OpHandle, key: KeyId, alg: Algorithm },
    MacUpdate { op: OpHandle },
    MacSignFinish { op: OpHandle },
    MacVerifyFinish { op: OpHandle },
    MacAbort { op: OpHandle },

    CipherEncrypt { key: KeyId, alg: Algorithm },
    CipherDecrypt { key: KeyId, alg: Algorithm },
    CipherEncryptSetup { op: OpHandle, key: KeyId, alg: Algorithm },
    CipherDecryptSetup { op: OpHandle, key: KeyId, alg: Algorithm },
    CipherGenerateIv { op: OpHandle },
    CipherSetIv { op: OpHandle },
    CipherUpdate { op: OpHandle },
    CipherFinish { op: OpHandle },
    CipherAbort { op: OpHandle },

    AeadEncrypt { key: KeyId, alg: Algorithm, nonce: Nonce },
    AeadDecrypt { key: KeyId, alg: Algorithm, nonce: Nonce },
    AeadEncryptSetup { op: OpHandle, key: KeyId, alg: Algorithm },
    AeadDecryptSetup { op: OpHandle, key: KeyId, alg: Algorithm },
    AeadGenerateNonce { op: OpHandle },
    AeadSetNonce { op: OpHandle },
    AeadSetLengths { op: OpHandle, ad_length: u64, plaintext_length: u64 },
    AeadUpdateAd { op: OpHandle },
    AeadUpdate { op: OpHandle },
    AeadFinish { op: OpHandle },
    AeadVerify { op: OpHandle },
    AeadAbort { op: OpHandle },

    SignMessage { key: KeyId, alg: Algorithm },
    VerifyMessage { key: KeyId, alg: Algorithm },
    SignHash { key: KeyId, alg: Algorithm },
    VerifyHash { key: KeyId, alg: Algorithm },

    AsymmetricEncrypt { key: KeyId, alg: Algorithm },
    AsymmetricDecrypt { key: KeyId, alg: Algorithm },

    KeyDerivationSetup { op: OpHandle, alg: Algorithm },
    KeyDerivationGetCapacity { op: OpHandle },
    KeyDerivationSetCapacity { op: OpHandle, capacity: u64 },
    KeyDerivationInputBytes { op: OpHandle, step: DerivationStep },
    KeyDerivationInputKey { op: OpHandle, step: DerivationStep, key: KeyId },
    KeyDerivationKeyAgreement { op: OpHandle, step: DerivationStep, key: KeyId },
    KeyDerivationOutputBytes { op: OpHandle },
    KeyDerivationOutputKey { op: OpHandle },
    KeyDerivationAbort { op: OpHandle },
    RawKeyAgreement { key: KeyId, alg: Algorithm },
}

impl Request {
    /// Decode a wire descriptor.
    pub fn decode(desc: &RequestDescriptor) -> Result<Self, DecodeError> {
        let raw = desc.srv_id.get();
        let srv = ServiceId::from_raw(raw).ok_or(DecodeError::UnknownService(raw))?;

        let key = KeyId(desc.key_id.get());
        let alg = Algorithm(desc.alg.get());
        let op = desc.op_handle.get();
        let step = || {
            let raw = desc.step.get();
            DerivationStep::from_raw(raw).ok_or(DecodeError::UnknownStep(raw))
        };
        let nonce = || {
            let len = desc.nonce_length.get();
            usize::try_from(len)
                .ok()
                .and_then(|l| desc.nonce.get(..l))
                .and_then(Nonce::new)
                .ok_or(DecodeError::NonceTooLong(len))
        };

        Ok(match srv {
            ServiceId::GenerateRandom => Self::GenerateRandom,

            ServiceId::GetKeyAttributes => Self::GetKeyAttributes { key },
            ServiceId::ResetKeyAttributes => Self::ResetKeyAttributes,
            ServiceId::OpenKey => Self::OpenKey { key },
            ServiceId::CloseKey => Self::CloseKey { key },
            ServiceId::ImportKey => Self::ImportKey,
            ServiceId::DestroyKey => Self::DestroyKey { key },
            ServiceId::ExportKey => Self::ExportKey { key },
            ServiceId::ExportPublicKey => Self::ExportPublicKey { key },
            ServiceId::PurgeKey => Self::PurgeKey { key },
            ServiceId::CopyKey => Self::CopyKey { source: key },
            ServiceId::GenerateKey => Self::GenerateKey,

            ServiceId::HashCompute => Self::HashCompute { alg },
            ServiceId::HashCompare => Self::HashCompare { alg },
            ServiceId::HashSetup => Self::HashSetup { op, alg },
            ServiceId::HashUpdate => Self::HashUpdate { op },
            ServiceId::HashClone => Self::HashClone { op, target: desc.target_handle.get() },
            ServiceId::HashFinish => Self::HashFinish { op },
            ServiceId::HashVerify => Self::HashVerify { op },
            ServiceId::HashAbort => Self::HashAbort { op },

            ServiceId::MacCompute => Self::MacCompute { key, alg },
            ServiceId::MacVerify => Self::MacVerify { key, alg },
            ServiceId::MacSignSetup => Self::MacSignSetup { op, key, alg },
            ServiceId::MacVerifySetup => Self::MacVerifySetup { op, key, alg },
            ServiceId::MacUpdate => Self::MacUpdate { op },
            ServiceId::MacSignFinish => Self::MacSignFinish { op },
            ServiceId::MacVerifyFinish => Self::MacVerifyFinish { op },
            ServiceId::MacAbort => Self::MacAbort { op },

            ServiceId::CipherEncrypt => Self::CipherEncrypt { key, alg },
            ServiceId::CipherDecrypt => Self::CipherDecrypt { key, alg },
            ServiceId::CipherEncryptSetup => Self::CipherEncryptSetup { op, key, alg },
            ServiceId::CipherDecryptSetup => Self::CipherDecryptSetup { op, key, alg },
            ServiceId::CipherGenerateIv => Self::CipherGenerateIv { op },
            ServiceId::CipherSetIv => Self::CipherSetIv { op },
            ServiceId::CipherUpdate => Self::CipherUpdate { op },
            ServiceId::CipherFinish => Self::CipherFinish { op },
            ServiceId::CipherAbort => Self::CipherAbort { op },

            ServiceId::AeadEncrypt => Self::AeadEncrypt { key, alg, nonce: nonce()? },
            ServiceId::AeadDecrypt => Self::AeadDecrypt { key, alg, nonce: nonce()? },
            ServiceId::AeadEncryptSetup => Self::AeadEncryptSetup { op, key, alg },
            ServiceId::AeadDecryptSetup => Self::AeadDecryptSetup { op, key, alg },
            ServiceId::AeadGenerateNonce => Self::AeadGenerateNonce { op },
            ServiceId::AeadSetNonce => Self::AeadSetNonce { op },
            ServiceId::AeadSetLengths => Self::AeadSetLengths {
                op,
                ad_length: desc.ad_length.get(),
                plaintext_length: desc.plaintext_length.get(),
            },
            ServiceId::AeadUpdateAd => Self::AeadUpdateAd { op },
            ServiceId::AeadUpdate => Self::AeadUpdate { op },
            ServiceId::AeadFinish => Self::AeadFinish { op },
            ServiceId::AeadVerify => Self::AeadVerify { op },
            ServiceId::AeadAbort => Self::AeadAbort { op },

            ServiceId::SignMessage => Self::SignMessage { key, alg },
            ServiceId::VerifyMessage => Self::VerifyMessage { key, alg },
            ServiceId::SignHash => Self::SignHash { key, alg },
            ServiceId::VerifyHash => Self::VerifyHash { key, alg },

            ServiceId::AsymmetricEncrypt => Self::AsymmetricEncrypt { key, alg },
            ServiceId::AsymmetricDecrypt => Self::AsymmetricDecrypt { key, alg },

            ServiceId::KeyDerivationSetup => Self::KeyDerivationSetup { op, alg },
            ServiceId::KeyDerivationGetCapacity => Self::KeyDerivationGetCapacity { op },
            ServiceId::KeyDerivationSetCapacity => {
                Self::KeyDerivationSetCapacity { op, capacity: desc.capacity.get() }
            },
            ServiceId::KeyDerivationInputBytes => {
                Self::KeyDerivationInputBytes { op, step: step()? }
            },
            ServiceId::KeyDerivationInputKey => {
                Self::KeyDerivationInputKey { op, step: step()?, key }
            },
            ServiceId::KeyDerivationKeyAgreement => {
                Self::KeyDerivationKeyAgreement { op, step: step()?, key }
            },
            ServiceId::KeyDerivationOutputBytes => Self::KeyDerivationOutputBytes { op },
            ServiceId::KeyDerivationOutputKey => Self::KeyDerivationOutputKey { op },
            ServiceId::KeyDerivationAbort => Self::KeyDerivationAbort { op },
            ServiceId::RawKeyAgreement => Self::RawKeyAgreement { key, alg },
        })
    }

    /// Selector for this request.
    pub fn service_id(&self) -> ServiceId {
        match self {
            Self::GenerateRandom => ServiceId::GenerateRandom,
            Self::GetKeyAttributes { .. } => ServiceId::GetKeyAttributes,
            Self::ResetKeyAttributes => ServiceId::ResetKeyAttributes,
            Self::OpenKey { .. } => ServiceId::OpenKey,
            Self::CloseKey { .. } => ServiceId::CloseKey,
            Self::ImportKey => ServiceId::ImportKey,
            Self::DestroyKey { .. } => ServiceId::DestroyKey,
            Self::ExportKey { .. } => ServiceId::ExportKey,
            Self::ExportPublicKey { .. } => ServiceId::ExportPublicKey,
            Self::PurgeKey { .. } => ServiceId::PurgeKey,
            Self::CopyKey { .. } => ServiceId::CopyKey,
            Self::GenerateKey => ServiceId::GenerateKey,
            Self::HashCompute { .. } => ServiceId::HashCompute,
            Self::HashCompare { .. } => ServiceId::HashCompare,
            Self::HashSetup { .. } => ServiceId::HashSetup,
            Self::HashUpdate { .. } => ServiceId::HashUpdate,
            Self::HashClone { .. } => ServiceId::HashClone,
            Self::HashFinish { .. } => ServiceId::HashFinish,
            Self::HashVerify { .. } => ServiceId::HashVerify,
            Self::HashAbort { .. } => ServiceId::HashAbort,
            Self::MacCompute { .. } => ServiceId::MacCompute,
            Self::MacVerify { .. } => ServiceId::MacVerify,
            Self::MacSignSetup { .. } => ServiceId::MacSignSetup,
            Self::MacVerifySetup { .. } => ServiceId::MacVerifySetup,
            Self::MacUpdate { .. } => ServiceId::MacUpdate,
            Self::MacSignFinish { .. } => ServiceId::MacSignFinish,
            Self::MacVerifyFinish { .. } => ServiceId::MacVerifyFinish,
            Self::MacAbort { .. } => ServiceId::MacAbort,
            Self::CipherEncrypt { .. } => ServiceId::CipherEncrypt,
            Self::CipherDecrypt { .. } => ServiceId::CipherDecrypt,
            Self::CipherEncryptSetup { .. } => ServiceId::CipherEncryptSetup,
            Self::CipherDecryptSetup { .. } => ServiceId::CipherDecryptSetup,
            Self::CipherGenerateIv { .. } => ServiceId::CipherGenerateIv,
            Self::CipherSetIv { .. } => ServiceId::CipherSetIv,
            Self::CipherUpdate { .. } => ServiceId::CipherUpdate,
            Self::CipherFinish { .. } => ServiceId::CipherFinish,
            Self::CipherAbort { .. } => ServiceId::CipherAbort,
            Self::AeadEncrypt { .. } => ServiceId::AeadEncrypt,
            Self::AeadDecrypt { .. } => ServiceId::AeadDecrypt,
            Self::AeadEncryptSetup { .. } => ServiceId::AeadEncryptSetup,
            Self::AeadDecryptSetup { .. } => ServiceId::AeadDecryptSetup,
            Self::AeadGenerateNonce { .. } => ServiceId::AeadGenerateNonce,
            Self::AeadSetNonce { .. } => ServiceId::AeadSetNonce,
            Self::AeadSetLengths { .. } => ServiceId::AeadSetLengths,
            Self::AeadUpdateAd { .. } => ServiceId::AeadUpdateAd,
            Self::AeadUpdate { .. } => ServiceId::AeadUpdate,
            Self::AeadFinish { .. } => ServiceId::AeadFinish,
            Self::AeadVerify { .. } => ServiceId::AeadVerify,
            Self::AeadAbort { .. } => ServiceId::AeadAbort,
            Self::SignMessage { .. } => ServiceId::SignMessage,
            Self::VerifyMessage { .. } => ServiceId::VerifyMessage,
            Self::SignHash { .. } => ServiceId::SignHash,
            Self::VerifyHash { .. } => ServiceId::VerifyHash,
            Self::AsymmetricEncrypt { .. } => ServiceId::AsymmetricEncrypt,
            Self::AsymmetricDecrypt { .. } => ServiceId::AsymmetricDecrypt,
            Self::KeyDerivationSetup { .. } => ServiceId::KeyDerivationSetup,
            Self::KeyDerivationGetCapacity { .. } => ServiceId::KeyDerivationGetCapacity,
            Self::KeyDerivationSetCapacity { .. } => ServiceId::KeyDerivationSetCapacity,
            Self::KeyDerivationInputBytes { .. } => ServiceId::KeyDerivationInputBytes,
            Self::KeyDerivationInputKey { .. } => ServiceId::KeyDerivationInputKey,
            Self::KeyDerivationKeyAgreement { .. } => ServiceId::KeyDerivationKeyAgreement,
            Self::KeyDerivationOutputBytes { .. } => ServiceId::KeyDerivationOutputBytes,
            Self::KeyDerivationOutputKey { .. } => ServiceId::KeyDerivationOutputKey,
            Self::KeyDerivationAbort { .. } => ServiceId::KeyDerivationAbort,
            Self::RawKeyAgreement { .. } => ServiceId::RawKeyAgreement,
        }
    }

    /// Operation handle of a multi-part request.
    pub fn op_handle(&self) -> Option<OpHandle> {
        match *self {
            Self::HashSetup { op, .. }
            | Self::HashUpdate { op }
            | Self::HashClone { op, .. }
            | Self::HashFinish { op }
            | Self::HashVerify { op }
            | Self::HashAbort { op }
            | Self::MacSignSetup { op, .. }
            | Self::MacVerifySetup { op, .. }
            | Self::MacUpdate { op }
            | Self::MacSignFinish { op }
            | Self::MacVerifyFinish { op }
            | Self::MacAbort { op }
            | Self::CipherEncryptSetup { op, .. }
            | Self::CipherDecryptSetup { op, .. }
            | Self::CipherGenerateIv { op }
            | Self::CipherSetIv { op }
            | Self::CipherUpdate { op }
            | Self::CipherFinish { op }
            | Self::CipherAbort { op }
            | Self::AeadEncryptSetup { op, .. }
            | Self::AeadDecryptSetup { op, .. }
            | Self::AeadGenerateNonce { op }
            | Self::AeadSetNonce { op }
            | Self::AeadSetLengths { op, .. }
            | Self::AeadUpdateAd { op }
            | Self::AeadUpdate { op }
            | Self::AeadFinish { op }
            | Self::AeadVerify { op }
            | Self::AeadAbort { op }
            | Self::KeyDerivationSetup { op, .. }
            | Self::KeyDerivationGetCapacity { op }
            | Self::KeyDerivationSetCapacity { op, .. }
            | Self::KeyDerivationInputBytes { op, .. }
            | Self::KeyDerivationInputKey { op, .. }
            | Self::KeyDerivationKeyAgreement { op, .. }
            | Self::KeyDerivationOutputBytes { op }
            | Self::KeyDerivationOutputKey { op }
            | Self::KeyDerivationAbort { op } => Some(op),
            _ => None,
        }
    }

    /// Encode into a wire descriptor.
    pub fn to_descriptor(&self) -> RequestDescriptor {
        let mut desc = RequestDescriptor::new(self.service_id().raw());
        let set_key = |d: &mut RequestDescriptor, key: KeyId| d.key_id = U32::new(key.0);
        let set_alg = |d: &mut RequestDescriptor, alg: Algorithm| d.alg = U32::new(alg.0);
        let set_step = |d: &mut RequestDescriptor, step: DerivationStep| {
            d.step = U16::new(step as u16);
        };

        if let Some(op) = self.op_handle() {
            desc.op_handle = U32::new(op);
        }

        match *self {
            Self::GetKeyAttributes { key }
            | Self::OpenKey { key }
            | Self::CloseKey { key }
            | Self::DestroyKey { key }
            | Self::ExportKey { key }
            | Self::ExportPublicKey { key }
            | Self::PurgeKey { key }
            | Self::CopyKey { source: key } => set_key(&mut desc, key),

            Self::HashCompute { alg }
            | Self::HashCompare { alg }
            | Self::HashSetup { alg, .. }
            | Self::KeyDerivationSetup { alg, .. } => set_alg(&mut desc, alg),

            Self::HashClone { target, .. } => desc.target_handle = U32::new(target),

            Self::MacCompute { key, alg }
            | Self::MacVerify { key, alg }
            | Self::MacSignSetup { key, alg, .. }
            | Self::MacVerifySetup { key, alg, .. }
            | Self::CipherEncrypt { key, alg }
            | Self::CipherDecrypt { key, alg }
            | Self::CipherEncryptSetup { key, alg, .. }
            | Self::CipherDecryptSetup { key, alg, .. }
            | Self::AeadEncryptSetup { key, alg, .. }
            | Self::AeadDecryptSetup { key, alg, .. }
            | Self::SignMessage { key, alg }
            | Self::VerifyMessage { key, alg }
            | Self::SignHash { key, alg }
            | Self::VerifyHash { key, alg }
            | Self::AsymmetricEncrypt { key, alg }
            | Self::AsymmetricDecrypt { key, alg }
            | Self::RawKeyAgreement { key, alg } => {
                set_key(&mut desc, key);
                set_alg(&mut desc, alg);
            },

            Self::AeadEncrypt { key, alg, nonce } | Self::AeadDecrypt { key, alg, nonce } => {
                set_key(&mut desc, key);
                set_alg(&mut desc, alg);
                desc.nonce = nonce.raw();
                desc.nonce_length = U32::new(nonce.len() as u32);
            },

            Self::AeadSetLengths { ad_length, plaintext_length, .. } => {
                desc.ad_length = U64::new(ad_length);
                desc.plaintext_length = U64::new(plaintext_length);
            },

            Self::KeyDerivationSetCapacity { capacity, .. } => {
                desc.capacity = U64::new(capacity);
            },
            Self::KeyDerivationInputBytes { step, .. } => set_step(&mut desc, step),
            Self::KeyDerivationInputKey { step, key, .. }
            | Self::KeyDerivationKeyAgreement { step, key, .. } => {
                set_step(&mut desc, step);
                set_key(&mut desc, key);
            },

            _ => {},
        }

        desc
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::DESCRIPTOR_SIZE;

    #[test]
    fn unknown_selector_is_not_supported() {
        let desc = RequestDescriptor::new(0x7777);
        let err = Request::decode(&desc).unwrap_err();
        assert_eq!(err, DecodeError::UnknownService(0x7777));
        assert_eq!(ErrorCode::from(err), ErrorCode::NotSupported);
    }

    #[test]
    fn oversized_nonce_is_invalid_argument() {
        let mut desc = RequestDescriptor::new(ServiceId::AeadEncrypt.raw());
        desc.nonce_length = U32::new(17);
        let err = Request::decode(&desc).unwrap_err();
        assert_eq!(ErrorCode::from(err), ErrorCode::InvalidArgument);
    }

    #[test]
    fn nonce_length_ignored_outside_aead_one_shot() {
        let mut desc = RequestDescriptor::new(ServiceId::HashUpdate.raw());
        desc.nonce_length = U32::new(999);
        desc.op_handle = U32::new(5);
        assert_eq!(Request::decode(&desc), Ok(Request::HashUpdate { op: 5 }));
    }

    #[test]
    fn unknown_step_rejected() {
        let mut desc = RequestDescriptor::new(ServiceId::KeyDerivationInputBytes.raw());
        desc.step = U16::new(0x0999);
        assert_eq!(Request::decode(&desc), Err(DecodeError::UnknownStep(0x0999)));
    }

    #[test]
    fn aead_one_shot_carries_nonce() {
        let nonce = Nonce::new(&[9u8; 12]).unwrap();
        let req = Request::AeadEncrypt { key: KeyId(3), alg: Algorithm::GCM, nonce };
        let bytes = req.to_descriptor().to_bytes();
        assert_eq!(bytes.len(), DESCRIPTOR_SIZE);

        let back = Request::decode(&RequestDescriptor::parse(&bytes).unwrap()).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn clone_carries_target() {
        let req = Request::HashClone { op: 0x3001_0001, target: 4 };
        let desc = req.to_descriptor();
        assert_eq!(desc.op_handle.get(), 0x3001_0001);
        assert_eq!(desc.target_handle.get(), 4);
    }
}
