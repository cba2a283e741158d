//! Service operation selectors.
//!
//! The high byte of a [`ServiceId`] names the operation family, the low byte
//! the operation within it.

use serde_repr::{Deserialize_repr, Serialize_repr};

/// Operation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceGroup {
    /// Random generation.
    Random,
    /// Key management.
    Key,
    /// Hashing.
    Hash,
    /// Message authentication codes.
    Mac,
    /// Unauthenticated ciphers.
    Cipher,
    /// Authenticated encryption.
    Aead,
    /// Signatures.
    AsymmetricSign,
    /// Asymmetric encryption.
    AsymmetricEncrypt,
    /// Key derivation and key agreement.
    KeyDerivation,
}

macro_rules! service_ids {
    ($($(#[$doc:meta])* $name:ident = $value:literal,)+) => {
        /// Operation selector carried in the request descriptor.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
        #[repr(u16)]
        pub enum ServiceId {
            $($(#[$doc])* $name = $value,)+
        }

        impl ServiceId {
            /// Every defined selector.
            pub const ALL: &'static [Self] = &[$(Self::$name,)+];

            /// Decode a raw selector.
            pub fn from_raw(raw: u16) -> Option<Self> {
                match raw {
                    $($value => Some(Self::$name),)+
                    _ => None,
                }
            }
        }
    };
}

service_ids! {
    /// Fill an output with random bytes.
    GenerateRandom = 0x0100,

    /// Read the attributes of a key.
    GetKeyAttributes = 0x0200,
    /// Return default attributes.
    ResetKeyAttributes = 0x0201,
    /// Open a persistent key.
    OpenKey = 0x0202,
    /// Close a key.
    CloseKey = 0x0203,
    /// Import key material.
    ImportKey = 0x0204,
    /// Destroy a key.
    DestroyKey = 0x0205,
    /// Export key material.
    ExportKey = 0x0206,
    /// Export the public half of a key.
    ExportPublicKey = 0x0207,
    /// Drop cached copies of a key.
    PurgeKey = 0x0208,
    /// Copy a key under new attributes.
    CopyKey = 0x0209,
    /// Generate a key.
    GenerateKey = 0x020a,

    /// One-shot hash.
    HashCompute = 0x0300,
    /// One-shot hash and compare.
    HashCompare = 0x0301,
    /// Start a hash operation.
    HashSetup = 0x0302,
    /// Feed a hash operation.
    HashUpdate = 0x0303,
    /// Clone a hash operation.
    HashClone = 0x0304,
    /// Finish a hash operation.
    HashFinish = 0x0305,
    /// Finish a hash operation against an expected digest.
    HashVerify = 0x0306,
    /// Abort a hash operation.
    HashAbort = 0x0307,

    /// One-shot MAC.
    MacCompute = 0x0400,
    /// One-shot MAC verification.
    MacVerify = 0x0401,
    /// Start a MAC generation.
    MacSignSetup = 0x0402,
    /// Start a MAC verification.
    MacVerifySetup = 0x0403,
    /// Feed a MAC operation.
    MacUpdate = 0x0404,
    /// Finish a MAC generation.
    MacSignFinish = 0x0405,
    /// Finish a MAC verification.
    MacVerifyFinish = 0x0406,
    /// Abort a MAC operation.
    MacAbort = 0x0407,

    /// One-shot encryption with a generated IV.
    CipherEncrypt = 0x0500,
    /// One-shot decryption of IV and ciphertext.
    CipherDecrypt = 0x0501,
    /// Start an encryption.
    CipherEncryptSetup = 0x0502,
    /// Start a decryption.
    CipherDecryptSetup = 0x0503,
    /// Generate and set an IV.
    CipherGenerateIv = 0x0504,
    /// Set a caller-supplied IV.
    CipherSetIv = 0x0505,
    /// Process data.
    CipherUpdate = 0x0506,
    /// Finish a cipher operation.
    CipherFinish = 0x0507,
    /// Abort a cipher operation.
    CipherAbort = 0x0508,

    /// One-shot authenticated encryption.
    AeadEncrypt = 0x0600,
    /// One-shot authenticated decryption.
    AeadDecrypt = 0x0601,
    /// Start an authenticated encryption.
    AeadEncryptSetup = 0x0602,
    /// Start an authenticated decryption.
    AeadDecryptSetup = 0x0603,
    /// Generate and set a nonce.
    AeadGenerateNonce = 0x0604,
    /// Set a caller-supplied nonce.
    AeadSetNonce = 0x0605,
    /// Declare total associated-data and payload lengths.
    AeadSetLengths = 0x0606,
    /// Feed associated data.
    AeadUpdateAd = 0x0607,
    /// Feed payload.
    AeadUpdate = 0x0608,
    /// Finish an encryption, producing the tag.
    AeadFinish = 0x0609,
    /// Finish a decryption, checking the tag.
    AeadVerify = 0x060a,
    /// Abort an AEAD operation.
    AeadAbort = 0x060b,

    /// Sign a message.
    SignMessage = 0x0700,
    /// Verify a message signature.
    VerifyMessage = 0x0701,
    /// Sign a precomputed hash.
    SignHash = 0x0702,
    /// Verify a signature over a precomputed hash.
    VerifyHash = 0x0703,

    /// Asymmetric encryption.
    AsymmetricEncrypt = 0x0800,
    /// Asymmetric decryption.
    AsymmetricDecrypt = 0x0801,

    /// Start a key derivation.
    KeyDerivationSetup = 0x0900,
    /// Read the remaining derivation capacity.
    KeyDerivationGetCapacity = 0x0901,
    /// Lower the derivation capacity.
    KeyDerivationSetCapacity = 0x0902,
    /// Provide a derivation input from bytes.
    KeyDerivationInputBytes = 0x0903,
    /// Provide a derivation input from a key.
    KeyDerivationInputKey = 0x0904,
    /// Provide a derivation secret from a key agreement.
    KeyDerivationKeyAgreement = 0x0905,
    /// Read derived bytes.
    KeyDerivationOutputBytes = 0x0906,
    /// Derive a key.
    KeyDerivationOutputKey = 0x0907,
    /// Abort a key derivation.
    KeyDerivationAbort = 0x0908,
    /// Raw key agreement.
    RawKeyAgreement = 0x0909,
}

impl ServiceId {
    /// Raw selector value.
    pub const fn raw(self) -> u16 {
        self as u16
    }

    /// Operation family.
    pub const fn group(self) -> ServiceGroup {
        match (self as u16) >> 8 {
            0x01 => ServiceGroup::Random,
            0x02 => ServiceGroup::Key,
            0x03 => ServiceGroup::Hash,
            0x04 => ServiceGroup::Mac,
            0x05 => ServiceGroup::Cipher,
            0x06 => ServiceGroup::Aead,
            0x07 => ServiceGroup::AsymmetricSign,
            0x08 => ServiceGroup::AsymmetricEncrypt,
            _ => ServiceGroup::KeyDerivation,
        }
    }
}
