//! Key management.

use tessera_core::Transport;
use tessera_proto::{ErrorCode, KeyAttributes, KeyAttributesWire, KeyId, Request};
use zeroize::Zeroizing;

use crate::{
    CryptoClient, MAX_EXPORT_LENGTH, MAX_PUBLIC_KEY_LENGTH,
    client::truncate,
    error::{ClientError, Result},
};

fn key_id(slot: [u8; 4], written: &[usize]) -> Result<KeyId> {
    if written.first() != Some(&slot.len()) {
        return Err(ClientError::Status(ErrorCode::CommunicationFailure));
    }
    Ok(KeyId(u32::from_le_bytes(slot)))
}

impl<T: Transport> CryptoClient<T> {
    /// Import `data` as a new key.
    pub fn import_key(&mut self, attributes: &KeyAttributes, data: &[u8]) -> Result<KeyId> {
        let mut slot = [0u8; 4];
        let attributes = attributes.to_bytes();
        let written =
            self.call(&Request::ImportKey, &[attributes.as_slice(), data], &mut [slot.as_mut_slice()])?;
        key_id(slot, &written)
    }

    /// Generate a new key.
    pub fn generate_key(&mut self, attributes: &KeyAttributes) -> Result<KeyId> {
        let mut slot = [0u8; 4];
        let attributes = attributes.to_bytes();
        let written = self.call(&Request::GenerateKey, &[attributes.as_slice()], &mut [slot.as_mut_slice()])?;
        key_id(slot, &written)
    }

    /// Copy `source` into a new key with `attributes`.
    pub fn copy_key(&mut self, source: KeyId, attributes: &KeyAttributes) -> Result<KeyId> {
        let mut slot = [0u8; 4];
        let attributes = attributes.to_bytes();
        let written =
            self.call(&Request::CopyKey { source }, &[attributes.as_slice()], &mut [slot.as_mut_slice()])?;
        key_id(slot, &written)
    }

    /// Open a persistent key.
    pub fn open_key(&mut self, key: KeyId) -> Result<KeyId> {
        let mut slot = [0u8; 4];
        let written = self.call(&Request::OpenKey { key }, &[], &mut [slot.as_mut_slice()])?;
        key_id(slot, &written)
    }

    /// Close a key.
    pub fn close_key(&mut self, key: KeyId) -> Result<()> {
        self.call(&Request::CloseKey { key }, &[], &mut [])?;
        Ok(())
    }

    /// Destroy a key.
    pub fn destroy_key(&mut self, key: KeyId) -> Result<()> {
        self.call(&Request::DestroyKey { key }, &[], &mut [])?;
        Ok(())
    }

    /// Drop the service's in-memory copy of a persistent key.
    pub fn purge_key(&mut self, key: KeyId) -> Result<()> {
        self.call(&Request::PurgeKey { key }, &[], &mut [])?;
        Ok(())
    }

    /// Attributes of a key.
    pub fn get_key_attributes(&mut self, key: KeyId) -> Result<KeyAttributes> {
        let mut buf = [0u8; KeyAttributesWire::SIZE];
        self.call(&Request::GetKeyAttributes { key }, &[], &mut [buf.as_mut_slice()])?;
        Ok(KeyAttributes::from_bytes(&buf)?)
    }

    /// Attributes of a freshly reset attribute set.
    pub fn reset_key_attributes(&mut self) -> Result<KeyAttributes> {
        let mut buf = [0u8; KeyAttributesWire::SIZE];
        self.call(&Request::ResetKeyAttributes, &[], &mut [buf.as_mut_slice()])?;
        Ok(KeyAttributes::from_bytes(&buf)?)
    }

    /// Key material of an exportable key.
    pub fn export_key(&mut self, key: KeyId) -> Result<Zeroizing<Vec<u8>>> {
        let mut buf = Zeroizing::new(vec![0u8; MAX_EXPORT_LENGTH]);
        let written = self.call(&Request::ExportKey { key }, &[], &mut [buf.as_mut_slice()])?;
        buf.truncate(written.first().copied().unwrap_or(0));
        Ok(buf)
    }

    /// Public half of an asymmetric key.
    pub fn export_public_key(&mut self, key: KeyId) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_PUBLIC_KEY_LENGTH];
        let written = self.call(&Request::ExportPublicKey { key }, &[], &mut [buf.as_mut_slice()])?;
        Ok(truncate(buf, &written, 0))
    }
}
