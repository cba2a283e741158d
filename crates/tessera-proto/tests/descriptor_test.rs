//! Property tests for descriptor decoding.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use tessera_proto::{
    Algorithm, DESCRIPTOR_SIZE, ErrorCode, KeyAttributes, KeyId, KeyType, KeyUsage, Request,
    RequestDescriptor, ServiceId,
};

proptest! {
    /// Arbitrary bytes either decode to a request or fail with a status the
    /// service can reply with. Decoding never panics.
    #[test]
    fn arbitrary_descriptor_decodes_or_errors(bytes in prop::collection::vec(any::<u8>(), DESCRIPTOR_SIZE)) {
        let desc = RequestDescriptor::parse(&bytes).unwrap();
        match Request::decode(&desc) {
            Ok(req) => {
                let again = Request::decode(&req.to_descriptor()).unwrap();
                prop_assert_eq!(again, req);
            },
            Err(err) => {
                let code = ErrorCode::from(err);
                prop_assert!(matches!(code, ErrorCode::NotSupported | ErrorCode::InvalidArgument));
            },
        }
    }

    /// Valid selectors with in-range fields always decode to a request of the
    /// same selector.
    #[test]
    fn known_selector_keeps_identity(idx in 0..ServiceId::ALL.len(), op in any::<u32>()) {
        let id = ServiceId::ALL[idx];
        let mut desc = RequestDescriptor::new(id.raw());
        desc.op_handle = op.into();
        desc.step = 0x0101u16.into();
        let req = Request::decode(&desc).unwrap();
        prop_assert_eq!(req.service_id(), id);
        if let Some(handle) = req.op_handle() {
            prop_assert_eq!(handle, op);
        }
    }
}

#[test]
fn attributes_survive_cbor() {
    let attrs = KeyAttributes::new(KeyType::HMAC)
        .with_bits(256)
        .with_usage(KeyUsage::SIGN_MESSAGE | KeyUsage::VERIFY_MESSAGE)
        .with_algorithm(Algorithm::hmac(Algorithm::SHA_256))
        .persistent(KeyId(42));

    let mut buf = Vec::new();
    ciborium::into_writer(&attrs, &mut buf).unwrap();
    let back: KeyAttributes = ciborium::from_reader(buf.as_slice()).unwrap();
    assert_eq!(back, attrs);
}
