//! Fuzz target for request descriptor decoding.
//!
//! Every crypto call starts with a 64-byte descriptor from an untrusted
//! client.
//!
//! # Strategy
//!
//! - Raw bytes: arbitrary lengths and contents straight into the parser
//! - Steered service ids: half the inputs name a real service so decoding
//!   reaches the per-service field checks
//!
//! # Invariants
//!
//! - Only exactly 64 bytes parse
//! - A decoded request names the service id it was decoded from
//! - Re-encoding a decoded request decodes to the same request
//! - NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tessera_proto::{DESCRIPTOR_SIZE, Request, RequestDescriptor, ServiceId};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    /// Index into the known services, when steering.
    service: Option<u8>,
    bytes: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let mut bytes = input.bytes;
    if let Some(index) = input.service {
        let srv = ServiceId::ALL[usize::from(index) % ServiceId::ALL.len()];
        bytes.resize(bytes.len().max(2), 0);
        bytes[..2].copy_from_slice(&srv.raw().to_le_bytes());
    }

    let Some(desc) = RequestDescriptor::parse(&bytes) else {
        assert_ne!(bytes.len(), DESCRIPTOR_SIZE, "a full-size descriptor must parse");
        return;
    };
    assert_eq!(bytes.len(), DESCRIPTOR_SIZE);

    if let Ok(request) = Request::decode(&desc) {
        assert_eq!(request.service_id().raw(), desc.srv_id.get());

        let again = Request::decode(&request.to_descriptor()).unwrap_or_else(|err| {
            panic!("re-encoded {request:?} failed to decode: {err}");
        });
        assert_eq!(again, request);
    }
});
