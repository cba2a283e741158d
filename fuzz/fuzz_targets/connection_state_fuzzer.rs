//! Fuzz target for connection lifecycle and call handling in the crypto
//! service.
//!
//! Prevent one client's bad calls from reaching past its own connection.
//!
//! # Strategy
//!
//! - Event sequences: connects, calls, and closes from two clients
//! - Handle probing: calls and closes on handles that were closed, refused,
//!   torn down, or belong to the other client
//! - Contract abuse: negative message types, too many vectors, short
//!   descriptors
//! - Descriptors: steered to real services with random fields, so
//!   multi-part handles and key ids are exercised
//!
//! # Invariants
//!
//! - The crypto partition stays `Running`
//! - Live operations, loaded keys, and open connections stay within the
//!   configured limits
//! - Nothing is left queued once the service has drained
//! - A closed connection rejects further calls
//! - NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tessera_core::{ClientId, Handle, PartitionState, Transport};
use tessera_harness::SimEnv;
use tessera_proto::{ServiceId, DESCRIPTOR_SIZE};
use tessera_server::{LocalRuntime, MemoryStorage, ServiceConfig, CRYPTO_SID};

const CLIENTS: [ClientId; 2] = [ClientId(1), ClientId(2)];

#[derive(Debug, Arbitrary)]
enum Event {
    Connect { client: u8, version: u8 },
    Call {
        client: u8,
        conn: u8,
        msg_type: i8,
        descriptor: FuzzDescriptor,
        inputs: Vec<Vec<u8>>,
        outputs: Vec<u8>,
    },
    Close { client: u8, conn: u8 },
}

#[derive(Debug, Arbitrary)]
struct FuzzDescriptor {
    service: Option<u8>,
    op_handle: Option<u8>,
    bytes: Vec<u8>,
}

impl FuzzDescriptor {
    fn to_bytes(&self, handles: &[u32]) -> Vec<u8> {
        let mut bytes = self.bytes.clone();
        if let Some(index) = self.service {
            bytes.resize(DESCRIPTOR_SIZE, 0);
            let srv = ServiceId::ALL[usize::from(index) % ServiceId::ALL.len()];
            bytes[..2].copy_from_slice(&srv.raw().to_le_bytes());
            // Point at a handle the service issued so steps reach live contexts
            if let (Some(pick), false) = (self.op_handle, handles.is_empty()) {
                let handle = handles[usize::from(pick) % handles.len()];
                bytes[12..16].copy_from_slice(&handle.to_le_bytes());
            }
        }
        bytes
    }
}

/// Mostly the owner, sometimes either client.
fn pick_caller(pick: u8, owner: ClientId) -> ClientId {
    if pick % 4 == 0 { CLIENTS[usize::from(pick / 4) % CLIENTS.len()] } else { owner }
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    seed: u64,
    events: Vec<Event>,
}

fuzz_target!(|input: FuzzInput| {
    let config = ServiceConfig { max_connections: 3, max_operations: 4, max_keys: 4, ..ServiceConfig::default() };
    let Ok(mut runtime) =
        LocalRuntime::new(config.clone(), SimEnv::with_seed(input.seed), MemoryStorage::new(), CLIENTS[0])
    else {
        return;
    };
    if runtime.add_client(CLIENTS[1]).is_err() {
        return;
    }
    let pid = runtime.partition().pid();

    // Every handle each client was given, live or not
    let mut connections: Vec<(ClientId, Handle)> = Vec::new();
    let mut closed: Vec<(ClientId, Handle)> = Vec::new();
    // Operation handles seen in out[0]
    let mut op_handles: Vec<u32> = Vec::new();

    let pick = |list: &[(ClientId, Handle)], n: u8| {
        if list.is_empty() { None } else { Some(list[usize::from(n) % list.len()]) }
    };

    for event in input.events {
        match event {
            Event::Connect { client, version } => {
                let client = CLIENTS[usize::from(client) % CLIENTS.len()];
                runtime.switch_client(client);
                if let Ok(handle) = runtime.connect(CRYPTO_SID, u32::from(version % 3)) {
                    closed.retain(|&entry| entry != (client, handle));
                    connections.push((client, handle));
                }
            },
            Event::Call { client, conn, msg_type, descriptor, inputs, outputs } => {
                let Some((owner, handle)) = pick(&connections, conn) else { continue };
                let caller = pick_caller(client, owner);
                runtime.switch_client(caller);

                let descriptor = descriptor.to_bytes(&op_handles);
                let mut vectors: Vec<&[u8]> = vec![&descriptor];
                vectors.extend(inputs.iter().take(4).map(Vec::as_slice));
                let mut buffers: Vec<Vec<u8>> =
                    outputs.iter().take(4).map(|len| vec![0u8; usize::from(*len)]).collect();
                let mut slots: Vec<&mut [u8]> = buffers.iter_mut().map(Vec::as_mut_slice).collect();

                let result = runtime.call(handle, i32::from(msg_type), &vectors, &mut slots);
                if let Ok(reply) = &result {
                    for (len, slot) in reply.out_len.iter().zip(&slots) {
                        assert!(*len <= slot.len());
                    }
                    if let (Some(first), Some(4)) = (buffers.first(), reply.out_len.first()) {
                        let handle = u32::from_le_bytes([first[0], first[1], first[2], first[3]]);
                        if handle != 0 && !op_handles.contains(&handle) {
                            op_handles.push(handle);
                        }
                    }
                }
                if closed.contains(&(owner, handle)) && caller == owner {
                    assert!(result.is_err(), "call on a closed connection succeeded");
                }
            },
            Event::Close { client, conn } => {
                let Some((owner, handle)) = pick(&connections, conn) else { continue };
                let caller = pick_caller(client, owner);
                runtime.switch_client(caller);
                if runtime.close(handle).is_ok() && caller == owner {
                    closed.push((owner, handle));
                }
            },
        }

        assert_eq!(runtime.spm().partition_state(pid), Some(PartitionState::Running));
        // Teardowns may leave a DISCONNECT queued; the service drains it
        let _ = runtime.run_pending();
        assert_eq!(runtime.spm().outstanding_messages(), 0);
        assert!(runtime.spm().open_connections(CRYPTO_SID) <= config.max_connections);
        assert!(runtime.partition().operations().len() <= config.max_operations);
        assert!(runtime.partition().keys().loaded() <= config.max_keys);
    }

    // Closing everything leaves no operation behind
    for (owner, handle) in connections {
        runtime.switch_client(owner);
        let _ = runtime.close(handle);
    }
    let _ = runtime.run_pending();
    assert!(runtime.partition().operations().is_empty());
    assert_eq!(runtime.partition().connections(), 0);
});
