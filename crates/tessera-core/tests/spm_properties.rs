//! Property tests for the partition manager.
//!
//! Random interleavings of client and service actions must never break the
//! manager's bookkeeping: connection limits hold, faults stay local, and a
//! call on a connection that is not open changes nothing.

use proptest::prelude::*;
use tessera_core::{
    Access, ClientId, ConnectionState, Handle, PartitionId, PartitionManager, PartitionState,
    ServiceManifest, SpmError, Timeout, VersionPolicy,
};
use tessera_proto::{CONNECT, ErrorCode, Region, SUCCESS, Signals};

const SID: u32 = 0x40;
const SIG: Signals = Signals::from_bits_retain(1 << 4);
const MAX_CONNECTIONS: usize = 3;
const CLIENTS: [ClientId; 2] = [ClientId(1), ClientId(-7)];

#[derive(Debug, Clone)]
enum Action {
    Connect { client: usize },
    Call { client: usize, conn: usize, len: usize },
    Close { client: usize, conn: usize },
    Collect { client: usize, conn: usize },
    Serve { status: i32 },
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0..2usize).prop_map(|client| Action::Connect { client }),
        (0..2usize, 0..6usize, 0..16usize)
            .prop_map(|(client, conn, len)| Action::Call { client, conn, len }),
        (0..2usize, 0..6usize).prop_map(|(client, conn)| Action::Close { client, conn }),
        (0..2usize, 0..6usize).prop_map(|(client, conn)| Action::Collect { client, conn }),
        prop_oneof![Just(SUCCESS), Just(ErrorCode::ConnectionBusy.code()), Just(1)]
            .prop_map(|status| Action::Serve { status }),
    ]
}

fn setup() -> (PartitionManager, PartitionId) {
    let mut spm = PartitionManager::new();
    for client in CLIENTS {
        spm.register_client(client).unwrap();
    }
    let pid = spm
        .register_partition(
            "svc",
            vec![ServiceManifest {
                sid: SID,
                name: "svc".into(),
                signal: SIG,
                version: 1,
                policy: VersionPolicy::Relaxed,
                max_connections: MAX_CONNECTIONS,
                non_secure_allowed: true,
            }],
        )
        .unwrap();
    (spm, pid)
}

/// Serve one message the way a well-behaved service would.
fn serve(spm: &mut PartitionManager, pid: PartitionId, status: i32) {
    match spm.wait(pid, SIG, Timeout::Block) {
        Ok(_) => {},
        Err(SpmError::Blocked) => return,
        Err(err) => panic!("wait failed: {err}"),
    }
    let msg = spm.get(pid, SIG).unwrap();
    let status = if msg.msg_type == CONNECT && status > 0 { SUCCESS } else { status };
    if msg.msg_type >= 0 {
        let mut buf = [0u8; 4];
        spm.read(pid, msg.handle, 0, &mut buf).unwrap();
        let n = msg.out_size[0].min(2);
        spm.write(pid, msg.handle, 0, &[0x5a; 2][..n]).unwrap();
    }
    spm.reply(pid, msg.handle, status).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn bookkeeping_survives_any_interleaving(actions in prop::collection::vec(action(), 1..60)) {
        let (mut spm, pid) = setup();
        let mut handles: Vec<Vec<Handle>> = vec![Vec::new(), Vec::new()];

        for action in actions {
            match action {
                Action::Connect { client } => {
                    if let Ok(h) = spm.connect(CLIENTS[client], SID, 1) {
                        handles[client].push(h);
                    }
                },
                Action::Call { client, conn, len } => {
                    let Some(&h) = handles[client].get(conn) else { continue };
                    let before = spm.connection_state(h);
                    let outstanding = spm.outstanding_messages();
                    let space = spm.address_space_mut(CLIENTS[client]).unwrap();
                    let input = space.map(vec![7; len], Access::READ);
                    let output = space.map_zeroed(len, Access::WRITE);
                    let result = spm.call(CLIENTS[client], h, 0, &[input], &[output]);

                    if matches!(before, Some(ConnectionState::Connecting | ConnectionState::Closed)) {
                        prop_assert!(result.is_err());
                        prop_assert_eq!(spm.connection_state(h), before);
                        prop_assert_eq!(spm.outstanding_messages(), outstanding);
                    }
                },
                Action::Close { client, conn } => {
                    if let Some(&h) = handles[client].get(conn) {
                        let _ = spm.close(CLIENTS[client], h);
                    }
                },
                Action::Collect { client, conn } => {
                    if let Some(&h) = handles[client].get(conn) {
                        let _ = spm.take_reply(CLIENTS[client], h);
                    }
                },
                Action::Serve { status } => serve(&mut spm, pid, status),
            }

            prop_assert!(spm.open_connections(SID) <= MAX_CONNECTIONS);
            prop_assert_eq!(spm.partition_state(pid), Some(PartitionState::Running));
        }
    }

    #[test]
    fn forged_handles_never_touch_live_connections(raw in any::<u32>()) {
        let (mut spm, pid) = setup();
        let h = spm.connect(CLIENTS[0], SID, 1).unwrap();
        serve(&mut spm, pid, SUCCESS);
        spm.take_reply(CLIENTS[0], h).unwrap();

        let forged = Handle::from_raw(raw);
        prop_assume!(forged != h);
        let result = spm.call(CLIENTS[0], forged, 0, &[], &[]);
        prop_assert!(result.unwrap_err().is_fatal());
        prop_assert_eq!(spm.connection_state(h), Some(ConnectionState::Open));
    }

    #[test]
    fn unmapped_regions_are_fatal(base in 1u64..u64::MAX, len in 1u64..4096) {
        let (mut spm, pid) = setup();
        let h = spm.connect(CLIENTS[0], SID, 1).unwrap();
        serve(&mut spm, pid, SUCCESS);
        spm.take_reply(CLIENTS[0], h).unwrap();

        let result = spm.call(CLIENTS[0], h, 0, &[Region::new(base, len)], &[]);
        prop_assert!(result.unwrap_err().is_fatal());
        prop_assert_eq!(spm.outstanding_messages(), 1);
        prop_assert_eq!(spm.partition_state(pid), Some(PartitionState::Running));
    }
}
