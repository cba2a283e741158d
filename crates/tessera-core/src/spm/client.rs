//! Client face of the partition manager.

use tessera_proto::{ErrorCode, FRAMEWORK_VERSION, MAX_IOVEC, Region, VERSION_NONE};
use tracing::{debug, instrument};

use super::{ClientId, Completion, PartitionManager, PartitionState, Reply};
use crate::{
    connection::{Connection, ConnectionState, Sid},
    error::{Fault, SpmError},
    handle::{Handle, HandleError},
    memory::check_call_regions,
};

impl PartitionManager {
    /// Version of the framework API.
    pub fn framework_version(&self) -> u32 {
        FRAMEWORK_VERSION
    }

    /// Version of `sid` as visible to `client`, or [`VERSION_NONE`] if the
    /// service is absent, hidden from the client, or its partition is gone.
    pub fn version(&self, client: ClientId, sid: Sid) -> u32 {
        let Some(service) = self.services.get(&sid) else {
            return VERSION_NONE;
        };
        let running =
            self.partition(service.partition).is_some_and(|p| p.state == PartitionState::Running);
        if running && service.manifest.visible_to(client) {
            service.manifest.version
        } else {
            VERSION_NONE
        }
    }

    /// Open a connection to `sid`.
    ///
    /// Admission (visibility, version, connection limit) is decided here;
    /// on success a CONNECT message is queued and the returned handle is in
    /// the connecting state until the service replies. Collect the outcome
    /// with [`take_reply`](Self::take_reply).
    #[instrument(skip(self), level = "debug")]
    pub fn connect(&mut self, client: ClientId, sid: Sid, version: u32) -> Result<Handle, SpmError> {
        if !self.clients.contains_key(&client) {
            return Err(Fault::UnknownClient.into());
        }
        let Some(service) = self.services.get(&sid) else {
            return Err(ErrorCode::ConnectionRefused.into());
        };
        let pid = service.partition;
        if self.partition(pid).is_none_or(|p| p.state != PartitionState::Running) {
            return Err(ErrorCode::ConnectionRefused.into());
        }
        service.manifest.admit(client, version, self.open_connections(sid))?;

        let conn = self
            .connections
            .allocate(Connection::new(client, sid, pid, version))
            .map_err(|_| ErrorCode::ConnectionBusy)?;
        match self.queue_message(conn, tessera_proto::CONNECT, Vec::new(), Vec::new()) {
            Ok(msg) => {
                if let Ok(c) = self.connections.get_mut(conn) {
                    c.in_flight = Some(msg);
                }
                Ok(conn)
            },
            Err(err) => {
                let _ = self.connections.release(conn);
                Err(err)
            },
        }
    }

    /// Issue a call on an open connection.
    ///
    /// Every region is validated against the client's address space before
    /// anything is queued. Contract violations are fatal and tear the
    /// connection down; a call on a connection that is not open fails with
    /// `BAD_STATE` and changes nothing.
    #[instrument(skip(self, inputs, outputs), level = "debug")]
    pub fn call(
        &mut self,
        client: ClientId,
        handle: Handle,
        msg_type: i32,
        inputs: &[Region],
        outputs: &[Region],
    ) -> Result<(), SpmError> {
        let conn = self.owned_connection(client, handle)?;
        match conn.state {
            ConnectionState::Connecting | ConnectionState::Closed => {
                return Err(ErrorCode::BadState.into());
            },
            ConnectionState::Open => {},
        }
        if conn.in_flight.is_some() {
            return Err(self.connection_fault(handle, Fault::ConcurrentCall));
        }
        if msg_type < 0 {
            return Err(self.connection_fault(handle, Fault::InvalidMessageType(msg_type)));
        }
        if inputs.len() + outputs.len() > MAX_IOVEC {
            let fault = Fault::TooManyVectors { inputs: inputs.len(), outputs: outputs.len() };
            return Err(self.connection_fault(handle, fault));
        }
        let checked = match self.clients.get(&client) {
            Some(space) => check_call_regions(space, inputs, outputs),
            None => return Err(Fault::UnknownClient.into()),
        };
        if let Err(err) = checked {
            return Err(self.connection_fault(handle, Fault::BadRegion(err)));
        }

        let msg = self.queue_message(handle, msg_type, inputs.to_vec(), outputs.to_vec())?;
        if let Ok(c) = self.connections.get_mut(handle) {
            c.in_flight = Some(msg);
        }
        Ok(())
    }

    /// Collect the completion of the last CONNECT or call on `handle`.
    ///
    /// Returns `Ok(None)` while the service has not replied. A refused
    /// CONNECT yields a reply with the refusal status and invalidates the
    /// handle. A service-rejected call yields a fatal error.
    pub fn take_reply(&mut self, client: ClientId, handle: Handle) -> Result<Option<Reply>, SpmError> {
        if let Some((owner, _)) = self.completions.get(&handle) {
            if *owner != client {
                return Err(Fault::NotOwner.into());
            }
            return match self.completions.remove(&handle) {
                Some((_, Completion::Reply(reply))) => Ok(Some(reply)),
                Some((_, Completion::Fault(fault))) => Err(fault.into()),
                None => Ok(None),
            };
        }
        let conn = self.owned_connection(client, handle)?;
        if conn.in_flight.is_some() {
            Ok(None)
        } else {
            Err(Fault::InvalidHandle(HandleError::Stale(handle)).into())
        }
    }

    /// Close a connection. Closing the null handle does nothing.
    ///
    /// The service receives a DISCONNECT. Closing with a message in flight
    /// is a fault.
    #[instrument(skip(self), level = "debug")]
    pub fn close(&mut self, client: ClientId, handle: Handle) -> Result<(), SpmError> {
        if handle.is_null() {
            return Ok(());
        }
        let conn = self.owned_connection(client, handle)?;
        if conn.in_flight.is_some() {
            return Err(self.connection_fault(handle, Fault::CloseInFlight));
        }
        self.teardown(handle);
        debug!(%handle, "closed");
        Ok(())
    }

    /// Resolve `handle` to a connection owned by `client` that the client
    /// has not given up.
    fn owned_connection(&self, client: ClientId, handle: Handle) -> Result<&Connection, SpmError> {
        if !self.clients.contains_key(&client) {
            return Err(Fault::UnknownClient.into());
        }
        let conn = self.connections.get(handle)?;
        if conn.client != client {
            return Err(Fault::NotOwner.into());
        }
        if conn.abandoned {
            return Err(Fault::InvalidHandle(HandleError::Stale(handle)).into());
        }
        Ok(conn)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tessera_proto::Signals;

    use super::*;
    use crate::{
        connection::{ServiceManifest, VersionPolicy},
        memory::Access,
        signal::Timeout,
        spm::PartitionId,
    };

    const SID: Sid = 0x40;
    const SIG: Signals = Signals::from_bits_retain(1 << 4);
    const ALICE: ClientId = ClientId(1);
    const MALLORY: ClientId = ClientId(2);

    fn setup() -> (PartitionManager, PartitionId) {
        let mut spm = PartitionManager::new();
        spm.register_client(ALICE).unwrap();
        spm.register_client(MALLORY).unwrap();
        let pid = spm
            .register_partition(
                "svc",
                vec![ServiceManifest {
                    sid: SID,
                    name: "svc".into(),
                    signal: SIG,
                    version: 1,
                    policy: VersionPolicy::Strict,
                    max_connections: 2,
                    non_secure_allowed: false,
                }],
            )
            .unwrap();
        (spm, pid)
    }

    /// Serve queued messages up to and including the next CONNECT.
    fn accept(spm: &mut PartitionManager, pid: PartitionId) {
        loop {
            assert_eq!(spm.wait(pid, SIG, Timeout::Poll).unwrap(), SIG);
            let msg = spm.get(pid, SIG).unwrap();
            spm.reply(pid, msg.handle, 0).unwrap();
            if msg.msg_type == tessera_proto::CONNECT {
                break;
            }
        }
    }

    fn open(spm: &mut PartitionManager, pid: PartitionId, client: ClientId) -> Handle {
        let h = spm.connect(client, SID, 1).unwrap();
        accept(spm, pid);
        assert_eq!(spm.take_reply(client, h).unwrap().unwrap().status, 0);
        h
    }

    #[test]
    fn version_queries() {
        let (spm, _) = setup();
        assert_eq!(spm.framework_version(), 0x0101);
        assert_eq!(spm.version(ALICE, SID), 1);
        assert_eq!(spm.version(ALICE, 0x99), VERSION_NONE);
        assert_eq!(spm.version(ClientId(-5), SID), VERSION_NONE);
    }

    #[test]
    fn connect_refused_without_lingering_handle() {
        let (mut spm, _) = setup();
        assert_eq!(spm.connect(ALICE, SID, 2), Err(ErrorCode::ConnectionRefused.into()));
        assert_eq!(spm.connect(ALICE, 0x99, 1), Err(ErrorCode::ConnectionRefused.into()));
        assert_eq!(spm.open_connections(SID), 0);
    }

    #[test]
    fn busy_when_limit_reached() {
        let (mut spm, pid) = setup();
        open(&mut spm, pid, ALICE);
        open(&mut spm, pid, ALICE);
        assert_eq!(spm.connect(ALICE, SID, 1), Err(ErrorCode::ConnectionBusy.into()));
    }

    #[test]
    fn call_on_connecting_is_bad_state_without_side_effects() {
        let (mut spm, pid) = setup();
        let h = spm.connect(ALICE, SID, 1).unwrap();
        assert_eq!(spm.call(ALICE, h, 0, &[], &[]), Err(ErrorCode::BadState.into()));
        assert_eq!(spm.connection_state(h), Some(ConnectionState::Connecting));
        assert_eq!(spm.outstanding_messages(), 1);
        accept(&mut spm, pid);
        assert_eq!(spm.take_reply(ALICE, h).unwrap().unwrap().status, 0);
        assert_eq!(spm.connection_state(h), Some(ConnectionState::Open));
    }

    #[test]
    fn other_clients_handle_is_not_owned() {
        let (mut spm, pid) = setup();
        let h = open(&mut spm, pid, ALICE);
        assert_eq!(spm.call(MALLORY, h, 0, &[], &[]), Err(Fault::NotOwner.into()));
        assert_eq!(spm.close(MALLORY, h), Err(Fault::NotOwner.into()));
        assert_eq!(spm.connection_state(h), Some(ConnectionState::Open));
    }

    #[test]
    fn forged_handle_is_fatal_without_teardown() {
        let (mut spm, pid) = setup();
        let h = open(&mut spm, pid, ALICE);
        let err = spm.call(ALICE, Handle::from_raw(h.raw() ^ 0x0001_0000), 0, &[], &[]);
        assert!(err.unwrap_err().is_fatal());
        assert_eq!(spm.connection_state(h), Some(ConnectionState::Open));
    }

    #[test]
    fn concurrent_call_tears_down() {
        let (mut spm, pid) = setup();
        let h = open(&mut spm, pid, ALICE);
        spm.call(ALICE, h, 0, &[], &[]).unwrap();
        assert_eq!(spm.call(ALICE, h, 0, &[], &[]), Err(Fault::ConcurrentCall.into()));
        assert_eq!(spm.connection_state(h), Some(ConnectionState::Closed));
        // Withdrawn call, DISCONNECT queued in its place.
        assert_eq!(spm.outstanding_messages(), 1);
        let msg = spm.get(pid, SIG).unwrap();
        assert_eq!(msg.msg_type, tessera_proto::DISCONNECT);
        spm.reply(pid, msg.handle, 0).unwrap();
        assert_eq!(spm.connection_state(h), None);
    }

    #[test]
    fn negative_type_and_too_many_vectors_are_fatal() {
        let (mut spm, pid) = setup();
        let h = open(&mut spm, pid, ALICE);
        assert_eq!(spm.call(ALICE, h, -3, &[], &[]), Err(Fault::InvalidMessageType(-3).into()));

        let h = open(&mut spm, pid, ALICE);
        let r = [Region::NULL; 3];
        assert_eq!(
            spm.call(ALICE, h, 0, &r, &r[..2]),
            Err(Fault::TooManyVectors { inputs: 3, outputs: 2 }.into())
        );
    }

    #[test]
    fn foreign_region_is_fatal() {
        let (mut spm, pid) = setup();
        let h = open(&mut spm, pid, ALICE);
        let theirs = spm.address_space_mut(MALLORY).unwrap().map(vec![0; 8], Access::READ);
        spm.address_space_mut(ALICE).unwrap().map(vec![0; 4], Access::READ);
        let err = spm.call(ALICE, h, 0, &[Region::new(theirs.base, 64)], &[]).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(spm.connection_state(h), Some(ConnectionState::Closed));
    }

    #[test]
    fn close_queues_disconnect_and_handle_dies() {
        let (mut spm, pid) = setup();
        let h = open(&mut spm, pid, ALICE);
        spm.close(ALICE, h).unwrap();
        assert!(spm.close(ALICE, h).unwrap_err().is_fatal());
        let msg = spm.get(pid, SIG).unwrap();
        assert_eq!(msg.msg_type, tessera_proto::DISCONNECT);
        spm.reply(pid, msg.handle, 0).unwrap();
        assert_eq!(spm.open_connections(SID), 0);
        assert_eq!(spm.close(ALICE, Handle::NULL), Ok(()));
    }

    #[test]
    fn close_in_flight_is_fatal() {
        let (mut spm, pid) = setup();
        let h = open(&mut spm, pid, ALICE);
        spm.call(ALICE, h, 0, &[], &[]).unwrap();
        let msg = spm.get(pid, SIG).unwrap();
        assert_eq!(spm.close(ALICE, h), Err(Fault::CloseInFlight.into()));
        // Reply to the orphaned call is dropped; then the DISCONNECT follows.
        spm.reply(pid, msg.handle, 0).unwrap();
        assert!(spm.take_reply(ALICE, h).unwrap_err().is_fatal());
        let disconnect = spm.get(pid, SIG).unwrap();
        assert_eq!(disconnect.msg_type, tessera_proto::DISCONNECT);
        spm.reply(pid, disconnect.handle, 0).unwrap();
        assert_eq!(spm.connection_state(h), None);
    }
}
