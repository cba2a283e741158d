//! Secure partition manager.
//!
//! Ties the handle tables, client address spaces, signal dispatchers and
//! connection state machines together behind the two faces of the IPC API:
//!
//! - client side ([`client`]): `connect`, `call`, `close`, `version`, plus
//!   `take_reply` to collect a completion.
//! - partition side ([`partition`]): `wait`, `get`, `read`, `skip`,
//!   `write`, `reply`, `set_rhandle`, `notify`, `clear`, `panic`.
//!
//! The manager is sans-IO: it never blocks. A client call queues a message
//! and returns; the driver (a runtime) runs the service partition until the
//! reply has been recorded, then hands it to the client. A blocking `wait`
//! with nothing asserted returns [`SpmError::Blocked`].
//!
//! # Fault isolation
//!
//! A client programmer error tears down the one connection involved. A
//! partition programmer error terminates that partition: its queued and
//! delivered calls complete with `CONNECTION_REFUSED` and it accepts no new
//! connections. Other clients and partitions are unaffected.

mod client;
mod partition;

use std::collections::HashMap;

use tessera_proto::{CONNECT, DISCONNECT, ErrorCode, Region, Status};
use tracing::{debug, warn};

use crate::{
    connection::{Connection, ConnectionState, ServiceManifest, Sid},
    error::{Fault, SpmError},
    handle::{Handle, HandleKind, HandleTable},
    memory::AddressSpace,
    message::PendingMessage,
    signal::SignalDispatcher,
};

/// Default limit on simultaneously tracked connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// Identity of a client. Positive ids are secure clients, negative ids are
/// non-secure clients; zero is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub i32);

impl ClientId {
    /// Whether the client runs in the secure world.
    pub fn is_secure(self) -> bool {
        self.0 > 0
    }
}

/// Identity of a registered partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId(pub u32);

/// Lifecycle of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    /// Serving messages.
    Running,
    /// Terminated after `panic` or a programmer error.
    Terminated,
}

/// Completed message as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Status returned by the service.
    pub status: Status,
    /// Bytes written into each output vector.
    pub out_len: Vec<usize>,
}

impl Reply {
    fn status_only(status: Status) -> Self {
        Self { status, out_len: Vec::new() }
    }

    /// Whether the status denotes success.
    pub fn is_success(&self) -> bool {
        self.status >= 0
    }
}

#[derive(Debug, Clone)]
enum Completion {
    Reply(Reply),
    Fault(Fault),
}

#[derive(Debug)]
struct Partition {
    name: String,
    dispatcher: SignalDispatcher,
    state: PartitionState,
}

#[derive(Debug)]
struct Service {
    manifest: ServiceManifest,
    partition: PartitionId,
}

/// The partition manager.
#[derive(Debug)]
pub struct PartitionManager {
    clients: HashMap<ClientId, AddressSpace>,
    partitions: Vec<Partition>,
    services: HashMap<Sid, Service>,
    connections: HandleTable<Connection>,
    messages: HandleTable<PendingMessage>,
    completions: HashMap<Handle, (ClientId, Completion)>,
}

impl Default for PartitionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionManager {
    /// Manager with the default connection limit.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CONNECTIONS)
    }

    /// Manager tracking at most `max_connections` connections.
    ///
    /// Each connection holds at most one call and one DISCONNECT message, so
    /// the message table is sized to twice the connection table.
    pub fn with_capacity(max_connections: usize) -> Self {
        Self {
            clients: HashMap::new(),
            partitions: Vec::new(),
            services: HashMap::new(),
            connections: HandleTable::new(HandleKind::Connection, max_connections),
            messages: HandleTable::new(HandleKind::Message, max_connections.saturating_mul(2)),
            completions: HashMap::new(),
        }
    }

    /// Register a client with an empty address space.
    pub fn register_client(&mut self, client: ClientId) -> Result<(), SpmError> {
        if client.0 == 0 {
            return Err(ErrorCode::InvalidArgument.into());
        }
        if self.clients.contains_key(&client) {
            return Err(ErrorCode::AlreadyExists.into());
        }
        self.clients.insert(client, AddressSpace::new());
        Ok(())
    }

    /// Register a partition hosting `services`.
    ///
    /// Nothing is registered if any service id is already taken or any
    /// signal is unusable.
    pub fn register_partition(
        &mut self,
        name: &str,
        services: Vec<ServiceManifest>,
    ) -> Result<PartitionId, SpmError> {
        let mut dispatcher = SignalDispatcher::new();
        for (i, manifest) in services.iter().enumerate() {
            let duplicate = self.services.contains_key(&manifest.sid)
                || services[..i].iter().any(|m| m.sid == manifest.sid);
            if duplicate {
                return Err(ErrorCode::AlreadyExists.into());
            }
            dispatcher.register(manifest.signal).map_err(|_| ErrorCode::InvalidArgument)?;
        }

        let id = PartitionId(
            u32::try_from(self.partitions.len()).map_err(|_| ErrorCode::InsufficientMemory)?,
        );
        for manifest in services {
            debug!(partition = name, sid = manifest.sid, service = %manifest.name, "registered service");
            self.services.insert(manifest.sid, Service { manifest, partition: id });
        }
        self.partitions.push(Partition {
            name: name.to_owned(),
            dispatcher,
            state: PartitionState::Running,
        });
        Ok(id)
    }

    /// Address space of `client`.
    pub fn address_space(&self, client: ClientId) -> Option<&AddressSpace> {
        self.clients.get(&client)
    }

    /// Mutable address space of `client`, used to map call buffers.
    pub fn address_space_mut(&mut self, client: ClientId) -> Option<&mut AddressSpace> {
        self.clients.get_mut(&client)
    }

    /// Lifecycle state of a connection, if the handle is live.
    pub fn connection_state(&self, handle: Handle) -> Option<ConnectionState> {
        self.connections.get(handle).ok().map(|c| c.state)
    }

    /// Number of connections to `sid` that count against its limit.
    pub fn open_connections(&self, sid: Sid) -> usize {
        self.connections.iter().filter(|(_, c)| c.sid == sid && c.is_live()).count()
    }

    /// Lifecycle state of a partition.
    pub fn partition_state(&self, pid: PartitionId) -> Option<PartitionState> {
        self.partition(pid).map(|p| p.state)
    }

    /// Number of messages not yet replied to.
    pub fn outstanding_messages(&self) -> usize {
        self.messages.len()
    }

    fn partition(&self, pid: PartitionId) -> Option<&Partition> {
        self.partitions.get(pid.0 as usize)
    }

    fn partition_mut(&mut self, pid: PartitionId) -> Option<&mut Partition> {
        self.partitions.get_mut(pid.0 as usize)
    }

    fn running(&self, pid: PartitionId) -> Result<&Partition, Fault> {
        let partition = self.partition(pid).ok_or(Fault::UnknownPartition)?;
        if partition.state == PartitionState::Terminated {
            return Err(Fault::PartitionTerminated);
        }
        Ok(partition)
    }

    /// Allocate a message for `conn` and queue it on its service signal.
    fn queue_message(
        &mut self,
        conn: Handle,
        msg_type: i32,
        inputs: Vec<Region>,
        outputs: Vec<Region>,
    ) -> Result<Handle, SpmError> {
        let (client, sid, pid) = {
            let c = self.connections.get(conn)?;
            (c.client, c.sid, c.partition)
        };
        let signal = self
            .services
            .get(&sid)
            .map(|s| s.manifest.signal)
            .ok_or(ErrorCode::DoesNotExist)?;
        let msg = self
            .messages
            .allocate(PendingMessage::new(pid, conn, client, msg_type, inputs, outputs))
            .map_err(|_| ErrorCode::InsufficientMemory)?;

        let queued = match self.partition_mut(pid) {
            Some(p) => p.dispatcher.enqueue(signal, msg),
            None => return Err(Fault::UnknownPartition.into()),
        };
        if let Err(err) = queued {
            let _ = self.messages.release(msg);
            return Err(err.into());
        }
        debug!(%conn, %msg, msg_type, sid, "queued message");
        Ok(msg)
    }

    fn complete(&mut self, conn: Handle, client: ClientId, completion: Completion) {
        self.completions.insert(conn, (client, completion));
    }

    /// Tear down a connection after a client-side fault or an explicit close.
    ///
    /// The in-flight message is withdrawn if still queued, or orphaned if the
    /// service already holds it. A DISCONNECT is queued when the service had
    /// accepted the connection. The entry is released once the service no
    /// longer references it.
    fn teardown(&mut self, conn: Handle) {
        let Ok(c) = self.connections.get_mut(conn) else {
            return;
        };
        let was = c.state;
        let pid = c.partition;
        c.state = ConnectionState::Closed;
        c.abandoned = true;
        let in_flight = c.in_flight.take();
        self.completions.remove(&conn);

        if let Some(msg) = in_flight {
            let withdrawn = self.partition_mut(pid).is_some_and(|p| p.dispatcher.withdraw(msg));
            if withdrawn {
                let _ = self.messages.release(msg);
            } else if let Ok(m) = self.messages.get_mut(msg) {
                m.orphaned = true;
                if let Ok(c) = self.connections.get_mut(conn) {
                    c.in_flight = Some(msg);
                }
            }
        }

        let alive = self.partition(pid).is_some_and(|p| p.state == PartitionState::Running);
        let needs_disconnect = was == ConnectionState::Open
            && alive
            && self.connections.get(conn).is_ok_and(|c| c.disconnect.is_none());
        if needs_disconnect {
            self.queue_disconnect(conn);
        }
        self.reap(conn);
        debug!(%conn, ?was, "connection torn down");
    }

    fn queue_disconnect(&mut self, conn: Handle) {
        match self.queue_message(conn, DISCONNECT, Vec::new(), Vec::new()) {
            Ok(msg) => {
                if let Ok(c) = self.connections.get_mut(conn) {
                    c.disconnect = Some(msg);
                }
            },
            Err(err) => warn!(%conn, %err, "failed to queue disconnect"),
        }
    }

    /// Release an abandoned connection with no outstanding messages.
    fn reap(&mut self, conn: Handle) {
        let idle = self
            .connections
            .get(conn)
            .is_ok_and(|c| c.abandoned && c.in_flight.is_none() && c.disconnect.is_none());
        if idle {
            let _ = self.connections.release(conn);
        }
    }

    /// Tear down `conn` and report `fault` to the caller.
    fn connection_fault(&mut self, conn: Handle, fault: Fault) -> SpmError {
        warn!(%conn, %fault, "client fault, connection torn down");
        self.teardown(conn);
        SpmError::Fatal(fault)
    }

    /// Terminate `pid` and report `fault` to the caller.
    fn partition_fault(&mut self, pid: PartitionId, fault: Fault) -> SpmError {
        if let Some(p) = self.partition(pid).filter(|p| p.state == PartitionState::Running) {
            warn!(partition = %p.name, %fault, "partition fault, terminating");
            self.terminate(pid);
        }
        SpmError::Fatal(fault)
    }

    fn or_terminate<T>(&mut self, pid: PartitionId, result: Result<T, Fault>) -> Result<T, SpmError> {
        result.map_err(|fault| self.partition_fault(pid, fault))
    }

    /// Terminate a partition, completing everything it holds.
    fn terminate(&mut self, pid: PartitionId) {
        let Some(partition) = self.partition_mut(pid) else {
            return;
        };
        if partition.state == PartitionState::Terminated {
            return;
        }
        partition.state = PartitionState::Terminated;
        partition.dispatcher.drain();

        let refused = Reply::status_only(ErrorCode::ConnectionRefused.code());
        for msg in self.messages.handles_where(|m| m.partition == pid) {
            let Ok(m) = self.messages.release(msg) else { continue };
            if m.orphaned || m.msg_type == DISCONNECT {
                continue;
            }
            if m.msg_type == CONNECT {
                if let Ok(c) = self.connections.get_mut(m.connection) {
                    c.abandoned = true;
                }
            }
            self.complete(m.connection, m.client, Completion::Reply(refused.clone()));
        }

        for conn in self.connections.handles_where(|c| c.partition == pid) {
            if let Ok(c) = self.connections.get_mut(conn) {
                c.state = ConnectionState::Closed;
                c.in_flight = None;
                c.disconnect = None;
            }
            self.reap(conn);
        }
    }
}
