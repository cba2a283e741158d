//! Connection lifecycle and service admission policy.
//!
//! ```text
//!              connect            CONNECT replied OK
//! (none) ───────────────► Connecting ─────────────────► Open
//!                            │  refused/busy                │ close / fault
//!                            ▼                              ▼
//!                        (released)                      Closed ──► (released
//!                                                                    on DISCONNECT
//!                                                                    reply)
//! ```
//!
//! A connection carries at most one client message at a time. The
//! DISCONNECT message is tracked separately so that teardown can be queued
//! while a call is still being handled.

use tessera_proto::{ErrorCode, Signals};

use crate::{handle::Handle, spm::ClientId, spm::PartitionId};

/// Service identifier.
pub type Sid = u32;

/// How the requested version is matched against the service version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionPolicy {
    /// Requested version must equal the service version.
    Strict,
    /// Requested version must not exceed the service version.
    #[default]
    Relaxed,
}

/// Static description of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceManifest {
    /// Service identifier clients connect to.
    pub sid: Sid,
    /// Human-readable name, used in logs.
    pub name: String,
    /// Signal asserted for pending messages.
    pub signal: Signals,
    /// Service version.
    pub version: u32,
    /// Version matching policy.
    pub policy: VersionPolicy,
    /// Maximum simultaneous connections.
    pub max_connections: usize,
    /// Whether non-secure clients may connect.
    pub non_secure_allowed: bool,
}

impl ServiceManifest {
    /// Whether `client` may see this service at all.
    pub fn visible_to(&self, client: ClientId) -> bool {
        client.is_secure() || self.non_secure_allowed
    }

    /// Admission check for a new connection.
    ///
    /// Refusal (policy or version) is permanent for the request; busy is
    /// transient.
    pub fn admit(&self, client: ClientId, version: u32, open: usize) -> Result<(), ErrorCode> {
        if !self.visible_to(client) {
            return Err(ErrorCode::ConnectionRefused);
        }
        let version_ok = match self.policy {
            VersionPolicy::Strict => version == self.version,
            VersionPolicy::Relaxed => version != 0 && version <= self.version,
        };
        if !version_ok {
            return Err(ErrorCode::ConnectionRefused);
        }
        if open >= self.max_connections {
            return Err(ErrorCode::ConnectionBusy);
        }
        Ok(())
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// CONNECT queued or being handled.
    Connecting,
    /// Accepted by the service.
    Open,
    /// Closed by the client, torn down after a fault, or orphaned by a
    /// terminated partition.
    Closed,
}

/// One client-to-service connection.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Owning client.
    pub client: ClientId,
    /// Target service.
    pub sid: Sid,
    /// Partition hosting the service.
    pub partition: PartitionId,
    /// Version the client asked for.
    pub version: u32,
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Reverse handle set by the service.
    pub rhandle: u64,
    /// CONNECT or CALL message currently outstanding.
    pub in_flight: Option<Handle>,
    /// DISCONNECT message currently outstanding.
    pub disconnect: Option<Handle>,
    /// Client has given the handle up (close or fault). The entry lives on
    /// only until the service has finished with it.
    pub abandoned: bool,
}

impl Connection {
    /// New connection in the connecting state.
    pub fn new(client: ClientId, sid: Sid, partition: PartitionId, version: u32) -> Self {
        Self {
            client,
            sid,
            partition,
            version,
            state: ConnectionState::Connecting,
            rhandle: 0,
            in_flight: None,
            disconnect: None,
            abandoned: false,
        }
    }

    /// Whether the connection counts against the service limit.
    pub fn is_live(&self) -> bool {
        self.state != ConnectionState::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(policy: VersionPolicy) -> ServiceManifest {
        ServiceManifest {
            sid: 0x100,
            name: "svc".into(),
            signal: Signals::from_bits_retain(1 << 4),
            version: 2,
            policy,
            max_connections: 1,
            non_secure_allowed: false,
        }
    }

    #[test]
    fn strict_policy_needs_exact_version() {
        let m = manifest(VersionPolicy::Strict);
        assert_eq!(m.admit(ClientId(1), 2, 0), Ok(()));
        assert_eq!(m.admit(ClientId(1), 1, 0), Err(ErrorCode::ConnectionRefused));
    }

    #[test]
    fn relaxed_policy_accepts_older_versions() {
        let m = manifest(VersionPolicy::Relaxed);
        assert_eq!(m.admit(ClientId(1), 1, 0), Ok(()));
        assert_eq!(m.admit(ClientId(1), 3, 0), Err(ErrorCode::ConnectionRefused));
        assert_eq!(m.admit(ClientId(1), 0, 0), Err(ErrorCode::ConnectionRefused));
    }

    #[test]
    fn non_secure_refused_unless_allowed() {
        let mut m = manifest(VersionPolicy::Relaxed);
        assert_eq!(m.admit(ClientId(-1), 2, 0), Err(ErrorCode::ConnectionRefused));
        m.non_secure_allowed = true;
        assert_eq!(m.admit(ClientId(-1), 2, 0), Ok(()));
    }

    #[test]
    fn busy_when_full() {
        let m = manifest(VersionPolicy::Relaxed);
        assert_eq!(m.admit(ClientId(1), 2, 1), Err(ErrorCode::ConnectionBusy));
    }
}
