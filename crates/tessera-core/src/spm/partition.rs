//! Partition face of the partition manager.
//!
//! Every contract violation here terminates the calling partition.

use tessera_proto::{CONNECT, DISCONNECT, ErrorCode, MAX_IOVEC, Region, SUCCESS, Signals, Status};
use tracing::{debug, warn};

use super::{ClientId, Completion, PartitionId, PartitionManager, PartitionState, Reply};
use crate::{
    connection::ConnectionState,
    error::{Fault, SpmError},
    handle::{Handle, HandleError},
    memory::RegionError,
    message::{Message, PendingMessage},
    signal::{Timeout, WaitOutcome},
};

/// Position of one vector of a delivered message.
struct Cursor {
    region: Region,
    offset: u64,
    client: ClientId,
    orphaned: bool,
}

impl Cursor {
    fn remaining(&self) -> u64 {
        self.region.len.saturating_sub(self.offset)
    }
}

impl PartitionManager {
    /// Signals in `mask` that are asserted for `pid`.
    ///
    /// Polling with nothing asserted returns the empty set; blocking with
    /// nothing asserted returns [`SpmError::Blocked`] and the driver retries
    /// once something has been queued.
    pub fn wait(&mut self, pid: PartitionId, mask: Signals, timeout: Timeout) -> Result<Signals, SpmError> {
        let outcome =
            self.running(pid).and_then(|p| p.dispatcher.wait(mask, timeout).map_err(Fault::from));
        match self.or_terminate(pid, outcome)? {
            WaitOutcome::Ready(signals) => Ok(signals),
            WaitOutcome::WouldBlock => Err(SpmError::Blocked),
        }
    }

    /// Dequeue the oldest message for a single asserted `signal`.
    pub fn get(&mut self, pid: PartitionId, signal: Signals) -> Result<Message, SpmError> {
        let checked = self.running(pid).map(|_| ());
        self.or_terminate(pid, checked)?;
        let dequeued = match self.partition_mut(pid) {
            Some(p) => p.dispatcher.get(signal).map_err(Fault::from),
            None => Err(Fault::UnknownPartition),
        };
        let Some(msg) = self.or_terminate(pid, dequeued)? else {
            return Err(ErrorCode::DoesNotExist.into());
        };

        let m = self.messages.get_mut(msg)?;
        m.delivered = true;
        let conn = m.connection;
        let rhandle = self.connections.get(conn).map_or(0, |c| c.rhandle);
        let view = self.messages.get(msg)?.view(msg, rhandle);
        debug!(%msg, %conn, msg_type = view.msg_type, "delivered message");
        Ok(view)
    }

    /// Copy from input vector `idx` into `buf`, advancing the read cursor.
    /// Returns the number of bytes copied.
    pub fn read(&mut self, pid: PartitionId, msg: Handle, idx: usize, buf: &mut [u8]) -> Result<usize, SpmError> {
        let cursor = self.delivered(pid, msg).and_then(|m| input_cursor(m, idx));
        let cursor = self.or_terminate(pid, cursor)?;
        if cursor.orphaned {
            return Ok(0);
        }
        let loaded = match self.clients.get(&cursor.client) {
            Some(space) => space.load(cursor.region, cursor.offset, buf),
            None => Ok(0),
        };
        match loaded {
            Ok(n) => {
                if let Ok(m) = self.messages.get_mut(msg) {
                    m.read_pos[idx] += n as u64;
                }
                Ok(n)
            },
            Err(err) => {
                self.client_region_lost(msg, err);
                Ok(0)
            },
        }
    }

    /// Read the unread remainder of input vector `idx`.
    pub fn read_to_vec(&mut self, pid: PartitionId, msg: Handle, idx: usize) -> Result<Vec<u8>, SpmError> {
        let cursor = self.delivered(pid, msg).and_then(|m| input_cursor(m, idx));
        let cursor = self.or_terminate(pid, cursor)?;
        let mut buf = vec![0; usize::try_from(cursor.remaining()).unwrap_or(0)];
        let n = self.read(pid, msg, idx, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Advance the read cursor of input vector `idx` by up to `n` bytes.
    /// Returns the number of bytes skipped.
    pub fn skip(&mut self, pid: PartitionId, msg: Handle, idx: usize, n: usize) -> Result<usize, SpmError> {
        let cursor = self.delivered(pid, msg).and_then(|m| input_cursor(m, idx));
        let cursor = self.or_terminate(pid, cursor)?;
        if cursor.orphaned {
            return Ok(0);
        }
        let skipped = cursor.remaining().min(n as u64);
        if let Ok(m) = self.messages.get_mut(msg) {
            m.read_pos[idx] += skipped;
        }
        Ok(usize::try_from(skipped).unwrap_or(usize::MAX))
    }

    /// Append `data` to output vector `idx`.
    ///
    /// Writing past the end of the vector is a fault.
    pub fn write(&mut self, pid: PartitionId, msg: Handle, idx: usize, data: &[u8]) -> Result<(), SpmError> {
        let cursor = self.delivered(pid, msg).and_then(|m| output_cursor(m, idx));
        let cursor = self.or_terminate(pid, cursor)?;
        if data.len() as u64 > cursor.remaining() {
            let fault = Fault::WriteOverflow {
                index: idx,
                requested: data.len(),
                available: usize::try_from(cursor.remaining()).unwrap_or(usize::MAX),
            };
            return Err(self.partition_fault(pid, fault));
        }
        if !cursor.orphaned {
            let stored = match self.clients.get_mut(&cursor.client) {
                Some(space) => space.store(cursor.region, cursor.offset, data),
                None => Ok(()),
            };
            if let Err(err) = stored {
                self.client_region_lost(msg, err);
                return Ok(());
            }
        }
        if let Ok(m) = self.messages.get_mut(msg) {
            m.written[idx] += data.len() as u64;
        }
        Ok(())
    }

    /// Complete a delivered message.
    ///
    /// - CONNECT accepts with `SUCCESS` or refuses with `CONNECTION_REFUSED`
    ///   or `CONNECTION_BUSY`; any other status is a fault.
    /// - A call completes with any status. `PROGRAMMER_ERROR` marks the
    ///   caller as faulted and tears its connection down.
    /// - DISCONNECT releases the connection; the status is ignored.
    pub fn reply(&mut self, pid: PartitionId, msg: Handle, status: Status) -> Result<(), SpmError> {
        let checked = self.delivered(pid, msg).map(|_| ());
        self.or_terminate(pid, checked)?;

        if self.messages.get(msg).is_ok_and(|m| m.msg_type == CONNECT) {
            let allowed = [
                SUCCESS,
                ErrorCode::ConnectionRefused.code(),
                ErrorCode::ConnectionBusy.code(),
            ];
            if !allowed.contains(&status) {
                return Err(self.partition_fault(pid, Fault::InvalidReplyStatus(status)));
            }
        }

        let m = self.messages.release(msg)?;
        let conn = m.connection;
        debug!(%msg, %conn, msg_type = m.msg_type, status, "reply");
        match m.msg_type {
            CONNECT => self.complete_connect(&m, status),
            DISCONNECT => {
                if let Ok(c) = self.connections.get_mut(conn) {
                    c.disconnect = None;
                }
                self.reap(conn);
            },
            _ => {
                if let Ok(c) = self.connections.get_mut(conn) {
                    c.in_flight = None;
                }
                if m.orphaned {
                    self.reap(conn);
                } else if status == ErrorCode::ProgrammerError.code() {
                    warn!(%conn, "service rejected call, connection torn down");
                    self.teardown(conn);
                    self.complete(conn, m.client, Completion::Fault(Fault::ServiceRejected));
                } else {
                    let reply = Reply { status, out_len: m.written_lengths() };
                    self.complete(conn, m.client, Completion::Reply(reply));
                }
            },
        }
        Ok(())
    }

    /// Associate `rhandle` with the connection of `msg`. It is delivered in
    /// every later message on that connection.
    pub fn set_rhandle(&mut self, pid: PartitionId, msg: Handle, rhandle: u64) -> Result<(), SpmError> {
        let checked = self.delivered(pid, msg).and_then(|m| {
            if m.msg_type == DISCONNECT {
                Err(Fault::InvalidMessageType(m.msg_type))
            } else {
                Ok(m.connection)
            }
        });
        let conn = self.or_terminate(pid, checked)?;
        if let Ok(c) = self.connections.get_mut(conn) {
            c.rhandle = rhandle;
        }
        Ok(())
    }

    /// Ring the doorbell of `target`.
    pub fn notify(&mut self, pid: PartitionId, target: PartitionId) -> Result<(), SpmError> {
        let checked = self.running(pid).map(|_| ()).and_then(|()| {
            self.partition(target).map(|_| ()).ok_or(Fault::UnknownPartition)
        });
        self.or_terminate(pid, checked)?;
        if let Some(p) = self.partition_mut(target).filter(|p| p.state == PartitionState::Running) {
            p.dispatcher.ring_doorbell();
        }
        Ok(())
    }

    /// Clear the doorbell of `pid`. Fails if it is not asserted.
    pub fn clear(&mut self, pid: PartitionId) -> Result<(), SpmError> {
        let running = self.running(pid).map(|_| ());
        let cleared = running.and_then(|()| match self.partition_mut(pid) {
            Some(p) => p.dispatcher.clear_doorbell().map_err(Fault::from),
            None => Err(Fault::UnknownPartition),
        });
        self.or_terminate(pid, cleared)
    }

    /// Terminate `pid` at its own request.
    pub fn panic(&mut self, pid: PartitionId) {
        if let Some(p) = self.partition(pid) {
            warn!(partition = %p.name, "partition panicked");
        }
        self.terminate(pid);
    }

    fn complete_connect(&mut self, m: &PendingMessage, status: Status) {
        let conn = m.connection;
        let accepted = status == SUCCESS;
        if let Ok(c) = self.connections.get_mut(conn) {
            c.in_flight = None;
            if accepted && !m.orphaned {
                c.state = ConnectionState::Open;
            }
        }
        if m.orphaned {
            if accepted {
                self.queue_disconnect(conn);
            }
            self.reap(conn);
            return;
        }
        if !accepted {
            let _ = self.connections.release(conn);
        }
        self.complete(conn, m.client, Completion::Reply(Reply::status_only(status)));
    }

    fn delivered(&self, pid: PartitionId, msg: Handle) -> Result<&PendingMessage, Fault> {
        self.running(pid)?;
        let m = self.messages.get(msg)?;
        if m.partition != pid {
            return Err(Fault::NotOwner);
        }
        if !m.delivered {
            return Err(Fault::InvalidHandle(HandleError::Stale(msg)));
        }
        Ok(m)
    }

    /// A client region became unusable mid-call. The client is at fault;
    /// the service carries on with an orphaned message.
    fn client_region_lost(&mut self, msg: Handle, err: RegionError) {
        let Ok(m) = self.messages.get(msg) else { return };
        let conn = m.connection;
        warn!(%conn, %err, "client region lost during call");
        self.teardown(conn);
    }
}

fn input_cursor(m: &PendingMessage, idx: usize) -> Result<Cursor, Fault> {
    if m.msg_type < 0 {
        return Err(Fault::InvalidMessageType(m.msg_type));
    }
    if idx >= MAX_IOVEC {
        return Err(Fault::InvalidVectorIndex(idx));
    }
    Ok(Cursor { region: m.input(idx), offset: m.read_pos[idx], client: m.client, orphaned: m.orphaned })
}

fn output_cursor(m: &PendingMessage, idx: usize) -> Result<Cursor, Fault> {
    if m.msg_type < 0 {
        return Err(Fault::InvalidMessageType(m.msg_type));
    }
    if idx >= MAX_IOVEC {
        return Err(Fault::InvalidVectorIndex(idx));
    }
    Ok(Cursor { region: m.output(idx), offset: m.written[idx], client: m.client, orphaned: m.orphaned })
}
