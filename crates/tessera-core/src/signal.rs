//! Per-partition signal state and message queues.
//!
//! A partition owns one signal bit per service plus the doorbell. Each
//! pending message for a service sits in that service's FIFO; the signal is
//! asserted exactly while the FIFO is non-empty.

use std::collections::{BTreeMap, VecDeque};

use tessera_proto::Signals;
use thiserror::Error;

use crate::handle::Handle;

/// How `wait` behaves when nothing in the mask is asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Return an empty set immediately.
    Poll,
    /// Block until a signal in the mask is asserted.
    Block,
}

/// Contract violations by the partition using the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignalError {
    /// `get` requires exactly one bit.
    #[error("signal {0:#x} does not have exactly one bit set")]
    NotSingleBit(u32),
    /// Signal is not owned by this partition.
    #[error("signal {0:#x} is not registered")]
    Unregistered(u32),
    /// Signal is registered but not asserted.
    #[error("signal {0:#x} is not asserted")]
    NotAsserted(u32),
    /// Mask names none of the partition's signals.
    #[error("wait mask {0:#x} names no signal of this partition")]
    EmptyMask(u32),
    /// Registration collides with an existing or reserved signal.
    #[error("signal {0:#x} cannot be registered")]
    Reserved(u32),
}

/// Signal and queue state of one partition.
#[derive(Debug, Default)]
pub struct SignalDispatcher {
    registered: Signals,
    asserted: Signals,
    queues: BTreeMap<u32, VecDeque<Handle>>,
}

/// What `wait` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Subset of the mask that is asserted. Empty only when polling.
    Ready(Signals),
    /// Nothing asserted and the caller asked to block.
    WouldBlock,
}

impl SignalDispatcher {
    /// Dispatcher with no services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a service signal.
    pub fn register(&mut self, signal: Signals) -> Result<(), SignalError> {
        if !signal.is_single() {
            return Err(SignalError::NotSingleBit(signal.bits()));
        }
        if signal.bits() < 1 << Signals::FIRST_SERVICE_BIT || self.registered.intersects(signal) {
            return Err(SignalError::Reserved(signal.bits()));
        }
        self.registered |= signal;
        self.queues.insert(signal.bits(), VecDeque::new());
        Ok(())
    }

    /// Registered service signals.
    pub fn registered(&self) -> Signals {
        self.registered
    }

    /// Currently asserted signals, doorbell included.
    pub fn asserted(&self) -> Signals {
        self.asserted
    }

    /// Queue `msg` on `signal` and assert it.
    pub fn enqueue(&mut self, signal: Signals, msg: Handle) -> Result<(), SignalError> {
        let queue =
            self.queues.get_mut(&signal.bits()).ok_or(SignalError::Unregistered(signal.bits()))?;
        queue.push_back(msg);
        self.asserted |= signal;
        Ok(())
    }

    /// Report which signals in `mask` are asserted.
    pub fn wait(&self, mask: Signals, timeout: Timeout) -> Result<WaitOutcome, SignalError> {
        let owned = self.registered | Signals::DOORBELL;
        if !mask.intersects(owned) {
            return Err(SignalError::EmptyMask(mask.bits()));
        }
        let ready = self.asserted & mask & owned;
        if ready.is_empty() && timeout == Timeout::Block {
            return Ok(WaitOutcome::WouldBlock);
        }
        Ok(WaitOutcome::Ready(ready))
    }

    /// Dequeue the oldest message for `signal`.
    ///
    /// Returns `Ok(None)` if the signal is asserted with an empty queue,
    /// which cannot happen while the queue invariant holds.
    pub fn get(&mut self, signal: Signals) -> Result<Option<Handle>, SignalError> {
        if !signal.is_single() {
            return Err(SignalError::NotSingleBit(signal.bits()));
        }
        if !self.registered.contains(signal) {
            return Err(SignalError::Unregistered(signal.bits()));
        }
        if !self.asserted.contains(signal) {
            return Err(SignalError::NotAsserted(signal.bits()));
        }
        let queue =
            self.queues.get_mut(&signal.bits()).ok_or(SignalError::Unregistered(signal.bits()))?;
        let msg = queue.pop_front();
        if queue.is_empty() {
            self.asserted.remove(signal);
        }
        Ok(msg)
    }

    /// Withdraw a queued message. Returns whether it was still queued.
    pub fn withdraw(&mut self, msg: Handle) -> bool {
        for (&bits, queue) in &mut self.queues {
            if let Some(pos) = queue.iter().position(|m| *m == msg) {
                queue.remove(pos);
                if queue.is_empty() {
                    self.asserted.remove(Signals::from_bits_retain(bits));
                }
                return true;
            }
        }
        false
    }

    /// Remove every queued message, oldest first per signal.
    pub fn drain(&mut self) -> Vec<Handle> {
        let drained = self.queues.values_mut().flat_map(|q| q.drain(..)).collect();
        self.asserted &= Signals::DOORBELL;
        drained
    }

    /// Number of messages queued on `signal`.
    pub fn pending(&self, signal: Signals) -> usize {
        self.queues.get(&signal.bits()).map_or(0, VecDeque::len)
    }

    /// Assert the doorbell.
    pub fn ring_doorbell(&mut self) {
        self.asserted |= Signals::DOORBELL;
    }

    /// De-assert the doorbell. Fails if it is not asserted.
    pub fn clear_doorbell(&mut self) -> Result<(), SignalError> {
        if !self.asserted.contains(Signals::DOORBELL) {
            return Err(SignalError::NotAsserted(Signals::DOORBELL.bits()));
        }
        self.asserted.remove(Signals::DOORBELL);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SIG_A: Signals = Signals::from_bits_retain(1 << 4);
    const SIG_B: Signals = Signals::from_bits_retain(1 << 5);

    fn dispatcher() -> SignalDispatcher {
        let mut d = SignalDispatcher::new();
        d.register(SIG_A).unwrap();
        d.register(SIG_B).unwrap();
        d
    }

    #[test]
    fn poll_with_nothing_pending_is_empty() {
        let d = dispatcher();
        assert_eq!(d.wait(SIG_A | SIG_B, Timeout::Poll), Ok(WaitOutcome::Ready(Signals::empty())));
        assert_eq!(d.wait(SIG_A | SIG_B, Timeout::Block), Ok(WaitOutcome::WouldBlock));
    }

    #[test]
    fn wait_returns_only_asserted_subset() {
        let mut d = dispatcher();
        d.enqueue(SIG_A, Handle::from_raw(0x2000_0001)).unwrap();
        assert_eq!(d.wait(SIG_A | SIG_B, Timeout::Block), Ok(WaitOutcome::Ready(SIG_A)));
    }

    #[test]
    fn get_is_fifo_and_deasserts_when_drained() {
        let mut d = dispatcher();
        let first = Handle::from_raw(0x2000_0001);
        let second = Handle::from_raw(0x2000_0002);
        d.enqueue(SIG_A, first).unwrap();
        d.enqueue(SIG_A, second).unwrap();

        assert_eq!(d.get(SIG_A), Ok(Some(first)));
        assert!(d.asserted().contains(SIG_A));
        assert_eq!(d.get(SIG_A), Ok(Some(second)));
        assert!(!d.asserted().contains(SIG_A));
    }

    #[test]
    fn get_rejects_multiple_bits() {
        let mut d = dispatcher();
        d.enqueue(SIG_A, Handle::from_raw(0x2000_0001)).unwrap();
        assert_eq!(d.get(SIG_A | SIG_B), Err(SignalError::NotSingleBit(0x30)));
    }

    #[test]
    fn get_rejects_unasserted_and_unregistered() {
        let mut d = dispatcher();
        assert_eq!(d.get(SIG_A), Err(SignalError::NotAsserted(0x10)));
        assert_eq!(d.get(Signals::from_bits_retain(1 << 9)), Err(SignalError::Unregistered(0x200)));
        assert_eq!(d.get(Signals::DOORBELL), Err(SignalError::Unregistered(0x8)));
    }

    #[test]
    fn reserved_bits_cannot_be_registered() {
        let mut d = dispatcher();
        assert!(d.register(Signals::DOORBELL).is_err());
        assert!(d.register(SIG_A).is_err());
    }

    #[test]
    fn withdraw_deasserts_empty_queue() {
        let mut d = dispatcher();
        let msg = Handle::from_raw(0x2000_0001);
        d.enqueue(SIG_B, msg).unwrap();
        assert!(d.withdraw(msg));
        assert!(!d.asserted().contains(SIG_B));
        assert!(!d.withdraw(msg));
    }

    #[test]
    fn doorbell_round_trip() {
        let mut d = dispatcher();
        assert!(d.clear_doorbell().is_err());
        d.ring_doorbell();
        assert_eq!(d.wait(Signals::DOORBELL, Timeout::Poll), Ok(WaitOutcome::Ready(Signals::DOORBELL)));
        d.clear_doorbell().unwrap();
        assert_eq!(d.wait(Signals::DOORBELL, Timeout::Poll), Ok(WaitOutcome::Ready(Signals::empty())));
    }
}
