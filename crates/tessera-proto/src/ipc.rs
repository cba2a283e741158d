//! IPC-level constants shared by clients, the partition manager and services.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Maximum number of input plus output vectors in one call.
pub const MAX_IOVEC: usize = 4;

/// Version of the framework API implemented by the partition manager.
pub const FRAMEWORK_VERSION: u32 = 0x0101;

/// Returned by version queries for absent or inaccessible services.
pub const VERSION_NONE: u32 = 0;

/// Message type delivered to a service when a client connects.
pub const CONNECT: i32 = -1;

/// Message type delivered to a service when a connection goes away.
pub const DISCONNECT: i32 = -2;

bitflags! {
    /// Signal set of a partition.
    ///
    /// Bits 0..=3 are reserved for the framework; only [`Signals::DOORBELL`]
    /// is used. Service signals are allocated from bit 4 upwards.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Signals: u32 {
        /// Inter-partition notification raised by `notify`.
        const DOORBELL = 1 << 3;
        const _ = !0;
    }
}

impl Signals {
    /// First signal bit available to services.
    pub const FIRST_SERVICE_BIT: u32 = 4;

    /// Signal with exactly bit `n` set, if `n` is in range.
    pub fn bit(n: u32) -> Option<Self> {
        1u32.checked_shl(n).map(Self::from_bits_retain)
    }

    /// Whether exactly one bit is set.
    pub fn is_single(self) -> bool {
        self.bits().count_ones() == 1
    }
}

/// A caller-owned buffer shared with the service for one call.
///
/// `base` is an address in the caller's address space. A null base with a
/// zero length denotes an absent optional buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Region {
    /// Start address in the client's address space.
    pub base: u64,
    /// Length in bytes.
    pub len: u64,
}

impl Region {
    /// Absent region.
    pub const NULL: Self = Self { base: 0, len: 0 };

    /// Create a region.
    pub const fn new(base: u64, len: u64) -> Self {
        Self { base, len }
    }

    /// Whether the base address is null.
    pub const fn is_null(&self) -> bool {
        self.base == 0
    }

    /// Whether the region covers no bytes.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte, or `None` on address overflow.
    pub fn end(&self) -> Option<u64> {
        self.base.checked_add(self.len)
    }

    /// Whether two non-empty regions share at least one byte.
    pub fn overlaps(&self, other: &Self) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        match (self.end(), other.end()) {
            (Some(a_end), Some(b_end)) => self.base < b_end && other.base < a_end,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doorbell_is_reserved_bit() {
        assert_eq!(Signals::DOORBELL.bits(), 0x8);
        assert!(Signals::DOORBELL.bits() < 1 << Signals::FIRST_SERVICE_BIT);
    }

    #[test]
    fn single_bit_detection() {
        assert!(Signals::from_bits_retain(0x10).is_single());
        assert!(!Signals::from_bits_retain(0x30).is_single());
        assert!(!Signals::empty().is_single());
        assert_eq!(Signals::bit(32), None);
    }

    #[test]
    fn default_signal_set_is_empty() {
        assert!(Signals::default().is_empty());
    }

    #[test]
    fn adjacent_regions_do_not_overlap() {
        let a = Region::new(0x1000, 0x10);
        let b = Region::new(0x1010, 0x10);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&Region::new(0x100f, 1)));
    }

    #[test]
    fn empty_region_never_overlaps() {
        let a = Region::new(0x1000, 0x10);
        assert!(!a.overlaps(&Region::new(0x1004, 0)));
    }
}
