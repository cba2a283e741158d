//! Client address spaces and the memory region validator.
//!
//! Each client owns an [`AddressSpace`]: a set of mapped segments with read
//! and write permissions. Buffers passed across a call are described by
//! [`Region`]s in that space. Nothing crosses the boundary until
//! [`check_call_regions`] has accepted every region of the call, and every
//! later access re-checks the single region it touches.
//!
//! # Rules
//!
//! - A region must lie inside a single mapped segment of the caller's own
//!   space, with the required permission.
//! - A zero-length region is accepted whatever its base; a null base with a
//!   non-zero length is rejected.
//! - An output region must not overlap any input region of the same call.
//! - Address arithmetic never wraps; overflowing regions are rejected.

use std::collections::BTreeMap;

use bitflags::bitflags;
use tessera_proto::Region;
use thiserror::Error;

bitflags! {
    /// Permission on a mapped segment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        /// Service may read.
        const READ = 0b01;
        /// Service may write.
        const WRITE = 0b10;
        /// Both.
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// Region rejected by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegionError {
    /// Null base with a non-zero length.
    #[error("null base with length {len}")]
    NullBase {
        /// Offending length.
        len: u64,
    },
    /// `base + len` overflows.
    #[error("region {base:#x}+{len:#x} overflows the address space")]
    Overflow {
        /// Region base.
        base: u64,
        /// Region length.
        len: u64,
    },
    /// Region is not inside one mapped segment.
    #[error("region {base:#x}+{len:#x} is not mapped")]
    NotMapped {
        /// Region base.
        base: u64,
        /// Region length.
        len: u64,
    },
    /// Segment lacks the required permission.
    #[error("region {base:#x} lacks {required:?} access")]
    PermissionDenied {
        /// Region base.
        base: u64,
        /// Permission that was required.
        required: Access,
    },
    /// Output region overlaps an input region of the same call.
    #[error("output {output} aliases input {input}")]
    Aliased {
        /// Index of the output vector.
        output: usize,
        /// Index of the input vector.
        input: usize,
    },
}

#[derive(Debug)]
struct Segment {
    data: Vec<u8>,
    access: Access,
}

/// First address handed out by [`AddressSpace::map`]. Page zero stays
/// unmapped so the null base never resolves.
const FIRST_BASE: u64 = 0x1000;

/// Gap between consecutive mappings.
const GUARD: u64 = 0x10;

/// Memory owned by one client.
#[derive(Debug)]
pub struct AddressSpace {
    segments: BTreeMap<u64, Segment>,
    next_base: u64,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    /// Empty address space.
    pub fn new() -> Self {
        Self { segments: BTreeMap::new(), next_base: FIRST_BASE }
    }

    /// Map `data` with `access` and return the region covering it.
    pub fn map(&mut self, data: Vec<u8>, access: Access) -> Region {
        let base = self.next_base;
        let len = data.len() as u64;
        self.next_base = base.saturating_add(len).saturating_add(GUARD) & !(GUARD - 1);
        self.segments.insert(base, Segment { data, access });
        Region::new(base, len)
    }

    /// Map `len` zero bytes with `access`.
    pub fn map_zeroed(&mut self, len: usize, access: Access) -> Region {
        self.map(vec![0; len], access)
    }

    /// Unmap the segment starting at `base`, returning its contents.
    pub fn unmap(&mut self, base: u64) -> Option<Vec<u8>> {
        self.segments.remove(&base).map(|s| s.data)
    }

    /// Number of mapped segments.
    pub fn mapped(&self) -> usize {
        self.segments.len()
    }

    /// Check `region` for `required` access.
    pub fn check(&self, region: Region, required: Access) -> Result<(), RegionError> {
        self.locate(region, required).map(|_| ())
    }

    /// Copy bytes out of `region` starting at `offset`. Returns the number of
    /// bytes copied, bounded by the region and by `buf`.
    pub fn load(&self, region: Region, offset: u64, buf: &mut [u8]) -> Result<usize, RegionError> {
        let Some((seg, start)) = self.locate(region, Access::READ)? else {
            return Ok(0);
        };
        let remaining = region.len.saturating_sub(offset);
        let n = usize::try_from(remaining).unwrap_or(usize::MAX).min(buf.len());
        if n == 0 {
            return Ok(0);
        }
        let from = start + offset as usize;
        buf[..n].copy_from_slice(&seg.data[from..from + n]);
        Ok(n)
    }

    /// Copy `data` into `region` at `offset`. The caller has already bounded
    /// `offset + data.len()` by the region length.
    pub fn store(&mut self, region: Region, offset: u64, data: &[u8]) -> Result<(), RegionError> {
        if data.is_empty() {
            return Ok(());
        }
        let end = offset.checked_add(data.len() as u64);
        if end.is_none_or(|end| end > region.len) {
            return Err(RegionError::NotMapped { base: region.base, len: region.len });
        }
        let start = match self.locate(region, Access::WRITE)? {
            Some((_, start)) => start,
            None => return Ok(()),
        };
        let seg_base = self.segment_base(region.base);
        let Some(seg) = seg_base.and_then(|b| self.segments.get_mut(&b)) else {
            return Err(RegionError::NotMapped { base: region.base, len: region.len });
        };
        let from = start + offset as usize;
        seg.data[from..from + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read a whole segment, as the client does after a call.
    pub fn segment(&self, base: u64) -> Option<&[u8]> {
        self.segments.get(&base).map(|s| s.data.as_slice())
    }

    fn segment_base(&self, addr: u64) -> Option<u64> {
        self.segments.range(..=addr).next_back().map(|(b, _)| *b)
    }

    /// Resolve a region to its segment and the offset of its base inside
    /// that segment. Empty regions resolve to `None`.
    fn locate(
        &self,
        region: Region,
        required: Access,
    ) -> Result<Option<(&Segment, usize)>, RegionError> {
        if region.is_empty() {
            return Ok(None);
        }
        if region.is_null() {
            return Err(RegionError::NullBase { len: region.len });
        }
        let end = region
            .end()
            .ok_or(RegionError::Overflow { base: region.base, len: region.len })?;

        let not_mapped = RegionError::NotMapped { base: region.base, len: region.len };
        let (&seg_base, seg) = self.segments.range(..=region.base).next_back().ok_or(not_mapped)?;
        let seg_end = seg_base + seg.data.len() as u64;
        if end > seg_end {
            return Err(not_mapped);
        }
        if !seg.access.contains(required) {
            return Err(RegionError::PermissionDenied { base: region.base, required });
        }
        Ok(Some((seg, (region.base - seg_base) as usize)))
    }
}

/// Validate every region of one call.
///
/// Inputs need read access, outputs write access, and no output may overlap
/// an input.
pub fn check_call_regions(
    space: &AddressSpace,
    inputs: &[Region],
    outputs: &[Region],
) -> Result<(), RegionError> {
    for region in inputs {
        space.check(*region, Access::READ)?;
    }
    for region in outputs {
        space.check(*region, Access::WRITE)?;
    }
    for (output, out) in outputs.iter().enumerate() {
        if let Some(input) = inputs.iter().position(|inp| inp.overlaps(out)) {
            return Err(RegionError::Aliased { output, input });
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn null_page_never_mapped() {
        let mut space = AddressSpace::new();
        let r = space.map(vec![1, 2, 3], Access::READ);
        assert!(r.base >= FIRST_BASE);
        assert_eq!(
            space.check(Region::new(0, 3), Access::READ),
            Err(RegionError::NullBase { len: 3 })
        );
    }

    #[test]
    fn zero_length_accepted_anywhere() {
        let space = AddressSpace::new();
        assert_eq!(space.check(Region::new(0, 0), Access::WRITE), Ok(()));
        assert_eq!(space.check(Region::new(0xdead_0000, 0), Access::WRITE), Ok(()));
    }

    #[test]
    fn region_must_stay_inside_segment() {
        let mut space = AddressSpace::new();
        let r = space.map(vec![0; 16], Access::READ);
        assert!(space.check(Region::new(r.base + 8, 8), Access::READ).is_ok());
        assert!(matches!(
            space.check(Region::new(r.base + 8, 9), Access::READ),
            Err(RegionError::NotMapped { .. })
        ));
    }

    #[test]
    fn adjacent_mappings_do_not_merge() {
        let mut space = AddressSpace::new();
        let a = space.map(vec![0; 16], Access::READ);
        let b = space.map(vec![0; 16], Access::READ);
        assert!(b.base > a.base + a.len);
        let spanning = Region::new(a.base, b.base + b.len - a.base);
        assert!(space.check(spanning, Access::READ).is_err());
    }

    #[test]
    fn overflow_rejected() {
        let mut space = AddressSpace::new();
        space.map(vec![0; 16], Access::READ);
        assert!(matches!(
            space.check(Region::new(u64::MAX - 1, 4), Access::READ),
            Err(RegionError::Overflow { .. })
        ));
    }

    #[test]
    fn permission_enforced() {
        let mut space = AddressSpace::new();
        let r = space.map(vec![0; 4], Access::READ);
        assert!(matches!(
            space.check(r, Access::WRITE),
            Err(RegionError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn output_may_not_alias_input() {
        let mut space = AddressSpace::new();
        let r = space.map(vec![0; 32], Access::READ_WRITE);
        let input = Region::new(r.base, 16);
        let output = Region::new(r.base + 8, 16);
        assert_eq!(
            check_call_regions(&space, &[input], &[output]),
            Err(RegionError::Aliased { output: 0, input: 0 })
        );
        let disjoint = Region::new(r.base + 16, 16);
        assert_eq!(check_call_regions(&space, &[input], &[disjoint]), Ok(()));
    }

    #[test]
    fn load_and_store_respect_bounds() {
        let mut space = AddressSpace::new();
        let src = space.map(b"hello world".to_vec(), Access::READ);
        let dst = space.map_zeroed(4, Access::WRITE);

        let mut buf = [0u8; 5];
        assert_eq!(space.load(src, 6, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(space.load(src, 11, &mut buf).unwrap(), 0);

        space.store(dst, 1, b"abc").unwrap();
        assert_eq!(space.segment(dst.base).unwrap(), b"\0abc");
        assert!(space.store(dst, 2, b"abc").is_err());
    }
}
