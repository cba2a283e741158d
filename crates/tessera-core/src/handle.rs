//! Generational handle table.
//!
//! Handles are opaque `u32` tokens that name a slot in a table. The encoding
//! packs a kind tag and a generation next to the slot index so that a handle
//! from the wrong table, a forged value, or a handle whose slot has since been
//! reused all fail validation instead of aliasing live state.
//!
//! ```text
//! bit 31      always zero (handles are positive when read as i32)
//! bits 28..31 kind tag
//! bits 16..28 generation
//! bits 0..16  slot index + 1
//! ```
//!
//! # Invariants
//!
//! - The null handle (zero) is never allocated.
//! - A handle is unique among live handles of its table.
//! - Releasing a slot bumps its generation, so the released handle stays
//!   invalid until the 12-bit generation wraps.
//! - Free slots are reused oldest-first.

use std::{collections::VecDeque, fmt};

use thiserror::Error;

const KIND_SHIFT: u32 = 28;
const KIND_MASK: u32 = 0x7;
const GEN_SHIFT: u32 = 16;
const GEN_MASK: u32 = 0x0fff;
const SLOT_MASK: u32 = 0xffff;

/// Largest capacity a table may be created with.
pub const MAX_CAPACITY: usize = SLOT_MASK as usize;

/// Opaque resource handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Handle(u32);

impl Handle {
    /// The null handle.
    pub const NULL: Self = Self(0);

    /// Wrap a raw value received from a caller. No validation happens here.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this is the null handle.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    fn encode(kind: HandleKind, generation: u16, slot: usize) -> Self {
        let slot = (slot as u32 + 1) & SLOT_MASK;
        let generation = u32::from(generation) & GEN_MASK;
        Self(((kind as u32) << KIND_SHIFT) | (generation << GEN_SHIFT) | slot)
    }

    fn kind_bits(self) -> u32 {
        (self.0 >> KIND_SHIFT) & 0xf
    }

    fn generation(self) -> u16 {
        ((self.0 >> GEN_SHIFT) & GEN_MASK) as u16
    }

    fn slot(self) -> Option<usize> {
        (self.0 & SLOT_MASK).checked_sub(1).map(|s| s as usize)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#010x})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// What a table's handles refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum HandleKind {
    /// Client connection to a service.
    Connection = 1,
    /// Message delivered to a service.
    Message = 2,
    /// Multi-part cryptographic operation.
    Operation = 3,
}

/// Handle validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandleError {
    /// The null handle.
    #[error("null handle")]
    Null,
    /// Handle belongs to a different kind of table.
    #[error("handle {0} is not a {1:?} handle")]
    WrongKind(Handle, HandleKind),
    /// Slot index outside the table.
    #[error("handle {0} is out of range")]
    OutOfRange(Handle),
    /// Slot was released or reused since the handle was issued.
    #[error("handle {0} is stale")]
    Stale(Handle),
    /// Table is full.
    #[error("no free {0:?} handles")]
    Exhausted(HandleKind),
}

#[derive(Debug)]
struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

/// Table of values addressed by generational handles.
#[derive(Debug)]
pub struct HandleTable<T> {
    kind: HandleKind,
    capacity: usize,
    slots: Vec<Slot<T>>,
    free: VecDeque<usize>,
    live: usize,
}

impl<T> HandleTable<T> {
    /// Create a table holding at most `capacity` live values.
    ///
    /// Capacity is clamped to [`MAX_CAPACITY`].
    pub fn new(kind: HandleKind, capacity: usize) -> Self {
        Self {
            kind,
            capacity: capacity.min(MAX_CAPACITY),
            slots: Vec::new(),
            free: VecDeque::new(),
            live: 0,
        }
    }

    /// Kind of handles this table issues.
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no values are live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Maximum number of live values.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store `value` and return its handle.
    pub fn allocate(&mut self, value: T) -> Result<Handle, HandleError> {
        if self.live >= self.capacity {
            return Err(HandleError::Exhausted(self.kind));
        }

        let index = if let Some(index) = self.free.pop_front() {
            index
        } else {
            self.slots.push(Slot { generation: 0, value: None });
            self.slots.len() - 1
        };

        let slot = &mut self.slots[index];
        slot.value = Some(value);
        self.live += 1;

        Ok(Handle::encode(self.kind, slot.generation, index))
    }

    /// Check that `handle` names a live value of this table.
    pub fn validate(&self, handle: Handle) -> Result<(), HandleError> {
        self.index_of(handle).map(|_| ())
    }

    /// Whether `handle` names a live value.
    pub fn contains(&self, handle: Handle) -> bool {
        self.index_of(handle).is_ok()
    }

    /// Borrow the value behind `handle`.
    pub fn get(&self, handle: Handle) -> Result<&T, HandleError> {
        let index = self.index_of(handle)?;
        self.slots[index].value.as_ref().ok_or(HandleError::Stale(handle))
    }

    /// Mutably borrow the value behind `handle`.
    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut T, HandleError> {
        let index = self.index_of(handle)?;
        self.slots[index].value.as_mut().ok_or(HandleError::Stale(handle))
    }

    /// Remove and return the value behind `handle`, invalidating the handle.
    pub fn release(&mut self, handle: Handle) -> Result<T, HandleError> {
        let index = self.index_of(handle)?;
        let slot = &mut self.slots[index];
        let value = slot.value.take().ok_or(HandleError::Stale(handle))?;
        slot.generation = (slot.generation + 1) & GEN_MASK as u16;
        self.free.push_back(index);
        self.live -= 1;
        Ok(value)
    }

    /// Iterate over live handles and their values.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|v| (Handle::encode(self.kind, slot.generation, index), v))
        })
    }

    /// Handles of live values matching `pred`.
    pub fn handles_where(&self, mut pred: impl FnMut(&T) -> bool) -> Vec<Handle> {
        self.iter().filter(|(_, v)| pred(v)).map(|(h, _)| h).collect()
    }

    fn index_of(&self, handle: Handle) -> Result<usize, HandleError> {
        if handle.is_null() {
            return Err(HandleError::Null);
        }
        if handle.kind_bits() != self.kind as u32 {
            return Err(HandleError::WrongKind(handle, self.kind));
        }
        let index = handle.slot().ok_or(HandleError::OutOfRange(handle))?;
        let slot = self.slots.get(index).ok_or(HandleError::OutOfRange(handle))?;
        if slot.generation != handle.generation() || slot.value.is_none() {
            return Err(HandleError::Stale(handle));
        }
        Ok(index)
    }
}
