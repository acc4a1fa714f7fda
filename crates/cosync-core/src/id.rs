//! Coroutine record identifier

use core::fmt;

/// Index of a coroutine record inside a [`RecordArena`](crate::arena::RecordArena)
///
/// Records link to each other (root, stack parent, next waiter) through ids
/// rather than pointers, so a record slot can be recycled without leaving
/// dangling references behind. `u32::MAX` is reserved as the "no record"
/// sentinel and terminates intrusive wait lists.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CoroutineId(u32);

impl CoroutineId {
    /// Sentinel value indicating no coroutine
    pub const NONE: CoroutineId = CoroutineId(u32::MAX);

    /// Create a new CoroutineId from a raw value
    #[inline]
    pub const fn new(id: u32) -> Self {
        CoroutineId(id)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for indexing
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != u32::MAX
    }

    /// Convert to Option
    #[inline]
    pub const fn to_option(self) -> Option<CoroutineId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<u32> for CoroutineId {
    #[inline]
    fn from(id: u32) -> Self {
        CoroutineId(id)
    }
}

impl From<CoroutineId> for u32 {
    #[inline]
    fn from(id: CoroutineId) -> Self {
        id.0
    }
}

impl fmt::Debug for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "CoroutineId(NONE)")
        } else {
            write!(f, "CoroutineId({})", self.0)
        }
    }
}

impl fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "co#{}", self.0)
        }
    }
}

impl Default for CoroutineId {
    fn default() -> Self {
        CoroutineId::NONE
    }
}
