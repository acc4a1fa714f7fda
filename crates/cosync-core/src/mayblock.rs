//! Outcome of a "proceed now or register to wait" decision point

/// Whether the caller of a suspension step must suspend
///
/// Every awaitable operation in this crate returns one of these from its
/// suspension step. `WouldBlock` means the calling coroutine has been
/// registered with some primitive and must return `Step::Suspend` without
/// touching that primitive again until it is woken.
#[must_use = "a WouldBlock outcome requires the caller to suspend"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MayBlock {
    /// The caller was enqueued and must suspend
    WouldBlock,
    /// The operation completed; continue running
    NoBlock,
}

impl MayBlock {
    #[inline]
    pub const fn would_block(self) -> bool {
        matches!(self, MayBlock::WouldBlock)
    }

    #[inline]
    pub const fn from_blocked(blocked: bool) -> Self {
        if blocked {
            MayBlock::WouldBlock
        } else {
            MayBlock::NoBlock
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_blocked() {
        assert_eq!(MayBlock::from_blocked(true), MayBlock::WouldBlock);
        assert_eq!(MayBlock::from_blocked(false), MayBlock::NoBlock);
        assert!(MayBlock::WouldBlock.would_block());
        assert!(!MayBlock::NoBlock.would_block());
    }
}
