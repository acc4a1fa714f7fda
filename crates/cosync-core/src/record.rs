//! Stackless coroutine records
//!
//! A record is everything a suspended coroutine needs besides its own local
//! data: where to continue (`resume_point`), which coroutine called it
//! (`stack_parent`), which coroutine is at the top of its call chain
//! (`root`), and the body to run. Nesting is modelled by these links rather
//! than by the native stack, so depth is bounded by arena capacity only.
//!
//! Records never allocate and have no constructor that does real work: they
//! live in storage owned by someone else (see [`RecordArena`]) and are
//! (re)initialised with `prepare_root` / `prepare_child`.
//!
//! All fields are atomics so a record can sit in shared storage and be
//! inspected from other threads (a notifier walking a wait list, a worker
//! resuming it) without `unsafe`.
//!
//! [`RecordArena`]: crate::arena::RecordArena

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use crate::id::CoroutineId;
use crate::soft_mutex::SoftMutex;
use crate::state::{CoroutineState, Step};
use crate::traits::Scheduler;

/// Resume point of a freshly prepared coroutine
pub const RESUME_START: u32 = 0;

/// Marker written by `prepare` in debug builds
#[cfg(debug_assertions)]
const VALIDITY_TAG: u32 = 0xC0_5C_AB_1E;

/// A resumable coroutine body
///
/// Reads `co.resume_point()`, runs to the next suspension point, stores the
/// point to continue from and reports what it is waiting for.
pub type EntryFn = fn(co: &Coroutine, sched: &dyn Scheduler) -> Step;

/// The plain record: validity tag and resume point only
pub struct PlainCoroutine {
    #[cfg(debug_assertions)]
    validity_tag: AtomicU32,
    resume_point: AtomicU32,
}

impl PlainCoroutine {
    /// An unprepared record. Must be `prepare`d before use.
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            validity_tag: AtomicU32::new(0),
            resume_point: AtomicU32::new(RESUME_START),
        }
    }

    /// Reset to the start of the body and mark as valid
    pub fn prepare(&self) {
        #[cfg(debug_assertions)]
        self.validity_tag.store(VALIDITY_TAG, Ordering::Relaxed);
        self.resume_point.store(RESUME_START, Ordering::Relaxed);
    }

    #[inline]
    pub fn resume_point(&self) -> u32 {
        self.resume_point.load(Ordering::Acquire)
    }

    /// Save where the body continues on its next step
    #[inline]
    pub fn set_resume_point(&self, point: u32) {
        self.resume_point.store(point, Ordering::Release);
    }

    /// Whether `prepare` ran on this record. Always true in release builds.
    #[inline]
    pub fn is_prepared(&self) -> bool {
        #[cfg(debug_assertions)]
        {
            self.validity_tag.load(Ordering::Relaxed) == VALIDITY_TAG
        }
        #[cfg(not(debug_assertions))]
        {
            true
        }
    }

    /// Abort on a record that was never prepared (debug builds only)
    #[inline]
    pub fn validate(&self) {
        #[cfg(debug_assertions)]
        if !self.is_prepared() {
            crate::kerror!("coroutine record used before prepare()");
            panic!("coroutine record used before prepare()");
        }
    }

    #[cfg(debug_assertions)]
    pub(crate) fn invalidate(&self) {
        self.validity_tag.store(0, Ordering::Relaxed);
    }
}

impl Default for PlainCoroutine {
    fn default() -> Self {
        Self::new()
    }
}

/// A full coroutine record with call-chain linkage
pub struct Coroutine {
    plain: PlainCoroutine,

    /// This record's own slot; fixed for the lifetime of the arena
    id: CoroutineId,

    /// Top of the call chain (self for a root)
    root: AtomicU32,

    /// Immediate caller (self for a root)
    stack_parent: AtomicU32,

    entry: SoftMutex<Option<EntryFn>>,

    /// `CoroutineState`, owned by the scheduler
    state: AtomicU8,

    /// Intrusive wait-list link, only touched under the owning list's lock
    next_waiter: AtomicU32,

    /// Set while the record sits in some wait list
    linked: AtomicBool,
}

impl Coroutine {
    pub(crate) const fn new(id: CoroutineId) -> Self {
        Self {
            plain: PlainCoroutine::new(),
            id,
            root: AtomicU32::new(u32::MAX),
            stack_parent: AtomicU32::new(u32::MAX),
            entry: SoftMutex::new(None),
            state: AtomicU8::new(CoroutineState::Idle as u8),
            next_waiter: AtomicU32::new(u32::MAX),
            linked: AtomicBool::new(false),
        }
    }

    /// Initialise as the root of a new call chain
    pub fn prepare_root(&self, entry: EntryFn) {
        self.prepare_links(entry, self.id, self.id);
    }

    /// Initialise as a coroutine nested inside `parent`
    pub fn prepare_child(&self, entry: EntryFn, parent: &Coroutine) {
        parent.validate();
        debug_assert!(parent.id != self.id, "coroutine cannot be its own parent");
        self.prepare_links(entry, parent.root(), parent.id);
    }

    fn prepare_links(&self, entry: EntryFn, root: CoroutineId, parent: CoroutineId) {
        debug_assert!(
            !self.is_linked(),
            "{} re-prepared while still enqueued on a wait list",
            self.id
        );
        self.plain.prepare();
        self.root.store(root.as_u32(), Ordering::Relaxed);
        self.stack_parent.store(parent.as_u32(), Ordering::Relaxed);
        *self.entry.lock() = Some(entry);
        self.next_waiter.store(u32::MAX, Ordering::Relaxed);
        self.state.store(CoroutineState::Idle as u8, Ordering::Release);
    }

    #[inline]
    pub fn id(&self) -> CoroutineId {
        self.id
    }

    #[inline]
    pub fn root(&self) -> CoroutineId {
        CoroutineId::new(self.root.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn stack_parent(&self) -> CoroutineId {
        CoroutineId::new(self.stack_parent.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.root() == self.id
    }

    #[inline]
    pub fn entry(&self) -> Option<EntryFn> {
        *self.entry.lock()
    }

    #[inline]
    pub fn plain(&self) -> &PlainCoroutine {
        &self.plain
    }

    #[inline]
    pub fn resume_point(&self) -> u32 {
        self.plain.resume_point()
    }

    #[inline]
    pub fn set_resume_point(&self, point: u32) {
        self.plain.set_resume_point(point);
    }

    #[inline]
    pub fn validate(&self) {
        self.plain.validate();
    }

    #[inline]
    pub fn is_prepared(&self) -> bool {
        self.plain.is_prepared()
    }

    #[inline]
    pub fn state(&self) -> CoroutineState {
        CoroutineState::from(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_state(&self, state: CoroutineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Atomically move from `from` to `to`; returns the observed state on failure
    #[inline]
    pub fn transition(&self, from: CoroutineState, to: CoroutineState) -> Result<(), CoroutineState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(CoroutineState::from)
    }

    /// True while this record is enqueued on a condition variable
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.linked.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn next_waiter(&self) -> CoroutineId {
        CoroutineId::new(self.next_waiter.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn set_next_waiter(&self, next: CoroutineId) {
        self.next_waiter.store(next.as_u32(), Ordering::Relaxed);
    }

    /// Mark as entering a wait list; aborts (debug) on a double enqueue
    #[inline]
    pub(crate) fn link(&self) {
        let was = self.linked.swap(true, Ordering::AcqRel);
        debug_assert!(!was, "{} enqueued on two wait lists", self.id);
    }

    #[inline]
    pub(crate) fn unlink(&self) {
        self.set_next_waiter(CoroutineId::NONE);
        self.linked.store(false, Ordering::Release);
    }

    #[cfg(debug_assertions)]
    pub(crate) fn invalidate(&self) {
        self.plain.invalidate();
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("id", &self.id)
            .field("root", &self.root())
            .field("stack_parent", &self.stack_parent())
            .field("resume_point", &self.resume_point())
            .field("state", &self.state())
            .field("linked", &self.is_linked())
            .finish()
    }
}
