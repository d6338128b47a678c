//! Scheduling of work against logical time.
//!
//! Producer code takes a [`SchedulerHandle`] (or anything implementing
//! [`Scheduler`]) instead of a concrete timing facility. Tests pass a handle
//! backed by a [`VirtualScheduler`] and drive time with
//! [`VirtualScheduler::advance`]; production passes one backed by a
//! [`ThreadScheduler`]. The call sites are the same either way.
//!
//! # Contract
//!
//! - `schedule(delay, work)` runs `work` no earlier than `now() + delay`.
//!   A zero delay still never runs inline.
//! - `schedule_at(due, work)` fails with
//!   [`SchedulerError::InvalidSchedule`] if `due < now()`.
//! - `cancel(handle)` is idempotent. Cancelled work never runs; work that is
//!   already running is not interrupted.
//! - Work due on the same tick runs in scheduling order.

pub mod config;
pub mod queue;
pub mod thread;
pub mod virtual_scheduler;

pub use config::{SchedulerConfig, ThreadSchedulerConfig};
pub use queue::{PendingQueue, ScheduledAction};
pub use thread::ThreadScheduler;
pub use virtual_scheduler::VirtualScheduler;

use crate::error::SchedulerError;
use crate::types::{Seq, Tick};
use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A unit of scheduled work.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a process-unique scheduler identity.
pub(crate) fn next_scheduler_id() -> u64 {
    NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Opaque handle identifying one scheduled action.
///
/// Only the scheduler that issued a handle can cancel with it; other
/// schedulers ignore it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CancelHandle {
    scheduler: u64,
    due: Tick,
    seq: Seq,
}

impl CancelHandle {
    pub(crate) const fn new(scheduler: u64, due: Tick, seq: Seq) -> Self {
        Self {
            scheduler,
            due,
            seq,
        }
    }

    /// Returns the tick the action is due at.
    #[must_use]
    pub const fn due(&self) -> Tick {
        self.due
    }

    /// Returns the scheduling sequence number of the action.
    #[must_use]
    pub const fn seq(&self) -> Seq {
        self.seq
    }

    pub(crate) const fn issued_by(&self, scheduler: u64) -> bool {
        self.scheduler == scheduler
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CancelHandle(S{}@{} {})", self.scheduler, self.due, self.seq)
    }
}

/// The scheduling contract shared by virtual and real schedulers.
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Returns the current logical time.
    fn now(&self) -> Tick;

    /// Schedules `work` to run no earlier than `now() + delay`.
    fn schedule(&self, delay: u64, work: Work) -> Result<CancelHandle, SchedulerError>;

    /// Schedules `work` to run no earlier than `due`.
    fn schedule_at(&self, due: Tick, work: Work) -> Result<CancelHandle, SchedulerError>;

    /// Cancels a pending action.
    ///
    /// Returns true if the action was pending and will now never run.
    fn cancel(&self, handle: &CancelHandle) -> bool;
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn now(&self) -> Tick {
        self.as_ref().now()
    }

    fn schedule(&self, delay: u64, work: Work) -> Result<CancelHandle, SchedulerError> {
        self.as_ref().schedule(delay, work)
    }

    fn schedule_at(&self, due: Tick, work: Work) -> Result<CancelHandle, SchedulerError> {
        self.as_ref().schedule_at(due, work)
    }

    fn cancel(&self, handle: &CancelHandle) -> bool {
        self.as_ref().cancel(handle)
    }
}

/// Shared, type-erased handle to a scheduler.
///
/// This is what producer code should hold. It is cheap to clone and hides
/// whether time is virtual or real.
///
/// # Example
///
/// ```
/// use lockstep::scheduler::{SchedulerHandle, VirtualScheduler};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// let virtual_time = Arc::new(VirtualScheduler::new());
/// let scheduler = SchedulerHandle::with_virtual(virtual_time.clone());
///
/// let ran = Arc::new(AtomicBool::new(false));
/// let flag = ran.clone();
/// scheduler.schedule_fn(5, move || flag.store(true, Ordering::SeqCst)).unwrap();
///
/// virtual_time.advance(4).unwrap();
/// assert!(!ran.load(Ordering::SeqCst));
/// virtual_time.advance(1).unwrap();
/// assert!(ran.load(Ordering::SeqCst));
/// ```
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<dyn Scheduler>,
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("inner", &self.inner)
            .finish()
    }
}

impl SchedulerHandle {
    /// Wraps any scheduler.
    #[inline]
    pub fn new<S: Scheduler + 'static>(scheduler: Arc<S>) -> Self {
        Self { inner: scheduler }
    }

    /// Creates a handle backed by a virtual scheduler.
    #[must_use]
    pub fn with_virtual(scheduler: Arc<VirtualScheduler>) -> Self {
        Self::new(scheduler)
    }

    /// Creates a handle backed by a thread scheduler.
    #[must_use]
    pub fn with_thread(scheduler: Arc<ThreadScheduler>) -> Self {
        Self::new(scheduler)
    }

    /// Returns true if two handles refer to the same scheduler.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Schedules a closure to run no earlier than `now() + delay`.
    pub fn schedule_fn<F>(&self, delay: u64, f: F) -> Result<CancelHandle, SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.schedule(delay, Box::new(f))
    }

    /// Schedules a closure to run no earlier than `due`.
    pub fn schedule_fn_at<F>(&self, due: Tick, f: F) -> Result<CancelHandle, SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.schedule_at(due, Box::new(f))
    }
}

impl Scheduler for SchedulerHandle {
    #[inline]
    fn now(&self) -> Tick {
        self.inner.now()
    }

    #[inline]
    fn schedule(&self, delay: u64, work: Work) -> Result<CancelHandle, SchedulerError> {
        self.inner.schedule(delay, work)
    }

    #[inline]
    fn schedule_at(&self, due: Tick, work: Work) -> Result<CancelHandle, SchedulerError> {
        self.inner.schedule_at(due, work)
    }

    #[inline]
    fn cancel(&self, handle: &CancelHandle) -> bool {
        self.inner.cancel(handle)
    }
}
