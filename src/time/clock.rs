//! Clocks for logical time.
//!
//! The [`TimeSource`] trait lets schedulers and observers read the current
//! [`Tick`] without knowing whether time is virtual (tests) or derived from the
//! wall clock (production).

use crate::types::Tick;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Time source abstraction for getting the current tick.
pub trait TimeSource: Send + Sync + std::fmt::Debug {
    /// Returns the current time.
    fn now(&self) -> Tick;
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn now(&self) -> Tick {
        self.as_ref().now()
    }
}

/// Wall clock time source for production use.
///
/// Counts whole ticks of a fixed length since the clock was created.
#[derive(Debug, Clone)]
pub struct WallClock {
    /// The instant when this clock was created.
    epoch: Instant,
    /// Wall-clock length of one tick. Never zero.
    tick: Duration,
}

impl WallClock {
    /// Default tick length.
    pub const DEFAULT_TICK: Duration = Duration::from_millis(1);

    /// Creates a wall clock with one-millisecond ticks.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tick(Self::DEFAULT_TICK)
    }

    /// Creates a wall clock with the given tick length.
    ///
    /// A zero tick length is raised to one nanosecond.
    #[must_use]
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            tick: tick.max(Duration::from_nanos(1)),
        }
    }

    /// Returns the wall-clock length of one tick.
    #[must_use]
    pub fn tick_length(&self) -> Duration {
        self.tick
    }

    /// Returns how long to wait from now until `due` is reached.
    ///
    /// Returns [`Duration::ZERO`] if `due` has already passed.
    #[must_use]
    pub fn duration_until(&self, due: Tick) -> Duration {
        let due_nanos = u128::from(due.get()).saturating_mul(self.tick.as_nanos());
        let elapsed_nanos = self.epoch.elapsed().as_nanos();
        let wait = due_nanos.saturating_sub(elapsed_nanos);
        Duration::from_nanos(u64::try_from(wait).unwrap_or(u64::MAX))
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> Tick {
        let elapsed = self.epoch.elapsed().as_nanos();
        let ticks = elapsed / self.tick.as_nanos();
        Tick::new(u64::try_from(ticks).unwrap_or(u64::MAX))
    }
}

/// Virtual time source for deterministic tests.
///
/// Time only advances when the owning scheduler advances it, and it never
/// moves backwards.
///
/// # Example
///
/// ```
/// use lockstep::time::{TimeSource, VirtualClock};
/// use lockstep::types::Tick;
///
/// let clock = VirtualClock::starting_at(Tick::new(10));
/// assert_eq!(clock.now(), Tick::new(10));
/// ```
#[derive(Debug)]
pub struct VirtualClock {
    /// Current time in ticks.
    now: AtomicU64,
}

impl VirtualClock {
    /// Creates a new virtual clock starting at tick zero.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Tick::ZERO)
    }

    /// Creates a virtual clock starting at the given tick.
    #[must_use]
    pub fn starting_at(time: Tick) -> Self {
        Self {
            now: AtomicU64::new(time.get()),
        }
    }

    /// Moves the clock forward to `time`.
    ///
    /// Earlier targets are ignored, so the clock is monotone.
    pub(crate) fn advance_to(&self, time: Tick) {
        self.now.fetch_max(time.get(), Ordering::AcqRel);
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for VirtualClock {
    fn now(&self) -> Tick {
        Tick::new(self.now.load(Ordering::Acquire))
    }
}
