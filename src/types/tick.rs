//! Logical time.
//!
//! A [`Tick`] is the discrete unit of time tracked by a clock. Under the
//! virtual scheduler it only moves when a test asks it to; under the thread
//! scheduler one tick corresponds to a configured wall-clock duration.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::ops::Add;

/// A point in logical time.
///
/// Ticks are totally ordered and never decrease for a given clock.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tick(u64);

impl Tick {
    /// The zero instant (start of a test by default).
    pub const ZERO: Self = Self(0);

    /// The maximum representable instant.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a tick from a raw count.
    #[inline]
    #[must_use]
    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Returns the raw tick count.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Adds `delta` ticks, returning `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, delta: u64) -> Option<Self> {
        match self.0.checked_add(delta) {
            Some(ticks) => Some(Self(ticks)),
            None => None,
        }
    }

    /// Adds `delta` ticks, saturating at [`Tick::MAX`].
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, delta: u64) -> Self {
        Self(self.0.saturating_add(delta))
    }

    /// Returns the number of ticks between two instants.
    ///
    /// Returns 0 if `self` is before `earlier`.
    #[inline]
    #[must_use]
    pub const fn ticks_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl From<u64> for Tick {
    #[inline]
    fn from(ticks: u64) -> Self {
        Self(ticks)
    }
}

impl From<Tick> for u64 {
    #[inline]
    fn from(tick: Tick) -> Self {
        tick.0
    }
}

impl Add<u64> for Tick {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl fmt::Debug for Tick {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tick({})", self.0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}
