//! Clocks and time sources.
//!
//! - [`VirtualClock`]: logical time moved only by the virtual scheduler
//! - [`WallClock`]: ticks derived from elapsed wall-clock time

pub mod clock;

pub use clock::{TimeSource, VirtualClock, WallClock};
