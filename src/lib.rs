//! Lockstep: virtual-time scheduling and event capture for testing
//! push-based streams.
//!
//! # Overview
//!
//! Code that emits events over time (debounced inputs, retry loops, multi-hop
//! pipelines that move work between contexts) is hard to test against the
//! wall clock. Lockstep replaces the clock instead of waiting on it:
//!
//! - The code under test takes a [`SchedulerHandle`] and schedules its work
//!   through it.
//! - A test hands it a handle backed by a [`VirtualScheduler`]. Nothing runs
//!   until the test calls [`VirtualScheduler::advance`], which runs every due
//!   action in a fixed order and returns.
//! - A [`StreamObserver`] attached to the output records every value and the
//!   terminal event for the test to assert on.
//!
//! Production code gets a handle backed by a [`ThreadScheduler`] and runs in
//! real time with no other changes.
//!
//! # Guarantees
//!
//! - **Determinism**: the same schedule and advance calls produce the same
//!   observed output on every run.
//! - **Ordering**: work runs by due tick, ties broken by scheduling order.
//! - **No early execution**: work never runs before its due tick, and a zero
//!   delay never runs inline.
//! - **Terminal exclusivity**: anything a producer emits after its terminal
//!   event is reported as a [`ProtocolViolation`], never appended to the log.
//!
//! # Example
//!
//! ```
//! use lockstep::observe::{ObservedEvent, StreamObserver, Subject};
//! use lockstep::scheduler::{SchedulerHandle, VirtualScheduler};
//! use std::sync::Arc;
//!
//! let virtual_time = Arc::new(VirtualScheduler::new());
//! let scheduler = SchedulerHandle::with_virtual(virtual_time.clone());
//!
//! let input: Subject<u32, String> = Subject::new();
//! let observer = StreamObserver::observe(&input);
//!
//! for (tick, value) in [(1, 10), (2, 20)] {
//!     let tx = input.clone();
//!     scheduler.schedule_fn(tick, move || tx.send(value)).unwrap();
//! }
//! let tx = input.clone();
//! scheduler.schedule_fn(3, move || tx.complete()).unwrap();
//!
//! virtual_time.advance(3).unwrap();
//! assert_eq!(
//!     observer.events(),
//!     vec![
//!         ObservedEvent::Value(10),
//!         ObservedEvent::Value(20),
//!         ObservedEvent::completed(),
//!     ]
//! );
//! ```
//!
//! # Module Structure
//!
//! - [`types`]: [`Tick`] and scheduling sequence numbers
//! - [`time`]: Virtual and wall clocks
//! - [`scheduler`]: The scheduler contract and its two implementations
//! - [`observe`]: Producers, subscribers, the recording observer, and subjects
//! - [`error`](mod@error): Error types
//! - [`tracing_compat`]: Optional tracing integration (requires `tracing-integration` feature)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod error;
pub mod observe;
pub mod scheduler;
pub mod time;
pub mod tracing_compat;
pub mod types;

#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

pub use error::{ConfigError, Error, ObserveError, Result, SchedulerError};
pub use observe::{
    ObservedEvent, Producer, ProtocolViolation, Recorded, StreamObserver, Subject, Subscriber,
    Subscription, Terminal,
};
pub use scheduler::{
    CancelHandle, Scheduler, SchedulerConfig, SchedulerHandle, ThreadScheduler,
    ThreadSchedulerConfig, VirtualScheduler, Work,
};
pub use time::{TimeSource, VirtualClock, WallClock};
pub use types::Tick;
