//! Error types.
//!
//! Misuse of the scheduler or observer fails fast at the offending call and
//! leaves all prior state intact. Errors reported by a producer under test are
//! not errors here: they are recorded as
//! [`Terminal::Failed`](crate::observe::Terminal::Failed) for the test to
//! assert on.

use crate::observe::ProtocolViolation;
use crate::types::Tick;
use thiserror::Error as ThisError;

/// Errors raised by [`Scheduler`](crate::scheduler::Scheduler) implementations.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum SchedulerError {
    /// An advance by a negative amount (or to an earlier tick) was requested.
    #[error("invalid advance by {by} ticks: logical time cannot move backwards")]
    InvalidAdvance {
        /// Requested distance, negative.
        by: i64,
    },
    /// An absolute due time earlier than the current time was requested.
    #[error("invalid schedule: due time {due} is before current time {now}")]
    InvalidSchedule {
        /// Requested due time.
        due: Tick,
        /// Scheduler time at the call.
        now: Tick,
    },
    /// `advance` was called from inside work that an `advance` is running.
    #[error("reentrant advance at {now}: advance cannot be called from scheduled work")]
    ReentrantAdvance {
        /// Scheduler time at the nested call.
        now: Tick,
    },
    /// A due time or advance target does not fit in a [`Tick`].
    #[error("tick overflow: {now} + {delta} exceeds the tick range")]
    TickOverflow {
        /// Scheduler time at the call.
        now: Tick,
        /// Requested delay or advance distance.
        delta: u64,
    },
    /// A single drain executed its configured maximum number of actions.
    #[error("drain limit of {limit} actions reached at {at}")]
    DrainLimitExceeded {
        /// Configured limit.
        limit: u64,
        /// Clock value when draining stopped.
        at: Tick,
    },
    /// The scheduler no longer accepts work.
    #[error("scheduler has been shut down")]
    Shutdown,
    /// A scheduler configuration value was rejected.
    #[error("invalid scheduler configuration: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: &'static str,
    },
    /// The worker thread of a thread scheduler could not be started.
    #[error("failed to spawn scheduler worker: {message}")]
    WorkerSpawn {
        /// OS error text.
        message: String,
    },
}

/// Errors raised by [`StreamObserver`](crate::observe::StreamObserver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum ObserveError {
    /// The observer is already bound to a producer.
    #[error("observer is already subscribed to a producer")]
    AlreadySubscribed,
}

/// Errors loading a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ConfigError {
    /// The document could not be parsed.
    #[error("failed to parse scheduler config: {0}")]
    Parse(String),
}

/// Any error produced by this crate.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    /// Scheduler misuse.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// Observer misuse.
    #[error(transparent)]
    Observe(#[from] ObserveError),
    /// A producer broke the stream protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
