//! Scheduler configuration.
//!
//! Both configs are plain data with builder-style setters. [`SchedulerConfig`]
//! can also be read from a TOML document when the `config-file` feature is
//! enabled.

use crate::error::SchedulerError;
use crate::types::Tick;
use serde::Deserialize;
use std::time::Duration;

/// Configuration for a [`VirtualScheduler`](super::VirtualScheduler).
///
/// # Example
///
/// ```
/// use lockstep::scheduler::SchedulerConfig;
/// use lockstep::types::Tick;
///
/// let config = SchedulerConfig::new()
///     .starting_at(Tick::new(100))
///     .with_drain_limit(Some(10_000));
/// assert_eq!(config.start, Tick::new(100));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Initial logical time.
    pub start: Tick,
    /// Maximum number of actions a single drain may run.
    ///
    /// `None` disables the limit. A producer that keeps rescheduling itself
    /// at zero delay will then hang the drain.
    pub drain_limit: Option<u64>,
}

impl SchedulerConfig {
    /// Default drain limit.
    pub const DEFAULT_DRAIN_LIMIT: u64 = 1_000_000;

    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            start: Tick::ZERO,
            drain_limit: Some(Self::DEFAULT_DRAIN_LIMIT),
        }
    }

    /// Sets the initial logical time.
    #[must_use]
    pub const fn starting_at(mut self, start: Tick) -> Self {
        self.start = start;
        self
    }

    /// Sets the drain limit.
    ///
    /// `None` removes it. With a limit, an advance whose due work exceeds it
    /// fails with [`SchedulerError::DrainLimitExceeded`] before reaching its
    /// target.
    #[must_use]
    pub const fn with_drain_limit(mut self, limit: Option<u64>) -> Self {
        self.drain_limit = limit;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.drain_limit == Some(0) {
            return Err(SchedulerError::InvalidConfig {
                reason: "drain_limit must be at least 1",
            });
        }
        Ok(())
    }

    /// Parses a configuration from a TOML document.
    ///
    /// Missing keys take their default values.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(source: &str) -> Result<Self, crate::error::Error> {
        let config: Self = toml::from_str(source)
            .map_err(|err| crate::error::ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for a [`ThreadScheduler`](super::ThreadScheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSchedulerConfig {
    /// Wall-clock length of one tick.
    pub tick: Duration,
    /// Name of the worker thread.
    pub thread_name: String,
}

impl ThreadSchedulerConfig {
    /// Default worker thread name.
    pub const DEFAULT_THREAD_NAME: &'static str = "lockstep-scheduler";

    /// Creates the default configuration: one-millisecond ticks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tick: Duration::from_millis(1),
            thread_name: Self::DEFAULT_THREAD_NAME.to_string(),
        }
    }

    /// Sets the tick length.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Sets the worker thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.tick.is_zero() {
            return Err(SchedulerError::InvalidConfig {
                reason: "tick must be non-zero",
            });
        }
        Ok(())
    }
}

impl Default for ThreadSchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}
