//! Events delivered by a producer.

use crate::types::Tick;
use core::fmt;

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Terminal<E> {
    /// The stream finished normally.
    Completed,
    /// The stream failed with an error.
    Failed(E),
}

impl<E> Terminal<E> {
    /// Returns true for [`Terminal::Completed`].
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns the error for [`Terminal::Failed`].
    #[must_use]
    pub const fn error(&self) -> Option<&E> {
        match self {
            Self::Completed => None,
            Self::Failed(err) => Some(err),
        }
    }

    /// Borrows the error, keeping the variant.
    #[must_use]
    pub const fn as_ref(&self) -> Terminal<&E> {
        match self {
            Self::Completed => Terminal::Completed,
            Self::Failed(err) => Terminal::Failed(err),
        }
    }
}

impl<E> fmt::Display for Terminal<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// One emission from a producer: a value or the terminal event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObservedEvent<T, E> {
    /// A value.
    Value(T),
    /// Completion or failure.
    Terminal(Terminal<E>),
}

impl<T, E> ObservedEvent<T, E> {
    /// Shorthand for a completion event.
    #[must_use]
    pub const fn completed() -> Self {
        Self::Terminal(Terminal::Completed)
    }

    /// Shorthand for a failure event.
    #[must_use]
    pub const fn failed(err: E) -> Self {
        Self::Terminal(Terminal::Failed(err))
    }

    /// Returns true for terminal events.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }

    /// Returns the value, if this is a value event.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Terminal(_) => None,
        }
    }

    pub(crate) const fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Terminal(Terminal::Completed) => "completed",
            Self::Terminal(Terminal::Failed(_)) => "failed",
        }
    }
}

/// An event together with the tick it was observed at.
///
/// `at` is `None` when the observer has no clock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Recorded<T, E> {
    /// Observation time.
    pub at: Option<Tick>,
    /// The event.
    pub event: ObservedEvent<T, E>,
}
