//! Recording observer.
//!
//! [`StreamObserver`] attaches to one producer and keeps an ordered log of
//! what it emits: values, then at most one terminal event. Anything a
//! producer emits after its terminal event is kept out of the log and
//! recorded as a [`ProtocolViolation`] instead, so the test can still inspect
//! the log and decide how to fail.
//!
//! # Usage
//!
//! ```
//! use lockstep::observe::{StreamObserver, Subject};
//!
//! let subject: Subject<u32, String> = Subject::new();
//! let observer = StreamObserver::observe(&subject);
//!
//! subject.send(1);
//! subject.send(2);
//! subject.complete();
//!
//! assert_eq!(observer.values(), vec![1, 2]);
//! assert!(observer.is_complete());
//! assert!(observer.check().is_ok());
//! ```

use super::{ObservedEvent, Producer, Recorded, Subscriber, Subscription, Terminal};
use crate::error::ObserveError;
use crate::time::TimeSource;
use crate::tracing_compat::{trace, warn};
use crate::types::Tick;
use core::fmt;
use parking_lot::Mutex;
use std::sync::Arc;

/// What a misbehaving producer did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// A value arrived after the terminal event.
    ValueAfterTerminal,
    /// A second terminal event arrived.
    TerminalAfterTerminal,
}

impl ViolationKind {
    const fn describe(self) -> &'static str {
        match self {
            Self::ValueAfterTerminal => "value emitted after terminal event",
            Self::TerminalAfterTerminal => "second terminal event emitted",
        }
    }
}

/// A producer emitted after its own terminal event.
///
/// This points at a bug in the producer under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolViolation {
    /// What the producer did.
    pub kind: ViolationKind,
    /// Zero-based position of the offending emission among all emissions the
    /// observer received.
    pub emission: usize,
    /// Tick of the offending emission, if the observer has a clock.
    pub at: Option<Tick>,
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "protocol violation: {} (emission #{}",
            self.kind.describe(),
            self.emission
        )?;
        if let Some(at) = self.at {
            write!(f, " at {at}")?;
        }
        f.write_str(")")
    }
}

impl std::error::Error for ProtocolViolation {}

struct ObserverLog<T, E> {
    events: Vec<Recorded<T, E>>,
    violations: Vec<ProtocolViolation>,
    emissions: usize,
    terminated: bool,
    detached: bool,
}

impl<T, E> ObserverLog<T, E> {
    const fn new() -> Self {
        Self {
            events: Vec::new(),
            violations: Vec::new(),
            emissions: 0,
            terminated: false,
            detached: false,
        }
    }

    fn record(&mut self, event: ObservedEvent<T, E>, at: Option<Tick>) {
        if self.detached {
            return;
        }
        let emission = self.emissions;
        self.emissions += 1;

        if self.terminated {
            let kind = if event.is_terminal() {
                ViolationKind::TerminalAfterTerminal
            } else {
                ViolationKind::ValueAfterTerminal
            };
            warn!(
                event = "observer.protocol_violation",
                kind = kind.describe(),
                emission,
                at = ?at,
                "producer emitted after terminal event"
            );
            self.violations.push(ProtocolViolation { kind, emission, at });
            return;
        }

        trace!(
            event = "observer.event",
            kind = event.kind(),
            emission,
            at = ?at,
            "observer recorded event"
        );
        self.terminated = event.is_terminal();
        self.events.push(Recorded { at, event });
    }

    fn terminal(&self) -> Option<&Terminal<E>> {
        match self.events.last() {
            Some(Recorded {
                event: ObservedEvent::Terminal(terminal),
                ..
            }) => Some(terminal),
            _ => None,
        }
    }
}

/// Records everything one producer emits.
///
/// An observer binds to a producer once for its whole lifetime. Dropping the
/// observer (or calling [`unsubscribe`](Self::unsubscribe)) detaches it from
/// the producer.
pub struct StreamObserver<T, E> {
    log: Arc<Mutex<ObserverLog<T, E>>>,
    clock: Option<Arc<dyn TimeSource>>,
    subscription: Option<Subscription>,
    bound: bool,
}

impl<T, E> StreamObserver<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Creates an observer that has not subscribed to anything yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(ObserverLog::new())),
            clock: None,
            subscription: None,
            bound: false,
        }
    }

    /// Creates an observer that stamps each event with `clock`'s time.
    ///
    /// Pass [`VirtualScheduler::clock`](crate::scheduler::VirtualScheduler::clock)
    /// to record the tick every event arrived at.
    #[must_use]
    pub fn with_clock<C>(clock: Arc<C>) -> Self
    where
        C: TimeSource + 'static,
    {
        let clock: Arc<dyn TimeSource> = clock;
        let mut observer = Self::new();
        observer.clock = Some(clock);
        observer
    }

    /// Creates an observer and subscribes it to `producer`.
    #[must_use]
    pub fn observe<P>(producer: &P) -> Self
    where
        P: Producer<Item = T, Error = E> + ?Sized,
    {
        let mut observer = Self::new();
        observer.attach(producer);
        observer
    }

    /// Subscribes to `producer`.
    ///
    /// # Errors
    ///
    /// [`ObserveError::AlreadySubscribed`] if this observer was ever
    /// subscribed before, even if it has since unsubscribed. The existing
    /// subscription and log are left as they are.
    pub fn subscribe<P>(&mut self, producer: &P) -> Result<(), ObserveError>
    where
        P: Producer<Item = T, Error = E> + ?Sized,
    {
        if self.bound {
            return Err(ObserveError::AlreadySubscribed);
        }
        self.attach(producer);
        Ok(())
    }

    fn attach<P>(&mut self, producer: &P)
    where
        P: Producer<Item = T, Error = E> + ?Sized,
    {
        self.bound = true;
        let log = Arc::clone(&self.log);
        let clock = self.clock.clone();
        let subscriber = Subscriber::new(move |event| {
            let at = clock.as_ref().map(|clock| clock.now());
            log.lock().record(event, at);
        });
        self.subscription = Some(producer.subscribe(subscriber));
    }
}

impl<T, E> StreamObserver<T, E> {
    /// Returns true while attached to a producer.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Detaches from the producer. Later emissions are ignored.
    ///
    /// The log recorded so far is kept.
    pub fn unsubscribe(&mut self) {
        self.log.lock().detached = true;
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    /// Returns true once a terminal event of either kind was recorded.
    ///
    /// Use [`terminal`](Self::terminal) to tell success from failure.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.log.lock().terminated
    }

    /// Returns the number of values recorded.
    #[must_use]
    pub fn value_count(&self) -> usize {
        let log = self.log.lock();
        log.events.len() - usize::from(log.terminated)
    }

    /// Returns the protocol violations seen so far.
    #[must_use]
    pub fn violations(&self) -> Vec<ProtocolViolation> {
        self.log.lock().violations.clone()
    }

    /// Fails with the first protocol violation, if any.
    pub fn check(&self) -> Result<(), ProtocolViolation> {
        match self.log.lock().violations.first() {
            Some(violation) => Err(violation.clone()),
            None => Ok(()),
        }
    }
}

impl<T: Clone, E> StreamObserver<T, E> {
    /// Returns the recorded values in arrival order.
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        self.log
            .lock()
            .events
            .iter()
            .filter_map(|recorded| recorded.event.value().cloned())
            .collect()
    }
}

impl<T, E: Clone> StreamObserver<T, E> {
    /// Returns the error the producer failed with, if it failed.
    #[must_use]
    pub fn error(&self) -> Option<E> {
        self.log.lock().terminal().and_then(Terminal::error).cloned()
    }

    /// Returns the terminal event, if one was recorded.
    #[must_use]
    pub fn terminal(&self) -> Option<Terminal<E>> {
        self.log.lock().terminal().cloned()
    }
}

impl<T: Clone, E: Clone> StreamObserver<T, E> {
    /// Returns the full log: values followed by at most one terminal event.
    #[must_use]
    pub fn events(&self) -> Vec<ObservedEvent<T, E>> {
        self.log
            .lock()
            .events
            .iter()
            .map(|recorded| recorded.event.clone())
            .collect()
    }

    /// Returns the full log with observation times.
    #[must_use]
    pub fn recorded(&self) -> Vec<Recorded<T, E>> {
        self.log.lock().events.clone()
    }
}

impl<T, E> Default for StreamObserver<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for StreamObserver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let log = self.log.lock();
        f.debug_struct("StreamObserver")
            .field("events", &log.events.len())
            .field("terminated", &log.terminated)
            .field("violations", &log.violations.len())
            .field("subscribed", &self.subscription.is_some())
            .finish_non_exhaustive()
    }
}
