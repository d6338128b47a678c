//! Push-based producers and a recording observer for testing them.
//!
//! A [`Producer`] pushes events into a [`Subscriber`]: zero or more values
//! followed by at most one terminal event. [`StreamObserver`] subscribes to a
//! producer and records everything it receives so a test can assert on it
//! after advancing a [`VirtualScheduler`](crate::scheduler::VirtualScheduler).
//!
//! [`Subject`] is a ready-made producer that tests (and simple pipelines) can
//! push into directly.

pub mod event;
pub mod observer;
pub mod subject;

pub use event::{ObservedEvent, Recorded, Terminal};
pub use observer::{ProtocolViolation, StreamObserver, ViolationKind};
pub use subject::Subject;

use core::fmt;
use std::sync::Arc;

/// A source of events that subscribers can attach to.
///
/// Implementations push events into the subscriber from whatever context
/// they run in, typically from work scheduled on a
/// [`Scheduler`](crate::scheduler::Scheduler).
pub trait Producer {
    /// The type of values produced.
    type Item;
    /// The error carried by a failure.
    type Error;

    /// Attaches a subscriber. Dropping or unsubscribing the returned
    /// [`Subscription`] detaches it.
    fn subscribe(&self, subscriber: Subscriber<Self::Item, Self::Error>) -> Subscription;
}

impl<P: Producer + ?Sized> Producer for &P {
    type Item = P::Item;
    type Error = P::Error;

    fn subscribe(&self, subscriber: Subscriber<Self::Item, Self::Error>) -> Subscription {
        (**self).subscribe(subscriber)
    }
}

impl<P: Producer + ?Sized> Producer for Arc<P> {
    type Item = P::Item;
    type Error = P::Error;

    fn subscribe(&self, subscriber: Subscriber<Self::Item, Self::Error>) -> Subscription {
        (**self).subscribe(subscriber)
    }
}

type Sink<T, E> = dyn Fn(ObservedEvent<T, E>) + Send + Sync;

/// Receiving end handed to a [`Producer`].
///
/// Cheap to clone; all clones deliver to the same place.
pub struct Subscriber<T, E> {
    sink: Arc<Sink<T, E>>,
}

impl<T, E> Clone for Subscriber<T, E> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<T, E> fmt::Debug for Subscriber<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber").finish_non_exhaustive()
    }
}

impl<T, E> Subscriber<T, E> {
    /// Creates a subscriber from an event callback.
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(ObservedEvent<T, E>) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// Delivers an event.
    pub fn signal(&self, event: ObservedEvent<T, E>) {
        (self.sink)(event);
    }

    /// Delivers a value.
    pub fn on_value(&self, value: T) {
        self.signal(ObservedEvent::Value(value));
    }

    /// Delivers successful completion.
    pub fn on_completed(&self) {
        self.signal(ObservedEvent::completed());
    }

    /// Delivers a failure.
    pub fn on_error(&self, err: E) {
        self.signal(ObservedEvent::failed(err));
    }

    /// Delivers a terminal event.
    pub fn on_terminal(&self, terminal: Terminal<E>) {
        self.signal(ObservedEvent::Terminal(terminal));
    }
}

/// Link between a producer and one of its subscribers.
///
/// Detaches the subscriber when dropped.
#[must_use = "dropping a Subscription detaches the subscriber immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Creates a subscription that runs `cancel` on unsubscribe or drop.
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Creates a subscription with nothing to detach.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Returns true if detaching would still do something.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Detaches the subscriber.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
