//! Manually driven producer.
//!
//! A [`Subject`] forwards whatever is pushed into it to every current
//! subscriber. It is the usual way for a test to feed input into the code
//! under test, either directly or from work scheduled on a
//! [`VirtualScheduler`](crate::scheduler::VirtualScheduler):
//!
//! ```
//! use lockstep::observe::{StreamObserver, Subject};
//! use lockstep::scheduler::{SchedulerHandle, VirtualScheduler};
//! use std::sync::Arc;
//!
//! let virtual_time = Arc::new(VirtualScheduler::new());
//! let scheduler = SchedulerHandle::with_virtual(virtual_time.clone());
//! let input: Subject<&str, ()> = Subject::new();
//! let observer = StreamObserver::observe(&input);
//!
//! let tx = input.clone();
//! scheduler.schedule_fn(2, move || tx.send("hello")).unwrap();
//!
//! virtual_time.advance(1).unwrap();
//! assert!(observer.values().is_empty());
//! virtual_time.advance(1).unwrap();
//! assert_eq!(observer.values(), vec!["hello"]);
//! ```
//!
//! Delivery happens on the caller's thread, outside the subject's lock, so
//! subscribers may push back into the subject or unsubscribe while handling
//! an event.

use super::{Producer, Subscriber, Subscription, Terminal};
use crate::tracing_compat::{debug, trace};
use core::fmt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

struct SubjectState<T, E> {
    subscribers: BTreeMap<u64, Subscriber<T, E>>,
    next_id: u64,
    terminal: Option<Terminal<E>>,
}

/// A multicast producer that tests push into by hand.
///
/// Cloning a subject yields another handle to the same stream. After
/// [`complete`](Self::complete) or [`fail`](Self::fail), further sends are
/// ignored and late subscribers immediately receive the terminal event.
pub struct Subject<T, E> {
    state: Arc<Mutex<SubjectState<T, E>>>,
}

impl<T, E> Clone for Subject<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, E> Subject<T, E> {
    /// Creates a subject with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SubjectState {
                subscribers: BTreeMap::new(),
                next_id: 0,
                terminal: None,
            })),
        }
    }

    /// Returns the number of attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Returns true after `complete` or `fail`.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminal.is_some()
    }

    fn snapshot(&self) -> Option<Vec<Subscriber<T, E>>> {
        let state = self.state.lock();
        if state.terminal.is_some() {
            return None;
        }
        Some(state.subscribers.values().cloned().collect())
    }
}

impl<T: Clone, E> Subject<T, E> {
    /// Delivers a value to every subscriber, in subscription order.
    ///
    /// Ignored once the subject has terminated.
    pub fn send(&self, value: T) {
        let Some(subscribers) = self.snapshot() else {
            debug!(
                event = "subject.send_after_terminal",
                "send on terminated subject ignored"
            );
            return;
        };
        trace!(subscribers = subscribers.len(), "subject send");
        for subscriber in subscribers {
            subscriber.on_value(value.clone());
        }
    }
}

impl<T, E: Clone> Subject<T, E> {
    /// Completes the stream for every subscriber.
    pub fn complete(&self) {
        self.terminate(Terminal::Completed);
    }

    /// Fails the stream for every subscriber.
    pub fn fail(&self, err: E) {
        self.terminate(Terminal::Failed(err));
    }

    fn terminate(&self, terminal: Terminal<E>) {
        let subscribers = {
            let mut state = self.state.lock();
            if state.terminal.is_some() {
                drop(state);
                debug!(
                    event = "subject.send_after_terminal",
                    "second terminal event on subject ignored"
                );
                return;
            }
            state.terminal = Some(terminal.clone());
            std::mem::take(&mut state.subscribers)
        };
        trace!(subscribers = subscribers.len(), "subject terminated");
        for subscriber in subscribers.into_values() {
            subscriber.on_terminal(terminal.clone());
        }
    }
}

impl<T, E> Default for Subject<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for Subject<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Subject")
            .field("subscribers", &state.subscribers.len())
            .field("terminated", &state.terminal.is_some())
            .finish()
    }
}

impl<T, E> Producer for Subject<T, E>
where
    T: Send + 'static,
    E: Clone + Send + 'static,
{
    type Item = T;
    type Error = E;

    fn subscribe(&self, subscriber: Subscriber<T, E>) -> Subscription {
        let mut state = self.state.lock();
        if let Some(terminal) = state.terminal.clone() {
            drop(state);
            subscriber.on_terminal(terminal);
            return Subscription::empty();
        }
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(id, subscriber);
        drop(state);

        let weak: Weak<Mutex<SubjectState<T, E>>> = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = weak.upgrade() {
                state.lock().subscribers.remove(&id);
            }
        })
    }
}
