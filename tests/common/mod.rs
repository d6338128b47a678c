//! Shared fixtures for integration tests.
//!
//! The operators here stand in for a stream library: [`Map`] transforms
//! values and [`ReceiveOn`] re-delivers every event through a scheduler, the
//! way a pipeline hops between execution contexts.

#![allow(dead_code)]

use lockstep::observe::{ObservedEvent, Producer, Subscriber, Subscription};
use lockstep::scheduler::SchedulerHandle;
use std::sync::Arc;

pub fn init_test(name: &str) {
    lockstep::test_utils::init_test_logging();
    lockstep::test_phase!(name);
}

/// Applies a function to every value.
pub struct Map<P, F> {
    source: P,
    f: Arc<F>,
}

impl<P, F> Map<P, F> {
    pub fn new(source: P, f: F) -> Self {
        Self {
            source,
            f: Arc::new(f),
        }
    }
}

impl<P, F, U> Producer for Map<P, F>
where
    P: Producer,
    P::Item: 'static,
    P::Error: 'static,
    F: Fn(P::Item) -> U + Send + Sync + 'static,
    U: 'static,
{
    type Item = U;
    type Error = P::Error;

    fn subscribe(&self, downstream: Subscriber<U, P::Error>) -> Subscription {
        let f = Arc::clone(&self.f);
        self.source.subscribe(Subscriber::new(move |event| match event {
            ObservedEvent::Value(value) => downstream.on_value(f(value)),
            ObservedEvent::Terminal(terminal) => downstream.on_terminal(terminal),
        }))
    }
}

/// Re-delivers every event as zero-delay work on a scheduler.
pub struct ReceiveOn<P> {
    source: P,
    scheduler: SchedulerHandle,
}

impl<P> ReceiveOn<P> {
    pub fn new(source: P, scheduler: SchedulerHandle) -> Self {
        Self { source, scheduler }
    }
}

impl<P> Producer for ReceiveOn<P>
where
    P: Producer,
    P::Item: Send + 'static,
    P::Error: Send + 'static,
{
    type Item = P::Item;
    type Error = P::Error;

    fn subscribe(&self, downstream: Subscriber<P::Item, P::Error>) -> Subscription {
        let scheduler = self.scheduler.clone();
        self.source.subscribe(Subscriber::new(move |event| {
            let downstream = downstream.clone();
            scheduler
                .schedule_fn(0, move || downstream.signal(event))
                .expect("hop scheduled");
        }))
    }
}

/// Loose "looks like an email" check: `local@domain.tld` with no empty part.
pub fn looks_like_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}
