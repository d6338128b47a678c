//! Wall-clock scheduler backed by a single worker thread.
//!
//! Work runs on the worker once the wall clock reaches its due tick. One tick
//! lasts [`ThreadSchedulerConfig::tick`]. Actions due on the same tick run in
//! scheduling order, exactly as under the virtual scheduler.

use super::queue::PendingQueue;
use super::{CancelHandle, Scheduler, ThreadSchedulerConfig, Work, next_scheduler_id};
use crate::error::SchedulerError;
use crate::time::{TimeSource, WallClock};
use crate::tracing_compat::{debug, error, trace};
use crate::types::Tick;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Default)]
struct State {
    queue: PendingQueue,
    shutdown: bool,
}

#[derive(Debug)]
struct Shared {
    id: u64,
    clock: WallClock,
    state: Mutex<State>,
    wakeup: Condvar,
}

/// A scheduler that runs work on a background thread in real time.
///
/// Dropping the scheduler shuts it down and joins the worker. Pending work is
/// dropped without running.
///
/// # Example
///
/// ```
/// use lockstep::scheduler::{Scheduler, ThreadScheduler, ThreadSchedulerConfig};
/// use std::sync::mpsc;
/// use std::time::Duration;
///
/// let scheduler = ThreadScheduler::new(ThreadSchedulerConfig::new()).unwrap();
/// let (tx, rx) = mpsc::channel();
/// scheduler.schedule(2, Box::new(move || tx.send("done").unwrap())).unwrap();
/// assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok("done"));
/// ```
pub struct ThreadScheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    config: ThreadSchedulerConfig,
}

impl ThreadScheduler {
    /// Starts a scheduler and its worker thread.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] for a zero tick length and
    /// [`SchedulerError::WorkerSpawn`] if the thread cannot be started.
    pub fn new(config: ThreadSchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        let shared = Arc::new(Shared {
            id: next_scheduler_id(),
            clock: WallClock::with_tick(config.tick),
            state: Mutex::new(State::default()),
            wakeup: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run_worker(&worker_shared))
            .map_err(|err| SchedulerError::WorkerSpawn {
                message: err.to_string(),
            })?;

        debug!(
            scheduler = shared.id,
            thread = %config.thread_name,
            tick = ?config.tick,
            "thread scheduler started"
        );
        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
            config,
        })
    }

    /// Returns the configuration this scheduler was built with.
    #[must_use]
    pub const fn config(&self) -> &ThreadSchedulerConfig {
        &self.config
    }

    /// Returns the current tick of the wall clock.
    #[must_use]
    pub fn now(&self) -> Tick {
        self.shared.clock.now()
    }

    /// Schedules `work` to run once `delay` ticks have elapsed.
    pub fn schedule(&self, delay: u64, work: Work) -> Result<CancelHandle, SchedulerError> {
        let now = self.now();
        let due = now
            .checked_add(delay)
            .ok_or(SchedulerError::TickOverflow { now, delta: delay })?;
        self.enqueue(due, work)
    }

    /// Schedules `work` to run once the clock reaches `due`.
    pub fn schedule_at(&self, due: Tick, work: Work) -> Result<CancelHandle, SchedulerError> {
        let now = self.now();
        if due < now {
            return Err(SchedulerError::InvalidSchedule { due, now });
        }
        self.enqueue(due, work)
    }

    fn enqueue(&self, due: Tick, work: Work) -> Result<CancelHandle, SchedulerError> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(SchedulerError::Shutdown);
        }
        let seq = state.queue.insert(due, work);
        drop(state);
        self.shared.wakeup.notify_one();
        trace!(
            event = "scheduler.action.schedule",
            scheduler = self.shared.id,
            due = %due,
            seq = seq.value(),
            "action scheduled"
        );
        Ok(CancelHandle::new(self.shared.id, due, seq))
    }

    /// Cancels a pending action. Work already running is not interrupted.
    pub fn cancel(&self, handle: &CancelHandle) -> bool {
        if !handle.issued_by(self.shared.id) {
            return false;
        }
        let removed = self
            .shared
            .state
            .lock()
            .queue
            .remove(handle.due(), handle.seq());
        trace!(
            event = "scheduler.action.cancel",
            scheduler = self.shared.id,
            seq = handle.seq().value(),
            removed,
            "action cancelled"
        );
        removed
    }

    /// Returns the number of pending actions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Stops the worker and drops pending work.
    ///
    /// Later calls to `schedule` fail with [`SchedulerError::Shutdown`].
    /// Idempotent. When called from scheduled work the worker is left to exit
    /// on its own instead of being joined.
    pub fn shutdown(&self) {
        let pending = {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            std::mem::take(&mut state.queue)
        };
        self.shared.wakeup.notify_all();
        debug!(
            scheduler = self.shared.id,
            dropped = pending.len(),
            "thread scheduler shut down"
        );
        drop(pending);

        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            error!(scheduler = self.shared.id, "scheduler worker panicked");
        }
    }
}

impl fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadScheduler")
            .field("id", &self.shared.id)
            .field("config", &self.config)
            .field("now", &self.now())
            .finish_non_exhaustive()
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Scheduler for ThreadScheduler {
    fn now(&self) -> Tick {
        Self::now(self)
    }

    fn schedule(&self, delay: u64, work: Work) -> Result<CancelHandle, SchedulerError> {
        Self::schedule(self, delay, work)
    }

    fn schedule_at(&self, due: Tick, work: Work) -> Result<CancelHandle, SchedulerError> {
        Self::schedule_at(self, due, work)
    }

    fn cancel(&self, handle: &CancelHandle) -> bool {
        Self::cancel(self, handle)
    }
}

fn run_worker(shared: &Shared) {
    let mut state = shared.state.lock();
    while !state.shutdown {
        let Some(due) = state.queue.next_due() else {
            shared.wakeup.wait(&mut state);
            continue;
        };
        let wait = shared.clock.duration_until(due);
        if !wait.is_zero() {
            // Woken early by a new schedule or shutdown; recompute either way.
            let _ = shared.wakeup.wait_for(&mut state, wait);
            continue;
        }
        let Some(action) = state.queue.pop_first() else {
            continue;
        };
        MutexGuard::unlocked(&mut state, || {
            trace!(
                event = "scheduler.action.run",
                scheduler = shared.id,
                due = %action.due,
                seq = action.seq.value(),
                "running action"
            );
            if catch_unwind(AssertUnwindSafe(|| action.run())).is_err() {
                error!(scheduler = shared.id, "scheduled work panicked");
            }
        });
    }
}
