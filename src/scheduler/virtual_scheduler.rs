//! Deterministic scheduler driven by explicit time advancement.
//!
//! Nothing runs until the test calls [`VirtualScheduler::advance`] (or one of
//! its siblings). An advance drains every action whose due tick is reached,
//! in `(due, seq)` order, setting the clock to each action's due tick before
//! running it. Work scheduled while draining is picked up by the same drain if
//! it falls due within the target, so multi-hop pipelines settle in a single
//! call.
//!
//! Work always runs on the thread that called `advance`, and never while the
//! queue lock is held, so scheduled work is free to schedule or cancel more
//! work.

use super::queue::{PendingQueue, ScheduledAction};
use super::{CancelHandle, Scheduler, SchedulerConfig, Work, next_scheduler_id};
use crate::error::SchedulerError;
use crate::time::{TimeSource, VirtualClock};
use crate::tracing_compat::{debug, trace};
use crate::types::Tick;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Marks a drain in progress; cleared on drop, including on unwind.
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// A scheduler whose clock only moves when told to.
///
/// # Example
///
/// ```
/// use lockstep::scheduler::{Scheduler, VirtualScheduler};
/// use lockstep::types::Tick;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let scheduler = VirtualScheduler::new();
/// let runs = Arc::new(AtomicUsize::new(0));
///
/// let counter = runs.clone();
/// scheduler
///     .schedule(5, Box::new(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }))
///     .unwrap();
///
/// assert_eq!(scheduler.advance(3).unwrap(), 0);
/// assert_eq!(scheduler.advance(2).unwrap(), 1);
/// assert_eq!(scheduler.now(), Tick::new(5));
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
/// ```
#[derive(Debug)]
pub struct VirtualScheduler {
    id: u64,
    clock: Arc<VirtualClock>,
    queue: Mutex<PendingQueue>,
    draining: AtomicBool,
    config: SchedulerConfig,
}

impl VirtualScheduler {
    /// Creates a scheduler at tick zero with the default drain limit.
    #[must_use]
    pub fn new() -> Self {
        Self::build(SchedulerConfig::default())
    }

    /// Creates a scheduler from a configuration.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SchedulerConfig) -> Self {
        Self {
            id: next_scheduler_id(),
            clock: Arc::new(VirtualClock::starting_at(config.start)),
            queue: Mutex::new(PendingQueue::new()),
            draining: AtomicBool::new(false),
            config,
        }
    }

    /// Returns the configuration this scheduler was built with.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Returns the scheduler's clock.
    ///
    /// Hand this to a [`StreamObserver`](crate::observe::StreamObserver) to
    /// timestamp what it records.
    #[must_use]
    pub fn clock(&self) -> Arc<VirtualClock> {
        Arc::clone(&self.clock)
    }

    /// Returns the current logical time.
    #[inline]
    #[must_use]
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// Schedules `work` to run at `now() + delay`.
    pub fn schedule(&self, delay: u64, work: Work) -> Result<CancelHandle, SchedulerError> {
        let now = self.now();
        let due = now
            .checked_add(delay)
            .ok_or(SchedulerError::TickOverflow { now, delta: delay })?;
        Ok(self.enqueue(due, work))
    }

    /// Schedules `work` to run at `due`.
    ///
    /// `due == now()` is accepted and queues the work for the current tick.
    pub fn schedule_at(&self, due: Tick, work: Work) -> Result<CancelHandle, SchedulerError> {
        let now = self.now();
        if due < now {
            return Err(SchedulerError::InvalidSchedule { due, now });
        }
        Ok(self.enqueue(due, work))
    }

    fn enqueue(&self, due: Tick, work: Work) -> CancelHandle {
        let seq = self.queue.lock().insert(due, work);
        trace!(
            event = "scheduler.action.schedule",
            scheduler = self.id,
            due = %due,
            seq = seq.value(),
            "action scheduled"
        );
        CancelHandle::new(self.id, due, seq)
    }

    /// Cancels a pending action.
    ///
    /// Returns false if the action already ran, was already cancelled, or was
    /// issued by another scheduler.
    pub fn cancel(&self, handle: &CancelHandle) -> bool {
        if !handle.issued_by(self.id) {
            return false;
        }
        let removed = self.queue.lock().remove(handle.due(), handle.seq());
        trace!(
            event = "scheduler.action.cancel",
            scheduler = self.id,
            due = %handle.due(),
            seq = handle.seq().value(),
            removed,
            "action cancelled"
        );
        removed
    }

    /// Advances logical time by `by` ticks, running everything that falls due.
    ///
    /// Returns the number of actions executed. On success `now()` equals the
    /// old time plus `by`, even when nothing ran. That holds only while the
    /// drain stays under the configured drain limit: a drain that hits it
    /// leaves `now()` on the tick where it stopped, short of the target, with
    /// the remaining work still queued.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::ReentrantAdvance`] when called while a drain is in
    ///   progress, including from scheduled work.
    /// - [`SchedulerError::InvalidAdvance`] when `by` is negative.
    /// - [`SchedulerError::TickOverflow`] when the target does not fit.
    /// - [`SchedulerError::DrainLimitExceeded`] when the drain ran the
    ///   configured maximum number of actions with more still due.
    ///
    /// The first three leave the scheduler untouched.
    pub fn advance(&self, by: i64) -> Result<usize, SchedulerError> {
        let guard = self.enter_drain()?;
        let now = self.now();
        let delta = u64::try_from(by).map_err(|_| SchedulerError::InvalidAdvance { by })?;
        let target = now
            .checked_add(delta)
            .ok_or(SchedulerError::TickOverflow { now, delta })?;
        let executed = self.drain(Some(target), &guard)?;
        self.clock.advance_to(target);
        Ok(executed)
    }

    /// Advances logical time to `target`, running everything that falls due.
    ///
    /// A target equal to `now()` drains work queued for the current tick.
    ///
    /// # Errors
    ///
    /// As [`advance`](Self::advance). A target in the past reports
    /// [`SchedulerError::InvalidAdvance`] with the negative distance.
    pub fn advance_to(&self, target: Tick) -> Result<usize, SchedulerError> {
        let guard = self.enter_drain()?;
        let now = self.now();
        if target < now {
            let behind = now.ticks_since(target);
            let by = i64::try_from(behind).map_or(i64::MIN, |ticks| -ticks);
            return Err(SchedulerError::InvalidAdvance { by });
        }
        let executed = self.drain(Some(target), &guard)?;
        self.clock.advance_to(target);
        Ok(executed)
    }

    /// Runs pending work until the queue is empty.
    ///
    /// The clock jumps to each action's due tick in turn and is left at the
    /// due tick of the last action run. Returns the number of actions run.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::ReentrantAdvance`] and
    /// [`SchedulerError::DrainLimitExceeded`] as for
    /// [`advance`](Self::advance). The limit is what stops a producer that
    /// reschedules itself forever.
    pub fn run_until_idle(&self) -> Result<usize, SchedulerError> {
        let guard = self.enter_drain()?;
        self.drain(None, &guard)
    }

    /// Returns the number of pending actions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns true if no actions are pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Returns the earliest due tick among pending actions.
    #[must_use]
    pub fn next_due(&self) -> Option<Tick> {
        self.queue.lock().next_due()
    }

    /// Drops all pending actions without running them.
    ///
    /// Returns how many were dropped. The clock is not changed.
    pub fn clear(&self) -> usize {
        let mut queue = self.queue.lock();
        let dropped = queue.len();
        queue.clear();
        drop(queue);
        debug!(scheduler = self.id, dropped, "pending actions cleared");
        dropped
    }

    fn enter_drain(&self) -> Result<DrainGuard<'_>, SchedulerError> {
        DrainGuard::acquire(&self.draining)
            .ok_or_else(|| SchedulerError::ReentrantAdvance { now: self.now() })
    }

    /// Pops the next action due at or before `target` (any action if `None`).
    ///
    /// Fails if the drain limit is reached while such an action exists.
    fn next_action(
        &self,
        target: Option<Tick>,
        executed: usize,
    ) -> Result<Option<ScheduledAction>, SchedulerError> {
        let mut queue = self.queue.lock();
        if let Some(limit) = self.config.drain_limit {
            if u64::try_from(executed).unwrap_or(u64::MAX) >= limit {
                let more_due = queue
                    .next_due()
                    .is_some_and(|due| target.is_none_or(|target| due <= target));
                drop(queue);
                if more_due {
                    return Err(SchedulerError::DrainLimitExceeded {
                        limit,
                        at: self.now(),
                    });
                }
                return Ok(None);
            }
        }
        Ok(match target {
            Some(target) => queue.pop_due(target),
            None => queue.pop_first(),
        })
    }

    fn drain(&self, target: Option<Tick>, _guard: &DrainGuard<'_>) -> Result<usize, SchedulerError> {
        debug!(
            event = "scheduler.advance.begin",
            scheduler = self.id,
            from = %self.now(),
            target = ?target,
            pending = self.pending_count(),
            "drain begin"
        );

        let mut executed = 0usize;
        let outcome = loop {
            let action = match self.next_action(target, executed) {
                Ok(Some(action)) => action,
                Ok(None) => break Ok(executed),
                Err(err) => break Err(err),
            };
            self.clock.advance_to(action.due);
            trace!(
                event = "scheduler.action.run",
                scheduler = self.id,
                due = %action.due,
                seq = action.seq.value(),
                "running action"
            );
            action.run();
            executed += 1;
        };

        debug!(
            event = "scheduler.advance.end",
            scheduler = self.id,
            now = %self.now(),
            executed,
            pending = self.pending_count(),
            ok = outcome.is_ok(),
            "drain end"
        );
        outcome
    }
}

impl Default for VirtualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for VirtualScheduler {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    fn explode() {
        panic!("boom");
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn push(log: &Log, entry: &str) -> Work {
        let log = Arc::clone(log);
        let entry = entry.to_string();
        Box::new(move || log.lock().push(entry))
    }

    fn stamped(log: &Log, scheduler: &Arc<VirtualScheduler>, entry: &str) -> Work {
        let log = Arc::clone(log);
        let scheduler = Arc::clone(scheduler);
        let entry = entry.to_string();
        Box::new(move || log.lock().push(format!("{entry}@{}", scheduler.now())))
    }

    #[test]
    fn new_scheduler_is_idle_at_zero() {
        init_test("new_scheduler_is_idle_at_zero");
        let scheduler = VirtualScheduler::new();
        crate::assert_with_log!(scheduler.now() == Tick::ZERO, "starts at zero", Tick::ZERO, scheduler.now());
        crate::assert_with_log!(scheduler.is_idle(), "idle", true, scheduler.is_idle());
        crate::assert_with_log!(scheduler.next_due().is_none(), "no next due", "None", scheduler.next_due());
        crate::test_complete!("new_scheduler_is_idle_at_zero");
    }

    #[test]
    fn schedule_runs_only_when_due() {
        init_test("schedule_runs_only_when_due");
        let scheduler = Arc::new(VirtualScheduler::new());
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        scheduler.schedule(5, stamped(&log, &scheduler, "w")).unwrap();

        let ran = scheduler.advance(4).unwrap();
        crate::assert_with_log!(ran == 0, "nothing due at 4", 0usize, ran);
        crate::assert_with_log!(log.lock().is_empty(), "not run yet", "[]", log.lock().clone());

        let ran = scheduler.advance(1).unwrap();
        crate::assert_with_log!(ran == 1, "runs at 5", 1usize, ran);
        let seen = log.lock().clone();
        crate::assert_with_log!(seen == vec!["w@t5"], "observed due tick", vec!["w@t5"], seen);
        crate::test_complete!("schedule_runs_only_when_due");
    }

    #[test]
    fn clock_is_set_to_each_due_tick() {
        init_test("clock_is_set_to_each_due_tick");
        let scheduler = Arc::new(VirtualScheduler::new());
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        scheduler.schedule(3, stamped(&log, &scheduler, "c")).unwrap();
        scheduler.schedule(1, stamped(&log, &scheduler, "a")).unwrap();
        scheduler.schedule(2, stamped(&log, &scheduler, "b")).unwrap();

        let ran = scheduler.advance(10).unwrap();
        crate::assert_with_log!(ran == 3, "all ran", 3usize, ran);
        let seen = log.lock().clone();
        let expected = vec!["a@t1", "b@t2", "c@t3"];
        crate::assert_with_log!(seen == expected, "due order", expected, seen);
        let now = scheduler.now();
        crate::assert_with_log!(now == Tick::new(10), "ends at target", Tick::new(10), now);
        crate::test_complete!("clock_is_set_to_each_due_tick");
    }

    #[test]
    fn same_tick_is_fifo() {
        init_test("same_tick_is_fifo");
        let scheduler = VirtualScheduler::new();
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        for name in ["w1", "w2", "w3"] {
            scheduler.schedule(0, push(&log, name)).unwrap();
        }
        scheduler.advance(0).unwrap();
        let seen = log.lock().clone();
        crate::assert_with_log!(seen == vec!["w1", "w2", "w3"], "fifo", vec!["w1", "w2", "w3"], seen);
        crate::test_complete!("same_tick_is_fifo");
    }

    #[test]
    fn zero_delay_never_runs_inline() {
        init_test("zero_delay_never_runs_inline");
        let scheduler = VirtualScheduler::new();
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        scheduler.schedule(0, push(&log, "x")).unwrap();
        crate::assert_with_log!(log.lock().is_empty(), "not inline", "[]", log.lock().clone());
        crate::assert_with_log!(scheduler.pending_count() == 1, "queued", 1usize, scheduler.pending_count());
        crate::test_complete!("zero_delay_never_runs_inline");
    }

    #[test]
    fn work_scheduled_during_drain_runs_in_same_drain() {
        init_test("work_scheduled_during_drain_runs_in_same_drain");
        let scheduler = Arc::new(VirtualScheduler::new());
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let inner_log = Arc::clone(&log);
        let inner_scheduler = Arc::clone(&scheduler);
        scheduler
            .schedule(
                1,
                Box::new(move || {
                    inner_log.lock().push("outer".to_string());
                    let next = stamped(&inner_log, &inner_scheduler, "hop");
                    inner_scheduler.schedule(1, next).unwrap();
                }),
            )
            .unwrap();
        scheduler.schedule(1, push(&log, "sibling")).unwrap();

        let ran = scheduler.advance(2).unwrap();
        crate::assert_with_log!(ran == 3, "three actions", 3usize, ran);
        let seen = log.lock().clone();
        let expected = vec!["outer", "sibling", "hop@t2"];
        crate::assert_with_log!(seen == expected, "nested order", expected, seen);
        crate::test_complete!("work_scheduled_during_drain_runs_in_same_drain");
    }

    #[test]
    fn work_beyond_target_waits() {
        init_test("work_beyond_target_waits");
        let scheduler = Arc::new(VirtualScheduler::new());
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let inner_log = Arc::clone(&log);
        let inner_scheduler = Arc::clone(&scheduler);
        scheduler
            .schedule(
                1,
                Box::new(move || {
                    let next = push(&inner_log, "late");
                    inner_scheduler.schedule(5, next).unwrap();
                }),
            )
            .unwrap();

        scheduler.advance(2).unwrap();
        crate::assert_with_log!(log.lock().is_empty(), "late waits", "[]", log.lock().clone());
        let next = scheduler.next_due();
        crate::assert_with_log!(next == Some(Tick::new(6)), "next due", Some(Tick::new(6)), next);
        crate::test_complete!("work_beyond_target_waits");
    }

    #[test]
    fn negative_advance_rejected() {
        init_test("negative_advance_rejected");
        let scheduler = VirtualScheduler::new();
        scheduler.advance(3).unwrap();
        let err = scheduler.advance(-1).unwrap_err();
        crate::assert_with_log!(
            err == SchedulerError::InvalidAdvance { by: -1 },
            "invalid advance",
            SchedulerError::InvalidAdvance { by: -1 },
            err
        );
        let now = scheduler.now();
        crate::assert_with_log!(now == Tick::new(3), "clock unchanged", Tick::new(3), now);
        crate::test_complete!("negative_advance_rejected");
    }

    #[test]
    fn advance_to_past_reports_distance() {
        init_test("advance_to_past_reports_distance");
        let scheduler = VirtualScheduler::new();
        scheduler.advance_to(Tick::new(10)).unwrap();
        let err = scheduler.advance_to(Tick::new(4)).unwrap_err();
        crate::assert_with_log!(
            err == SchedulerError::InvalidAdvance { by: -6 },
            "negative distance",
            SchedulerError::InvalidAdvance { by: -6 },
            err
        );
        let ran = scheduler.advance_to(Tick::new(10)).unwrap();
        crate::assert_with_log!(ran == 0, "advance_to now is a no-op", 0usize, ran);
        crate::test_complete!("advance_to_past_reports_distance");
    }

    #[test]
    fn schedule_at_past_rejected() {
        init_test("schedule_at_past_rejected");
        let scheduler = VirtualScheduler::new();
        scheduler.advance(5).unwrap();
        let err = scheduler.schedule_at(Tick::new(4), Box::new(|| {})).unwrap_err();
        let expected = SchedulerError::InvalidSchedule {
            due: Tick::new(4),
            now: Tick::new(5),
        };
        crate::assert_with_log!(err == expected, "past due rejected", expected, err);
        crate::assert_with_log!(scheduler.is_idle(), "nothing queued", true, scheduler.is_idle());

        scheduler.schedule_at(Tick::new(5), Box::new(|| {})).unwrap();
        let ran = scheduler.advance(0).unwrap();
        crate::assert_with_log!(ran == 1, "due now runs on advance(0)", 1usize, ran);
        crate::test_complete!("schedule_at_past_rejected");
    }

    #[test]
    fn overflow_rejected() {
        init_test("overflow_rejected");
        let scheduler = VirtualScheduler::with_config(
            SchedulerConfig::new().starting_at(Tick::new(u64::MAX - 1)),
        )
        .unwrap();
        let err = scheduler.schedule(2, Box::new(|| {})).unwrap_err();
        crate::assert_with_log!(
            matches!(err, SchedulerError::TickOverflow { delta: 2, .. }),
            "schedule overflow",
            "TickOverflow",
            err
        );
        let err = scheduler.advance(2).unwrap_err();
        crate::assert_with_log!(
            matches!(err, SchedulerError::TickOverflow { delta: 2, .. }),
            "advance overflow",
            "TickOverflow",
            err
        );
        let now = scheduler.now();
        crate::assert_with_log!(now == Tick::new(u64::MAX - 1), "clock unchanged", u64::MAX - 1, now);
        crate::test_complete!("overflow_rejected");
    }

    #[test]
    fn cancel_prevents_execution() {
        init_test("cancel_prevents_execution");
        let scheduler = VirtualScheduler::new();
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let handle = scheduler.schedule(2, push(&log, "cancelled")).unwrap();
        scheduler.schedule(2, push(&log, "kept")).unwrap();

        let first = scheduler.cancel(&handle);
        crate::assert_with_log!(first, "first cancel", true, first);
        let second = scheduler.cancel(&handle);
        crate::assert_with_log!(!second, "second cancel", false, second);
        scheduler.advance(2).unwrap();
        let seen = log.lock().clone();
        crate::assert_with_log!(seen == vec!["kept"], "only kept ran", vec!["kept"], seen);
        crate::test_complete!("cancel_prevents_execution");
    }

    #[test]
    fn cancel_after_run_returns_false() {
        init_test("cancel_after_run_returns_false");
        let scheduler = VirtualScheduler::new();
        let handle = scheduler.schedule(1, Box::new(|| {})).unwrap();
        scheduler.advance(1).unwrap();
        let cancelled = scheduler.cancel(&handle);
        crate::assert_with_log!(!cancelled, "already ran", false, cancelled);
        crate::test_complete!("cancel_after_run_returns_false");
    }

    #[test]
    fn foreign_handle_is_ignored() {
        init_test("foreign_handle_is_ignored");
        let a = VirtualScheduler::new();
        let b = VirtualScheduler::new();
        let handle = a.schedule(1, Box::new(|| {})).unwrap();
        b.schedule(1, Box::new(|| {})).unwrap();
        let cancelled = b.cancel(&handle);
        crate::assert_with_log!(!cancelled, "foreign cancel", false, cancelled);
        crate::assert_with_log!(b.pending_count() == 1, "b untouched", 1usize, b.pending_count());
        crate::assert_with_log!(a.pending_count() == 1, "a untouched", 1usize, a.pending_count());
        crate::test_complete!("foreign_handle_is_ignored");
    }

    #[test]
    fn work_can_cancel_later_work() {
        init_test("work_can_cancel_later_work");
        let scheduler = Arc::new(VirtualScheduler::new());
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let victim = scheduler.schedule(2, push(&log, "victim")).unwrap();

        let inner = Arc::clone(&scheduler);
        let outcome = Arc::new(AtomicBool::new(false));
        let seen_outcome = Arc::clone(&outcome);
        scheduler
            .schedule(
                1,
                Box::new(move || {
                    seen_outcome.store(inner.cancel(&victim), Ordering::SeqCst);
                }),
            )
            .unwrap();

        scheduler.advance(5).unwrap();
        let cancelled = outcome.load(Ordering::SeqCst);
        crate::assert_with_log!(cancelled, "cancelled from work", true, cancelled);
        crate::assert_with_log!(log.lock().is_empty(), "victim never ran", "[]", log.lock().clone());
        crate::test_complete!("work_can_cancel_later_work");
    }

    #[test]
    fn reentrant_advance_rejected() {
        init_test("reentrant_advance_rejected");
        let scheduler = Arc::new(VirtualScheduler::new());
        let nested: Arc<Mutex<Option<Result<usize, SchedulerError>>>> = Arc::new(Mutex::new(None));

        let inner = Arc::clone(&scheduler);
        let slot = Arc::clone(&nested);
        scheduler
            .schedule(1, Box::new(move || *slot.lock() = Some(inner.advance(1))))
            .unwrap();

        let ran = scheduler.advance(2).unwrap();
        crate::assert_with_log!(ran == 1, "outer advance ran", 1usize, ran);
        let nested = nested.lock().clone();
        let expected = Some(Err(SchedulerError::ReentrantAdvance { now: Tick::new(1) }));
        crate::assert_with_log!(nested == expected, "nested advance error", expected, nested);

        // The guard is released after the outer drain.
        let again = scheduler.advance(1);
        crate::assert_with_log!(again.is_ok(), "advance after drain", "Ok", again);
        crate::test_complete!("reentrant_advance_rejected");
    }

    #[test]
    fn drain_limit_stops_runaway_work() {
        init_test("drain_limit_stops_runaway_work");
        let scheduler = Arc::new(
            VirtualScheduler::with_config(SchedulerConfig::new().with_drain_limit(Some(10))).unwrap(),
        );
        let runs = Arc::new(AtomicUsize::new(0));

        fn respawn(scheduler: Arc<VirtualScheduler>, runs: Arc<AtomicUsize>) -> Work {
            Box::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
                let next = respawn(Arc::clone(&scheduler), Arc::clone(&runs));
                scheduler.schedule(0, next).unwrap();
            })
        }
        scheduler
            .schedule(1, respawn(Arc::clone(&scheduler), Arc::clone(&runs)))
            .unwrap();

        let err = scheduler.advance(3).unwrap_err();
        let expected = SchedulerError::DrainLimitExceeded {
            limit: 10,
            at: Tick::new(1),
        };
        crate::assert_with_log!(err == expected, "limit reached", expected, err);
        let count = runs.load(Ordering::SeqCst);
        crate::assert_with_log!(count == 10, "ran limit actions", 10usize, count);
        let now = scheduler.now();
        crate::assert_with_log!(now == Tick::new(1), "clock stays where drain stopped", Tick::new(1), now);
        crate::assert_with_log!(scheduler.pending_count() == 1, "remaining work kept", 1usize, scheduler.pending_count());
        crate::test_complete!("drain_limit_stops_runaway_work");
    }

    #[test]
    fn drain_limit_exact_fit_succeeds() {
        init_test("drain_limit_exact_fit_succeeds");
        let scheduler =
            VirtualScheduler::with_config(SchedulerConfig::new().with_drain_limit(Some(3))).unwrap();
        for _ in 0..3 {
            scheduler.schedule(1, Box::new(|| {})).unwrap();
        }
        scheduler.schedule(9, Box::new(|| {})).unwrap();
        let ran = scheduler.advance(2).unwrap();
        crate::assert_with_log!(ran == 3, "exactly the limit", 3usize, ran);
        crate::assert_with_log!(scheduler.now() == Tick::new(2), "reached target", Tick::new(2), scheduler.now());
        crate::test_complete!("drain_limit_exact_fit_succeeds");
    }

    #[test]
    fn finite_work_over_limit_leaves_clock_short() {
        init_test("finite_work_over_limit_leaves_clock_short");
        let scheduler =
            VirtualScheduler::with_config(SchedulerConfig::new().with_drain_limit(Some(3))).unwrap();
        for _ in 0..4 {
            scheduler.schedule(1, Box::new(|| {})).unwrap();
        }

        let err = scheduler.advance(5).unwrap_err();
        let expected = SchedulerError::DrainLimitExceeded {
            limit: 3,
            at: Tick::new(1),
        };
        crate::assert_with_log!(err == expected, "limit reached", expected, err);
        let now = scheduler.now();
        crate::assert_with_log!(now == Tick::new(1), "short of target", Tick::new(1), now);

        let ran = scheduler.advance(4).unwrap();
        crate::assert_with_log!(ran == 1, "leftover runs", 1usize, ran);
        let now = scheduler.now();
        crate::assert_with_log!(now == Tick::new(5), "target reached", Tick::new(5), now);

        let unlimited =
            VirtualScheduler::with_config(SchedulerConfig::new().with_drain_limit(None)).unwrap();
        for _ in 0..4 {
            unlimited.schedule(1, Box::new(|| {})).unwrap();
        }
        let ran = unlimited.advance(5).unwrap();
        crate::assert_with_log!(ran == 4, "no limit", 4usize, ran);
        let now = unlimited.now();
        crate::assert_with_log!(now == Tick::new(5), "exact target", Tick::new(5), now);
        crate::test_complete!("finite_work_over_limit_leaves_clock_short");
    }

    #[test]
    fn run_until_idle_leaves_clock_at_last_due() {
        init_test("run_until_idle_leaves_clock_at_last_due");
        let scheduler = Arc::new(VirtualScheduler::new());
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        scheduler.schedule(7, stamped(&log, &scheduler, "b")).unwrap();
        scheduler.schedule(2, stamped(&log, &scheduler, "a")).unwrap();

        let ran = scheduler.run_until_idle().unwrap();
        crate::assert_with_log!(ran == 2, "ran all", 2usize, ran);
        let seen = log.lock().clone();
        crate::assert_with_log!(seen == vec!["a@t2", "b@t7"], "order", vec!["a@t2", "b@t7"], seen);
        crate::assert_with_log!(scheduler.now() == Tick::new(7), "last due", Tick::new(7), scheduler.now());

        let ran = scheduler.run_until_idle().unwrap();
        crate::assert_with_log!(ran == 0, "idle", 0usize, ran);
        crate::test_complete!("run_until_idle_leaves_clock_at_last_due");
    }

    #[test]
    fn clear_drops_pending_work() {
        init_test("clear_drops_pending_work");
        let scheduler = VirtualScheduler::new();
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        scheduler.schedule(1, push(&log, "a")).unwrap();
        scheduler.schedule(2, push(&log, "b")).unwrap();
        let dropped = scheduler.clear();
        crate::assert_with_log!(dropped == 2, "dropped", 2usize, dropped);
        scheduler.advance(5).unwrap();
        crate::assert_with_log!(log.lock().is_empty(), "nothing ran", "[]", log.lock().clone());
        crate::test_complete!("clear_drops_pending_work");
    }

    #[test]
    fn panicking_work_releases_drain_guard() {
        init_test("panicking_work_releases_drain_guard");
        let scheduler = VirtualScheduler::new();
        scheduler.schedule(1, Box::new(explode)).unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| scheduler.advance(1)));
        crate::assert_with_log!(result.is_err(), "panic propagated", true, result.is_err());
        let again = scheduler.advance(1);
        crate::assert_with_log!(again.is_ok(), "advance usable after panic", "Ok", again);
        crate::test_complete!("panicking_work_releases_drain_guard");
    }

    #[test]
    fn zero_drain_limit_config_rejected() {
        init_test("zero_drain_limit_config_rejected");
        let result = VirtualScheduler::with_config(SchedulerConfig::new().with_drain_limit(Some(0)));
        crate::assert_with_log!(
            matches!(result, Err(SchedulerError::InvalidConfig { .. })),
            "zero limit",
            "InvalidConfig",
            result.is_err()
        );
        crate::test_complete!("zero_drain_limit_config_rejected");
    }
}
