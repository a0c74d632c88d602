//! # dot8021x-scheduler
//!
//! A deadline-ordered timer scheduler: `call_later(delay, job)` registers a closure to run no
//! earlier than `now + delay`; `run()` drives a single logical clock that fires due jobs in
//! non-decreasing deadline order, ties broken by insertion order. A job may itself schedule
//! further jobs, including rescheduling itself, from within its own callback.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct ScheduledJob {
    deadline: Instant,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    job: Job,
}

impl PartialEq for ScheduledJob {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for ScheduledJob {}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest deadline sorts first, and break
        // ties by insertion order (lower seq first).
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A handle to a scheduled job. Cancellation is idempotent: cancelling an already-fired or
/// already-cancelled job is a no-op.
#[derive(Clone)]
pub struct JobHandle {
    cancelled: Arc<AtomicBool>,
}

impl JobHandle {
    /// Cancels the job. A cancelled job never fires, even if its deadline has already passed
    /// by the time `run()` reaches it.
    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    /// True if the job has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }
}

struct State {
    heap: BinaryHeap<ScheduledJob>,
    next_seq: AtomicU64,
    running: AtomicBool,
}

/// Deadline-ordered, single-logical-clock job scheduler.
///
/// Cloning a `TimerScheduler` shares the same underlying heap; every clone schedules onto and
/// drains from the same timeline, matching the single-dispatcher-owns-one-clock model.
#[derive(Clone)]
pub struct TimerScheduler {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                heap: BinaryHeap::new(),
                next_seq: AtomicU64::new(0),
                running: AtomicBool::new(true),
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Schedules `job` to run no earlier than `now + delay`. Returns a handle that can cancel
    /// it before it fires.
    pub fn call_later<F>(&self, delay: Duration, job: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let deadline = Instant::now() + delay;

        let mut state = self.state.lock().expect("scheduler mutex poisoned");
        let seq = state.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        state.heap.push(ScheduledJob {
            deadline,
            seq,
            cancelled: cancelled.clone(),
            job: Box::new(job),
        });
        drop(state);
        self.notify.notify_one();

        JobHandle { cancelled }
    }

    /// Signals [`TimerScheduler::run`] to return after firing any jobs already due. Pending
    /// jobs not yet due are left unfired (the dispatcher drops them on shutdown per §5).
    pub fn stop(&self) {
        self.state
            .lock()
            .expect("scheduler mutex poisoned")
            .running
            .store(false, AtomicOrdering::SeqCst);
        self.notify.notify_one();
    }

    /// Runs the scheduler's event loop: sleeps until the next deadline (or indefinitely if
    /// idle), then fires every job whose deadline has passed, in non-decreasing deadline
    /// order. A panic inside a job is caught, logged, and does not stop the loop.
    pub async fn run(&self) {
        loop {
            let next_deadline = {
                let state = self.state.lock().expect("scheduler mutex poisoned");
                if !state.running.load(AtomicOrdering::SeqCst) && state.heap.is_empty() {
                    return;
                }
                state.heap.peek().map(|j| j.deadline)
            };

            match next_deadline {
                Some(deadline) => {
                    tokio::select! {
                        () = tokio::time::sleep_until(deadline) => {}
                        () = self.notify.notified() => continue,
                    }
                }
                None => {
                    let stopped = {
                        let state = self.state.lock().expect("scheduler mutex poisoned");
                        !state.running.load(AtomicOrdering::SeqCst)
                    };
                    if stopped {
                        return;
                    }
                    self.notify.notified().await;
                    continue;
                }
            }

            self.fire_due_jobs();
        }
    }

    fn fire_due_jobs(&self) {
        let now = Instant::now();
        let due = {
            let mut state = self.state.lock().expect("scheduler mutex poisoned");
            let mut due = Vec::new();
            while let Some(top) = state.heap.peek() {
                if top.deadline > now {
                    break;
                }
                due.push(state.heap.pop().expect("just peeked"));
            }
            due
        };

        for scheduled in due {
            if scheduled.cancelled.load(AtomicOrdering::SeqCst) {
                continue;
            }
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(scheduled.job)) {
                tracing::error!(?panic, "scheduled job panicked; swallowed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test(start_paused = true)]
    async fn fires_jobs_in_non_decreasing_deadline_order() {
        let scheduler = TimerScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let deadlines_ms = [50, 10, 30, 10, 0];
        for (i, ms) in deadlines_ms.iter().enumerate() {
            let order = order.clone();
            let ms = *ms;
            scheduler.call_later(Duration::from_millis(ms), move || {
                order.lock().unwrap().push((ms, i));
            });
        }

        let runner = scheduler.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        scheduler.stop();
        handle.await.unwrap();

        let fired = order.lock().unwrap().clone();
        let mut sorted = fired.clone();
        sorted.sort_by_key(|(ms, i)| (*ms, *i));
        assert_eq!(fired, sorted);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_job_never_fires() {
        let scheduler = TimerScheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        let fired_clone = fired.clone();

        let handle = scheduler.call_later(Duration::from_millis(10), move || {
            fired_clone.fetch_add(1, AtomicOrdering::SeqCst);
        });
        handle.cancel();
        assert!(handle.is_cancelled());

        let runner = scheduler.clone();
        let task = tokio::spawn(async move { runner.run().await });
        tokio::time::advance(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        scheduler.stop();
        task.await.unwrap();

        assert_eq!(fired.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn double_cancel_is_a_no_op() {
        let scheduler = TimerScheduler::new();
        let handle = scheduler.call_later(Duration::from_secs(1), || {});
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn a_job_may_reschedule_itself() {
        let scheduler = TimerScheduler::new();
        let count = Arc::new(AtomicU32::new(0));

        fn schedule_tick(scheduler: TimerScheduler, count: Arc<AtomicU32>) {
            let inner_scheduler = scheduler.clone();
            let inner_count = count.clone();
            scheduler.call_later(Duration::from_millis(10), move || {
                let n = inner_count.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                if n < 3 {
                    schedule_tick(inner_scheduler, inner_count);
                }
            });
        }
        schedule_tick(scheduler.clone(), count.clone());

        let runner = scheduler.clone();
        let task = tokio::spawn(async move { runner.run().await });
        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(10)).await;
            tokio::task::yield_now().await;
        }
        scheduler.stop();
        task.await.unwrap();

        assert_eq!(count.load(AtomicOrdering::SeqCst), 3);
    }
}
