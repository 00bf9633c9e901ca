//! Relay retry schedule and the timer seam it runs on.
//!
//! A frame's listener may attach after the first AUTH is posted, and that is
//! not observable from the host. The relay therefore re-sends on a fixed
//! schedule described by a [`RetryPolicy`], with timers provided by a
//! [`Scheduler`] so the schedule can be driven without real time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::AbortHandle;

/// Attempt offsets measured from the start of a relay cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    offsets: Vec<Duration>,
}

impl RetryPolicy {
    /// Build from explicit offsets. Offsets are sorted; an empty list means a
    /// single immediate attempt.
    pub fn from_offsets(mut offsets: Vec<Duration>) -> Self {
        if offsets.is_empty() {
            offsets.push(Duration::ZERO);
        }
        offsets.sort();
        Self { offsets }
    }

    /// Immediate attempt followed by `max_attempts - 1` retries whose gaps
    /// start at `initial` and grow by `factor`. The schedule ends early once
    /// an offset would no longer fit in a `Duration`.
    pub fn backoff(initial: Duration, factor: u32, max_attempts: usize) -> Self {
        let mut offsets = vec![Duration::ZERO];
        let mut gap = initial;
        let mut at = Duration::ZERO;
        for _ in 1..max_attempts.max(1) {
            let Some(next) = at.checked_add(gap) else {
                break;
            };
            at = next;
            offsets.push(at);
            let Some(wider) = gap.checked_mul(factor.max(1)) else {
                break;
            };
            gap = wider;
        }
        Self { offsets }
    }

    pub fn offsets(&self) -> &[Duration] {
        &self.offsets
    }

    pub fn max_attempts(&self) -> usize {
        self.offsets.len()
    }

    /// Time from cycle start to the last attempt.
    pub fn window(&self) -> Duration {
        self.offsets.last().copied().unwrap_or_default()
    }
}

impl Default for RetryPolicy {
    /// Immediately, then after one and two seconds.
    fn default() -> Self {
        Self::from_offsets(vec![
            Duration::ZERO,
            Duration::from_secs(1),
            Duration::from_secs(2),
        ])
    }
}

pub type ScheduledTask = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay` unless the returned handle is cancelled.
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> TaskHandle;
}

/// Cancellation handle for a scheduled task. Cancelling is idempotent and
/// safe after the task already ran.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl TaskHandle {
    fn new(cancelled: Arc<AtomicBool>, abort: Option<AbortHandle>) -> Self {
        Self { cancelled, abort }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Real timers on the ambient tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> TaskHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.load(Ordering::SeqCst) {
                task();
            }
        });
        TaskHandle::new(cancelled, Some(join.abort_handle()))
    }
}

struct PendingTask {
    due: Duration,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    task: ScheduledTask,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    queue: Vec<PendingTask>,
}

/// Virtual clock. Nothing runs until [`ManualScheduler::advance`] moves time
/// past a task's due point; tasks run in due order, ties in schedule order.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn now(&self) -> Duration {
        self.state().now
    }

    /// Number of scheduled tasks that are neither run nor cancelled.
    pub fn pending(&self) -> usize {
        self.state()
            .queue
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Advance the clock and run every task that became due, returning how
    /// many ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = {
            let mut state = self.state();
            state.now += by;
            state.now
        };

        let mut ran = 0;
        loop {
            // Pop under the lock, run outside it: tasks may schedule more work.
            let next = {
                let mut state = self.state();
                state.queue.retain(|t| !t.cancelled.load(Ordering::SeqCst));
                let idx = state
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.seq))
                    .map(|(i, _)| i);
                idx.map(|i| state.queue.remove(i))
            };
            match next {
                Some(pending) => {
                    (pending.task)();
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> TaskHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut state = self.state();
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.now + delay;
        state.queue.push(PendingTask {
            due,
            seq,
            cancelled: cancelled.clone(),
            task,
        });
        TaskHandle::new(cancelled, None)
    }
}
