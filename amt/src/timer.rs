//! A small task timer backing the retransmission and discovery-retry
//! schedules: one worker thread draining a deadline-ordered queue.
//!
//! The worker never holds the schedule lock while a task runs, so a
//! slow task cannot block new schedule or cancel calls.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Cancels the scheduled task it was returned for.  Cancellation is
/// idempotent; a fixed-rate task stops rescheduling after the first
/// `cancel()` call.
#[derive(Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    fn new() -> TimerHandle {
        TimerHandle {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }
}

struct ScheduledTask {
    deadline: Instant,
    sequence: u64,
    period: Option<Duration>,
    handle: TimerHandle,
    task: Box<dyn FnMut() + Send>,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &ScheduledTask) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &ScheduledTask) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    // Reversed so the binary heap pops the earliest deadline first.
    fn cmp(&self, other: &ScheduledTask) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct TimerState {
    queue: BinaryHeap<ScheduledTask>,
    next_sequence: u64,
    shutdown: bool,
}

struct TimerShared {
    state: Mutex<TimerState>,
    wakeup: Condvar,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|error| error.into_inner())
    }
}

/// A timer driving scheduled tasks on a dedicated worker thread.
/// Dropping the timer shuts the worker down; tasks still queued at that
/// point never run.
pub struct TaskTimer {
    shared: Arc<TimerShared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl TaskTimer {
    pub fn new() -> TaskTimer {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                queue: BinaryHeap::new(),
                next_sequence: 0,
                shutdown: false,
            }),
            wakeup: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("task-timer".to_string())
            .spawn(move || run_worker(worker_shared));

        TaskTimer {
            shared,
            worker: worker.ok(),
        }
    }

    /// Schedules `task` to run once after `delay`.
    pub fn schedule(&self, delay: Duration, task: Box<dyn FnMut() + Send>) -> TimerHandle {
        self.submit(delay, None, task)
    }

    /// Schedules `task` to run after `delay` and then repeatedly every
    /// `period` until its handle is cancelled.
    pub fn schedule_at_fixed_rate(
        &self,
        delay: Duration,
        period: Duration,
        task: Box<dyn FnMut() + Send>,
    ) -> TimerHandle {
        self.submit(delay, Some(period), task)
    }

    fn submit(
        &self,
        delay: Duration,
        period: Option<Duration>,
        task: Box<dyn FnMut() + Send>,
    ) -> TimerHandle {
        let handle = TimerHandle::new();

        let mut state = self.shared.lock();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.queue.push(ScheduledTask {
            deadline: Instant::now() + delay,
            sequence,
            period,
            handle: handle.clone(),
            task,
        });
        drop(state);

        self.shared.wakeup.notify_one();
        handle
    }
}

impl Default for TaskTimer {
    fn default() -> TaskTimer {
        TaskTimer::new()
    }
}

impl Drop for TaskTimer {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.wakeup.notify_one();

        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(shared: Arc<TimerShared>) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            return;
        }

        let now = Instant::now();
        let next_deadline = match state.queue.peek() {
            Some(entry) => entry.deadline,
            None => {
                state = shared
                    .wakeup
                    .wait(state)
                    .unwrap_or_else(|error| error.into_inner());
                continue;
            }
        };

        if next_deadline > now {
            let (guard, _) = shared
                .wakeup
                .wait_timeout(state, next_deadline - now)
                .unwrap_or_else(|error| error.into_inner());
            state = guard;
            continue;
        }

        let mut entry = match state.queue.pop() {
            Some(entry) => entry,
            None => continue,
        };
        drop(state);

        if !entry.handle.is_cancelled() {
            (entry.task)();

            if let Some(period) = entry.period {
                if !entry.handle.is_cancelled() {
                    entry.deadline = Instant::now() + period;
                    let mut requeue = shared.lock();
                    requeue.queue.push(entry);
                    drop(requeue);
                }
            }
        }

        state = shared.lock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
    use std::sync::Arc;

    #[test]
    fn one_shot_task_runs_once() {
        let timer = TaskTimer::new();
        let count = Arc::new(AtomicU32::new(0));

        let task_count = count.clone();
        timer.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                task_count.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );

        thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn fixed_rate_task_repeats_until_cancelled() {
        let timer = TaskTimer::new();
        let count = Arc::new(AtomicU32::new(0));

        let task_count = count.clone();
        let handle = timer.schedule_at_fixed_rate(
            Duration::from_millis(1),
            Duration::from_millis(5),
            Box::new(move || {
                task_count.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );

        thread::sleep(Duration::from_millis(60));
        handle.cancel();
        let after_cancel = count.load(AtomicOrdering::SeqCst);
        assert!(after_cancel >= 2, "expected repeats, saw {}", after_cancel);

        thread::sleep(Duration::from_millis(40));
        let final_count = count.load(AtomicOrdering::SeqCst);
        assert!(
            final_count <= after_cancel + 1,
            "task kept running after cancellation"
        );
    }

    #[test]
    fn cancelled_task_never_runs() {
        let timer = TaskTimer::new();
        let count = Arc::new(AtomicU32::new(0));

        let task_count = count.clone();
        let handle = timer.schedule(
            Duration::from_millis(50),
            Box::new(move || {
                task_count.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );
        handle.cancel();
        handle.cancel(); // idempotent

        thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn earlier_deadlines_run_first() {
        let timer = TaskTimer::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (delay, label) in [(40_u64, "late"), (10, "early"), (25, "middle")] {
            let task_order = order.clone();
            timer.schedule(
                Duration::from_millis(delay),
                Box::new(move || {
                    task_order.lock().unwrap().push(label);
                }),
            );
        }

        thread::sleep(Duration::from_millis(120));
        assert_eq!(*order.lock().unwrap(), vec!["early", "middle", "late"]);
    }
}
