//! Timer scheduling for time-based operators.
//!
//! The realm never touches a platform timer directly. `debounce_time`,
//! `throttle_time`, `delay_with_microtask` and
//! `pass_only_after_node_has_emitted_before` go through the `Scheduler`
//! injected at construction, so tests can drive time by hand.
//!
//! - `VirtualScheduler`: manual clock, advanced explicitly
//! - `TokioScheduler` (`tokio` only): wall-clock timers spawned on a tokio `LocalSet`

use alloc::boxed::Box;
use alloc::collections::{BinaryHeap, VecDeque};
use core::cell::{Cell, RefCell};
use core::cmp::Reverse;
use core::time::Duration;
use hashbrown::HashMap;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Handle of a scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// Timer and microtask capability.
pub trait Scheduler {
    /// Time elapsed since the scheduler's origin.
    fn now(&self) -> Duration;

    /// Runs `task` once `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancels a pending timer. Returns false if it already ran or was cancelled.
    fn cancel(&self, timer: TimerId) -> bool;

    /// Runs `task` before any timer, as soon as the current work finishes.
    fn queue_microtask(&self, task: Task);
}

/// Pending timers ordered by deadline, then by scheduling order.
#[derive(Default)]
struct TimerQueue {
    next_id: u64,
    deadlines: BinaryHeap<Reverse<(Duration, u64)>>,
    tasks: HashMap<u64, Task>,
    microtasks: VecDeque<Task>,
}

impl TimerQueue {
    fn push(&mut self, deadline: Duration, task: Task) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.deadlines.push(Reverse((deadline, id)));
        self.tasks.insert(id, task);
        TimerId(id)
    }

    fn cancel(&mut self, timer: TimerId) -> bool {
        self.tasks.remove(&timer.0).is_some()
    }

    /// Drops cancelled entries from the head of the heap.
    fn prune(&mut self) {
        while let Some(Reverse((_, id))) = self.deadlines.peek() {
            if self.tasks.contains_key(id) {
                break;
            }
            self.deadlines.pop();
        }
    }

    fn next_deadline(&mut self) -> Option<Duration> {
        self.prune();
        self.deadlines.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Pops the earliest timer due at or before `now`.
    fn pop_due(&mut self, now: Duration) -> Option<(Duration, Task)> {
        let deadline = self.next_deadline()?;
        if deadline > now {
            return None;
        }
        let Reverse((deadline, id)) = self.deadlines.pop()?;
        self.tasks.remove(&id).map(|task| (deadline, task))
    }

    fn pop_microtask(&mut self) -> Option<Task> {
        self.microtasks.pop_front()
    }

    fn pending(&self) -> usize {
        self.tasks.len() + self.microtasks.len()
    }
}

/// A scheduler with a manually advanced clock.
///
/// # Example
///
/// ```ignore
/// let scheduler = Rc::new(VirtualScheduler::new());
/// let realm = Realm::builder().scheduler(scheduler.clone()).build();
///
/// // ... publish into a debounced node ...
/// scheduler.advance(Duration::from_millis(100));
/// ```
#[derive(Default)]
pub struct VirtualScheduler {
    now: Cell<Duration>,
    queue: RefCell<TimerQueue>,
}

impl VirtualScheduler {
    /// Creates a scheduler whose clock starts at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs queued microtasks until none remain. Returns how many ran.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.queue.borrow_mut().pop_microtask();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Moves the clock forward by `by`, running every timer that falls due in
    /// deadline order (each followed by the microtasks it queued).
    /// Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now.get() + by;
        let mut ran = self.run_microtasks();
        loop {
            let due = self.queue.borrow_mut().pop_due(target);
            match due {
                Some((deadline, task)) => {
                    self.now.set(deadline);
                    task();
                    ran += 1 + self.run_microtasks();
                }
                None => break,
            }
        }
        self.now.set(target);
        ran
    }

    /// Returns the number of pending timers and microtasks.
    pub fn pending(&self) -> usize {
        self.queue.borrow().pending()
    }
}

impl Scheduler for VirtualScheduler {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let deadline = self.now.get() + delay;
        self.queue.borrow_mut().push(deadline, task)
    }

    fn cancel(&self, timer: TimerId) -> bool {
        self.queue.borrow_mut().cancel(timer)
    }

    fn queue_microtask(&self, task: Task) {
        self.queue.borrow_mut().microtasks.push_back(task);
    }
}

#[cfg(feature = "tokio")]
pub use runtime::TokioScheduler;

#[cfg(feature = "tokio")]
mod runtime {
    use super::{Scheduler, Task, TimerId};
    use alloc::rc::Rc;
    use core::cell::{Cell, RefCell};
    use core::time::Duration;
    use hashbrown::HashMap;
    use tokio::task::{self, JoinHandle};
    use tokio::time::{sleep, Instant};

    /// A wall-clock scheduler backed by the tokio runtime.
    ///
    /// Timers and microtasks are spawned with `tokio::task::spawn_local`, so
    /// they must be scheduled from inside a `tokio::task::LocalSet`. The
    /// clock starts at first use and follows tokio's clock, including a
    /// paused test clock.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let local = tokio::task::LocalSet::new();
    /// local.run_until(async {
    ///     let realm = Realm::new();
    ///     // ... publish into a debounced node ...
    ///     tokio::time::sleep(Duration::from_millis(100)).await;
    /// }).await;
    /// ```
    #[derive(Default)]
    pub struct TokioScheduler {
        origin: Cell<Option<Instant>>,
        next_id: Cell<u64>,
        timers: Rc<RefCell<HashMap<u64, JoinHandle<()>>>>,
    }

    impl TokioScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        fn origin(&self) -> Instant {
            match self.origin.get() {
                Some(origin) => origin,
                None => {
                    let origin = Instant::now();
                    self.origin.set(Some(origin));
                    origin
                }
            }
        }

        /// Returns the number of pending timers.
        pub fn pending(&self) -> usize {
            self.timers.borrow().len()
        }
    }

    impl Scheduler for TokioScheduler {
        fn now(&self) -> Duration {
            Instant::now().saturating_duration_since(self.origin())
        }

        fn schedule(&self, delay: Duration, task: Task) -> TimerId {
            self.origin();
            let id = self.next_id.get();
            self.next_id.set(id + 1);
            let timers = self.timers.clone();
            // The handle is stored before the spawned task can first be polled.
            let handle = task::spawn_local(async move {
                sleep(delay).await;
                timers.borrow_mut().remove(&id);
                task();
            });
            self.timers.borrow_mut().insert(id, handle);
            TimerId(id)
        }

        fn cancel(&self, timer: TimerId) -> bool {
            let handle = self.timers.borrow_mut().remove(&timer.0);
            match handle {
                Some(handle) => {
                    handle.abort();
                    true
                }
                None => false,
            }
        }

        fn queue_microtask(&self, task: Task) {
            task::spawn_local(async move {
                task::yield_now().await;
                task();
            });
        }
    }

    impl Drop for TokioScheduler {
        fn drop(&mut self) {
            for (_, handle) in self.timers.borrow_mut().drain() {
                handle.abort();
            }
        }
    }
}
