//! One-shot timer service driven by an externally supplied clock.
//!
//! Nothing in the engine reads wall-clock time. The loop that feeds controller
//! snapshots also passes "now" to [`Scheduler::run`] (or to the mapper, which
//! forwards it), and every delay is measured against that value.

use crate::ids::IdAllocator;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::time::Duration;
use tracing::trace;

/// Handle of a pending callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

pub type Callback<C> = Box<dyn FnOnce(&mut C)>;

/// Priority-ordered one-shot timers over a context `C` handed to each callback.
pub struct Scheduler<C> {
    now: Duration,
    queue: BinaryHeap<Reverse<(Duration, TaskId)>>,
    pending: HashMap<TaskId, Callback<C>>,
    ids: IdAllocator,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self {
            now: Duration::ZERO,
            queue: BinaryHeap::new(),
            pending: HashMap::new(),
            ids: IdAllocator::new(),
        }
    }
}

impl<C> fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Moves the clock forward; the clock never goes backwards
    pub fn advance(&mut self, now: Duration) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Registers `callback` to run once `delay` has passed from the current clock
    pub fn schedule(&mut self, delay: Duration, callback: impl FnOnce(&mut C) + 'static) -> TaskId {
        let id = TaskId(self.ids.next_id());
        let due = self.now.saturating_add(delay);
        self.queue.push(Reverse((due, id)));
        self.pending.insert(id, Box::new(callback));
        trace!("Scheduled task {:?} at {:?}", id, due);
        id
    }

    /// Removes a pending task without running it. False if it already ran or never existed.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let removed = self.pending.remove(&id).is_some();
        if removed {
            trace!("Cancelled task {:?}", id);
        }
        removed
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops every pending task and starts task numbering over
    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
        self.ids.reset();
    }

    /// Due time of the earliest live task
    pub fn next_due(&mut self) -> Option<Duration> {
        self.prune();
        self.queue.peek().map(|Reverse((due, _))| *due)
    }

    /// Tasks created from now on compare greater than or equal to this id
    pub fn horizon(&self) -> TaskId {
        TaskId(self.ids.peek())
    }

    /// Removes and returns the earliest task due at `now` that was created before `horizon`.
    ///
    /// The horizon keeps a callback that reschedules itself with zero delay from
    /// running again inside the same pass.
    pub fn pop_due(&mut self, now: Duration, horizon: TaskId) -> Option<Callback<C>> {
        self.advance(now);
        self.prune();
        let mut deferred = Vec::new();
        let mut found = None;
        while let Some(Reverse((due, id))) = self.queue.peek().copied() {
            if due > now {
                break;
            }
            self.queue.pop();
            if id >= horizon {
                deferred.push(Reverse((due, id)));
                continue;
            }
            if let Some(callback) = self.pending.remove(&id) {
                found = Some(callback);
                break;
            }
        }
        self.queue.extend(deferred);
        found
    }

    /// Fires every task due at `now` in time order, each exactly once.
    /// Returns how many callbacks ran.
    pub fn run(&mut self, now: Duration, context: &mut C) -> usize {
        let horizon = self.horizon();
        let mut fired = 0;
        while let Some(callback) = self.pop_due(now, horizon) {
            callback(context);
            fired += 1;
        }
        fired
    }

    fn prune(&mut self) {
        while let Some(Reverse((_, id))) = self.queue.peek() {
            if self.pending.contains_key(id) {
                break;
            }
            self.queue.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn fires_in_time_order() {
        let mut scheduler: Scheduler<Vec<&'static str>> = Scheduler::new();
        scheduler.schedule(ms(30), |log| log.push("late"));
        scheduler.schedule(ms(10), |log| log.push("early"));
        scheduler.schedule(ms(20), |log| log.push("middle"));

        let mut log = Vec::new();
        assert_eq!(scheduler.run(ms(15), &mut log), 1);
        assert_eq!(scheduler.run(ms(40), &mut log), 2);
        assert_eq!(log, vec!["early", "middle", "late"]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn equal_due_times_fire_in_schedule_order() {
        let mut scheduler: Scheduler<Vec<u32>> = Scheduler::new();
        for i in 0..5 {
            scheduler.schedule(ms(10), move |log| log.push(i));
        }
        let mut log = Vec::new();
        scheduler.run(ms(10), &mut log);
        assert_eq!(log, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn cancel_after_fire_returns_false() {
        let mut scheduler: Scheduler<u32> = Scheduler::new();
        let task = scheduler.schedule(ms(5), |count| *count += 1);
        let mut count = 0;
        scheduler.run(ms(5), &mut count);
        assert_eq!(count, 1);
        assert!(!scheduler.cancel(task));
    }

    #[test]
    fn cancelled_task_never_runs() {
        let mut scheduler: Scheduler<u32> = Scheduler::new();
        let task = scheduler.schedule(ms(5), |count| *count += 1);
        assert!(scheduler.cancel(task));
        assert!(!scheduler.cancel(task));
        let mut count = 0;
        assert_eq!(scheduler.run(ms(50), &mut count), 0);
        assert_eq!(count, 0);
        assert_eq!(scheduler.next_due(), None);
    }

    #[test]
    fn delays_are_relative_to_the_supplied_clock() {
        let mut scheduler: Scheduler<u32> = Scheduler::new();
        scheduler.advance(ms(100));
        scheduler.schedule(ms(10), |count| *count += 1);
        assert_eq!(scheduler.next_due(), Some(ms(110)));
        let mut count = 0;
        scheduler.run(ms(105), &mut count);
        assert_eq!(count, 0);
        scheduler.run(ms(110), &mut count);
        assert_eq!(count, 1);
    }

    #[test]
    fn huge_delays_saturate_instead_of_overflowing() {
        let mut scheduler: Scheduler<u32> = Scheduler::new();
        scheduler.advance(ms(100));
        scheduler.schedule(Duration::MAX, |count| *count += 1);
        assert_eq!(scheduler.next_due(), Some(Duration::MAX));
        let mut count = 0;
        assert_eq!(scheduler.run(ms(1_000_000), &mut count), 0);
        assert_eq!(count, 0);
    }

    #[test]
    fn horizon_defers_tasks_created_during_a_pass() {
        let mut scheduler: Scheduler<u32> = Scheduler::new();
        scheduler.schedule(ms(0), |count| *count += 1);
        let horizon = scheduler.horizon();
        scheduler.schedule(ms(0), |count| *count += 10);

        let mut count = 0;
        while let Some(callback) = scheduler.pop_due(ms(0), horizon) {
            callback(&mut count);
        }
        assert_eq!(count, 1);
        assert_eq!(scheduler.len(), 1);
        scheduler.run(ms(0), &mut count);
        assert_eq!(count, 11);
    }
}
