use super::dispatcher::Dispatcher;
use super::{Task, TaskHost};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ScheduledEntry {
    due: Instant,
    id: EventId,
}

/// Earliest first; equal times keep submission order.
impl Ord for ScheduledEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.due.cmp(&self.due).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Heap of fire times plus the live tasks by id. Cancelling only drops the
/// task; its heap entry is discarded when it surfaces.
struct Timetable<T> {
    heap: BinaryHeap<ScheduledEntry>,
    pending: HashMap<EventId, Task<T>>,
    next_id: u64,
    running: bool,
}

impl<T> Timetable<T> {
    fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            next_id: 0,
            running: true,
        }
    }

    fn set(&mut self, due: Instant, task: Task<T>) -> EventId {
        self.next_id += 1;
        let id = EventId(self.next_id);
        self.pending.insert(id, task);
        self.heap.push(ScheduledEntry { due, id });
        id
    }

    /// Fire time of the earliest live entry.
    fn next_due(&mut self) -> Option<Instant> {
        loop {
            let entry = self.heap.peek()?;
            if self.pending.contains_key(&entry.id) {
                return Some(entry.due);
            }
            self.heap.pop();
        }
    }

    fn pop_ready(&mut self, now: Instant) -> Option<Task<T>> {
        let due = self.next_due()?;
        if due > now {
            return None;
        }
        let entry = self.heap.pop()?;
        self.pending.remove(&entry.id)
    }

    fn stop(&mut self, id: EventId) -> bool {
        self.pending.remove(&id).is_some()
    }
}

/// Holds tasks until their fire time, then hands them to the dispatcher.
/// It never runs a task itself.
pub struct Scheduler<T> {
    shared: Arc<(Mutex<Timetable<T>>, Condvar)>,
}

impl<T> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: TaskHost> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TaskHost> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new((Mutex::new(Timetable::new()), Condvar::new())),
        }
    }

    fn table(&self) -> MutexGuard<'_, Timetable<T>> {
        self.shared.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` once the scheduler has stopped.
    pub fn add_event(&self, delay: Duration, task: Task<T>) -> Option<EventId> {
        let mut table = self.table();
        if !table.running {
            return None;
        }
        let id = table.set(Instant::now() + delay, task);
        drop(table);
        self.shared.1.notify_one();
        Some(id)
    }

    /// Cancels an event that has not fired yet.
    pub fn stop_event(&self, id: EventId) -> bool {
        self.table().stop(id)
    }

    pub fn len(&self) -> usize {
        self.table().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops admission and drops everything not yet fired.
    pub(crate) fn stop(&self) {
        let mut table = self.table();
        table.running = false;
        table.pending.clear();
        table.heap.clear();
        drop(table);
        self.shared.1.notify_all();
    }

    pub(crate) fn start(&self, dispatcher: Dispatcher<T>) -> JoinHandle<()> {
        let scheduler = self.clone();
        std::thread::spawn(move || scheduler.run_timer(dispatcher))
    }

    fn run_timer(self, dispatcher: Dispatcher<T>) {
        let mut table = self.table();
        while table.running {
            let now = Instant::now();
            let mut ready = Vec::new();
            while let Some(task) = table.pop_ready(now) {
                ready.push(task);
            }
            if !ready.is_empty() {
                drop(table);
                for task in ready {
                    dispatcher.add_task(task);
                }
                table = self.table();
                continue;
            }
            table = match table.next_due() {
                Some(due) => {
                    let wait = due.saturating_duration_since(now);
                    self.shared
                        .1
                        .wait_timeout(table, wait)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0)
                }
                None => self.shared.1.wait(table).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(value: u32) -> Task<Vec<u32>> {
        Box::new(move |log: &mut Vec<u32>| log.push(value))
    }

    fn drain(table: &mut Timetable<Vec<u32>>, now: Instant) -> Vec<u32> {
        let mut log = Vec::new();
        while let Some(task) = table.pop_ready(now) {
            task(&mut log);
        }
        log
    }

    #[test]
    fn earliest_event_fires_first() {
        let base = Instant::now();
        let mut table = Timetable::new();
        table.set(base + Duration::from_millis(10), marker(1));
        table.set(base + Duration::from_millis(5), marker(2));

        assert!(drain(&mut table, base + Duration::from_millis(4)).is_empty());
        assert_eq!(drain(&mut table, base + Duration::from_millis(5)), vec![2]);
        assert_eq!(drain(&mut table, base + Duration::from_millis(10)), vec![1]);
        assert!(table.pending.is_empty());
    }

    #[test]
    fn equal_fire_times_keep_submission_order() {
        let base = Instant::now();
        let mut table = Timetable::new();
        for value in 1..=3 {
            table.set(base, marker(value));
        }
        assert_eq!(drain(&mut table, base), vec![1, 2, 3]);
    }

    #[test]
    fn stopped_events_never_fire() {
        let base = Instant::now();
        let mut table = Timetable::new();
        let cancelled = table.set(base + Duration::from_millis(5), marker(1));
        table.set(base + Duration::from_millis(15), marker(2));

        assert!(table.stop(cancelled));
        assert!(!table.stop(cancelled));
        assert_eq!(table.next_due(), Some(base + Duration::from_millis(15)));
        assert_eq!(drain(&mut table, base + Duration::from_millis(20)), vec![2]);
    }
}
