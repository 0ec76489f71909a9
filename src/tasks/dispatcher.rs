use super::scheduler::Scheduler;
use super::{Task, TaskHost};
use crate::telemetry::logging::log_lag;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::debug;

struct DispatchQueue<T> {
    tasks: VecDeque<Task<T>>,
    accepting: bool,
}

/// Strict FIFO drained by exactly one worker.
pub struct Dispatcher<T> {
    shared: Arc<(Mutex<DispatchQueue<T>>, Condvar)>,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: TaskHost> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TaskHost> Dispatcher<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new((
                Mutex::new(DispatchQueue {
                    tasks: VecDeque::new(),
                    accepting: true,
                }),
                Condvar::new(),
            )),
        }
    }

    fn queue(&self) -> MutexGuard<'_, DispatchQueue<T>> {
        self.shared.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_task(&self, task: Task<T>) -> bool {
        let mut queue = self.queue();
        if !queue.accepting {
            return false;
        }
        queue.tasks.push_back(task);
        drop(queue);
        self.shared.1.notify_one();
        true
    }

    pub fn len(&self) -> usize {
        self.queue().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuses new tasks; the worker exits once the queue is empty.
    pub(crate) fn stop(&self) {
        self.queue().accepting = false;
        self.shared.1.notify_all();
    }

    fn next_task(&self) -> Option<Task<T>> {
        let mut queue = self.queue();
        loop {
            if let Some(task) = queue.tasks.pop_front() {
                return Some(task);
            }
            if !queue.accepting {
                return None;
            }
            queue = self
                .shared
                .1
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn start(&self, host: T, scheduler: Scheduler<T>, lag_threshold: Duration) -> JoinHandle<T> {
        let dispatcher = self.clone();
        std::thread::spawn(move || dispatcher.run_worker(host, scheduler, lag_threshold))
    }

    fn run_worker(self, mut host: T, scheduler: Scheduler<T>, lag_threshold: Duration) -> T {
        self.forward_deferred(&mut host, &scheduler);
        while let Some(task) = self.next_task() {
            let started = Instant::now();
            task(&mut host);
            host.end_of_task();
            let elapsed = started.elapsed();
            if elapsed > lag_threshold {
                log_lag(&format!("task took {} ms", elapsed.as_millis()));
            }
            self.forward_deferred(&mut host, &scheduler);
        }
        host
    }

    fn forward_deferred(&self, host: &mut T, scheduler: &Scheduler<T>) {
        for deferred in host.take_deferred() {
            let accepted = if deferred.delay.is_zero() {
                self.add_task(deferred.task)
            } else {
                scheduler.add_event(deferred.delay, deferred.task).is_some()
            };
            if !accepted {
                debug!(target: "game", delay_ms = deferred.delay.as_millis() as u64, "deferred task dropped during shutdown");
            }
        }
    }
}
