//! The task stream: a single worker thread owns the host (the world) and runs
//! tasks from a FIFO dispatcher; a timer thread hands delayed tasks to that
//! dispatcher when they fall due.

pub mod dispatcher;
pub mod scheduler;

use dispatcher::Dispatcher;
use scheduler::{EventId, Scheduler};
use std::thread::JoinHandle;
use std::time::Duration;

pub type Task<T> = Box<dyn FnOnce(&mut T) + Send + 'static>;

/// Work a task asked for; forwarded to the dispatcher or scheduler once the
/// task has finished.
pub struct Deferred<T> {
    pub delay: Duration,
    pub task: Task<T>,
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").field("delay", &self.delay).finish()
    }
}

/// State the worker runs tasks against.
pub trait TaskHost: Sized + Send + 'static {
    fn take_deferred(&mut self) -> Vec<Deferred<Self>>;

    /// Called after every task, before deferred work is collected.
    fn end_of_task(&mut self);
}

pub struct TaskStream<T: TaskHost> {
    dispatcher: Dispatcher<T>,
    scheduler: Scheduler<T>,
    worker: Option<JoinHandle<T>>,
    timer: Option<JoinHandle<()>>,
}

impl<T: TaskHost> TaskStream<T> {
    /// Moves `host` onto the worker thread and starts the timer.
    pub fn start(host: T, lag_threshold: Duration) -> Self {
        let dispatcher = Dispatcher::new();
        let scheduler = Scheduler::new();
        let timer = scheduler.start(dispatcher.clone());
        let worker = dispatcher.start(host, scheduler.clone(), lag_threshold);
        Self {
            dispatcher,
            scheduler,
            worker: Some(worker),
            timer: Some(timer),
        }
    }

    pub fn handle(&self) -> TaskStreamHandle<T> {
        TaskStreamHandle {
            dispatcher: self.dispatcher.clone(),
            scheduler: self.scheduler.clone(),
        }
    }

    /// Stops the scheduler first so no timer fires into a draining
    /// dispatcher, then lets the worker finish what is queued. Returns the
    /// host for a final save.
    pub fn shutdown(mut self) -> Result<T, String> {
        self.scheduler.stop();
        if let Some(timer) = self.timer.take() {
            timer.join().map_err(|_| "scheduler thread panicked".to_string())?;
        }
        self.dispatcher.stop();
        let worker = self.worker.take().ok_or_else(|| "task stream already stopped".to_string())?;
        worker.join().map_err(|_| "dispatcher thread panicked".to_string())
    }
}

/// Producer side of the stream, cloned into every thread that feeds it.
pub struct TaskStreamHandle<T> {
    dispatcher: Dispatcher<T>,
    scheduler: Scheduler<T>,
}

impl<T> Clone for TaskStreamHandle<T> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T: TaskHost> TaskStreamHandle<T> {
    /// Queues a task behind everything already queued. False once stopping.
    pub fn dispatch<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.dispatcher.add_task(Box::new(task))
    }

    pub fn schedule<F>(&self, delay: Duration, task: F) -> Option<EventId>
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.scheduler.add_event(delay, Box::new(task))
    }

    pub fn stop_event(&self, id: EventId) -> bool {
        self.scheduler.stop_event(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::engine::WorldEngine;
    use crate::world::holder::{HolderRef, MoveFlags, SlotHint, ThingRef};
    use crate::world::outcome::ReturnValue;
    use crate::world::testkit::{self, CENTER, SWORD};
    use std::sync::mpsc;

    #[test]
    fn later_producer_sees_the_earlier_move_applied() {
        let mut world = testkit::world();
        let sword = testkit::put_on_tile(&mut world, CENTER, SWORD, 1);
        let east = testkit::east_of(CENTER);
        let south = testkit::south_of(CENTER);
        let stream = TaskStream::start(world, Duration::from_millis(50));

        let (queued_tx, queued_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();

        let first = {
            let handle = stream.handle();
            let results = result_tx.clone();
            std::thread::spawn(move || {
                let accepted = handle.dispatch(move |world: &mut WorldEngine| {
                    let moved = world
                        .move_item(HolderRef::Tile(CENTER), HolderRef::Tile(east), SlotHint::Anywhere, sword, 1, MoveFlags::NONE)
                        .map(|outcome| outcome.moved);
                    let _ = results.send(("east", moved));
                });
                let _ = queued_tx.send(accepted);
            })
        };
        let second = {
            let handle = stream.handle();
            std::thread::spawn(move || {
                assert_eq!(queued_rx.recv_timeout(Duration::from_secs(5)), Ok(true));
                handle.dispatch(move |world: &mut WorldEngine| {
                    let stale = world
                        .move_item(HolderRef::Tile(CENTER), HolderRef::Tile(south), SlotHint::Anywhere, sword, 1, MoveFlags::NONE)
                        .map(|outcome| outcome.moved);
                    let _ = result_tx.send(("stale", stale));
                    let moved = world
                        .move_item(HolderRef::Tile(east), HolderRef::Tile(south), SlotHint::Anywhere, sword, 1, MoveFlags::NONE)
                        .map(|outcome| outcome.moved);
                    let _ = result_tx.send(("south", moved));
                })
            })
        };
        first.join().expect("first producer");
        assert!(second.join().expect("second producer"));

        let results: Vec<_> = (0..3)
            .map(|_| result_rx.recv_timeout(Duration::from_secs(5)).expect("result"))
            .collect();
        assert_eq!(
            results,
            vec![("east", Ok(1)), ("stale", Err(ReturnValue::NotPossible)), ("south", Ok(1))]
        );

        let world = stream.shutdown().expect("shutdown");
        assert_eq!(world.holder_of(ThingRef::Item(sword)), Some(HolderRef::Tile(south)));
    }
}
