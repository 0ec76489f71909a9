use std::sync::mpsc;
use std::time::{Duration, Instant};
use tibia_core::tasks::{Deferred, TaskHost, TaskStream};

const LAG: Duration = Duration::from_millis(500);
const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Recorder {
    log: Vec<u32>,
    outbox: Vec<Deferred<Recorder>>,
    tasks_ended: usize,
}

impl TaskHost for Recorder {
    fn take_deferred(&mut self) -> Vec<Deferred<Self>> {
        std::mem::take(&mut self.outbox)
    }

    fn end_of_task(&mut self) {
        self.tasks_ended += 1;
    }
}

#[test]
fn tasks_run_in_submission_order() {
    let stream = TaskStream::start(Recorder::default(), LAG);
    let handle = stream.handle();
    for value in 0..100 {
        assert!(handle.dispatch(move |host: &mut Recorder| host.log.push(value)));
    }
    let host = stream.shutdown().expect("shutdown");
    assert_eq!(host.log, (0..100).collect::<Vec<_>>());
    assert_eq!(host.tasks_ended, 100);
}

#[test]
fn producers_on_many_threads_funnel_into_one_worker() {
    let stream = TaskStream::start(Recorder::default(), LAG);
    let producers: Vec<_> = (0..4u32)
        .map(|producer| {
            let handle = stream.handle();
            std::thread::spawn(move || {
                for seq in 0..50u32 {
                    handle.dispatch(move |host: &mut Recorder| host.log.push(producer * 1000 + seq));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer");
    }

    let host = stream.shutdown().expect("shutdown");
    assert_eq!(host.log.len(), 200);
    for producer in 0..4u32 {
        let seen: Vec<u32> = host
            .log
            .iter()
            .filter(|value| *value / 1000 == producer)
            .map(|value| value % 1000)
            .collect();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }
}

#[test]
fn scheduled_tasks_fire_in_time_order() {
    let stream = TaskStream::start(Recorder::default(), LAG);
    let handle = stream.handle();
    let (done_tx, done_rx) = mpsc::channel();
    for (delay, value) in [(60, 3), (20, 1), (40, 2)] {
        let done = done_tx.clone();
        handle
            .schedule(Duration::from_millis(delay), move |host: &mut Recorder| {
                host.log.push(value);
                let _ = done.send(());
            })
            .expect("scheduled");
    }
    for _ in 0..3 {
        done_rx.recv_timeout(WAIT).expect("fired");
    }

    let host = stream.shutdown().expect("shutdown");
    assert_eq!(host.log, vec![1, 2, 3]);
}

#[test]
fn stopped_events_do_not_fire() {
    let stream = TaskStream::start(Recorder::default(), LAG);
    let handle = stream.handle();
    let (done_tx, done_rx) = mpsc::channel();
    let cancelled = handle
        .schedule(Duration::from_millis(30), |host: &mut Recorder| host.log.push(1))
        .expect("scheduled");
    handle
        .schedule(Duration::from_millis(80), move |host: &mut Recorder| {
            host.log.push(2);
            let _ = done_tx.send(());
        })
        .expect("scheduled");
    assert!(handle.stop_event(cancelled));

    done_rx.recv_timeout(WAIT).expect("sentinel");
    let host = stream.shutdown().expect("shutdown");
    assert_eq!(host.log, vec![2]);
}

#[test]
fn deferred_work_is_routed_after_the_task() {
    let stream = TaskStream::start(Recorder::default(), LAG);
    let (done_tx, done_rx) = mpsc::channel();
    stream.handle().dispatch(move |host: &mut Recorder| {
        host.outbox.push(Deferred {
            delay: Duration::from_millis(20),
            task: Box::new(move |host: &mut Recorder| {
                host.log.push(3);
                let _ = done_tx.send(());
            }),
        });
        host.outbox.push(Deferred {
            delay: Duration::ZERO,
            task: Box::new(|host: &mut Recorder| host.log.push(2)),
        });
        host.log.push(1);
    });

    done_rx.recv_timeout(WAIT).expect("delayed follow-up");
    let host = stream.shutdown().expect("shutdown");
    assert_eq!(host.log, vec![1, 2, 3]);
}

#[test]
fn shutdown_drops_future_events_and_drains_the_queue() {
    let stream = TaskStream::start(Recorder::default(), LAG);
    let handle = stream.handle();
    handle
        .schedule(Duration::from_secs(30), |host: &mut Recorder| host.log.push(99))
        .expect("scheduled");
    for value in 0..5 {
        handle.dispatch(move |host: &mut Recorder| {
            std::thread::sleep(Duration::from_millis(5));
            host.log.push(value);
        });
    }

    let started = Instant::now();
    let host = stream.shutdown().expect("shutdown");
    assert!(started.elapsed() < WAIT);
    assert_eq!(host.log, vec![0, 1, 2, 3, 4]);
    assert!(!handle.dispatch(|host: &mut Recorder| host.log.push(7)));
    assert!(handle.schedule(Duration::ZERO, |host: &mut Recorder| host.log.push(8)).is_none());
}
