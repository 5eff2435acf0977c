//! Single-threaded cooperative task loop with a timer queue
//!
//! Each executor owns one reactor. Tasks are boxed futures run to completion
//! one at a time inside [`Reactor::run`]; no two tasks on the same reactor
//! ever overlap. Submissions from any thread are observed in send order, and
//! timed tasks fire by `(deadline, submission sequence)`.
//!
//! Shutdown (the `watch` flag flipping to `true`, or every handle being
//! dropped) exits the loop: queued and pending timed tasks are dropped
//! without being polled, and later submissions fail with [`ReactorClosed`].

use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, trace};

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// The reactor has shut down and no longer accepts tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("reactor closed")]
pub struct ReactorClosed;

enum Command {
    Submit(BoxedTask),
    Timed(BoxedTask, Duration),
}

/// Clonable submission side of a reactor
#[derive(Clone)]
pub struct ReactorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ReactorHandle {
    /// Run a task once, as soon as the loop gets to it
    pub fn submit_task(
        &self,
        task: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ReactorClosed> {
        self.tx
            .send(Command::Submit(Box::pin(task)))
            .map_err(|_| ReactorClosed)
    }

    /// Run a task once after `delay`; the task may re-arm itself
    pub fn add_timing_task(
        &self,
        delay: Duration,
        task: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ReactorClosed> {
        self.tx
            .send(Command::Timed(Box::pin(task), delay))
            .map_err(|_| ReactorClosed)
    }
}

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    task: BoxedTask,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed so the BinaryHeap pops the earliest deadline first.
        (other.deadline, other.seq).cmp(&(self.deadline, self.seq))
    }
}

/// The loop side of a reactor; consumed by [`Reactor::run`]
pub struct Reactor {
    rx: mpsc::UnboundedReceiver<Command>,
    timers: BinaryHeap<TimerEntry>,
    seq: u64,
}

impl Reactor {
    /// Create a reactor and its submission handle
    pub fn new() -> (ReactorHandle, Reactor) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ReactorHandle { tx },
            Reactor {
                rx,
                timers: BinaryHeap::new(),
                seq: 0,
            },
        )
    }

    /// Drive the loop until shutdown
    ///
    /// Blocks (cooperatively) on the earliest timer or a new submission.
    /// Submissions take precedence over due timers so queued work keeps its
    /// FIFO ordering.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let next_deadline = self.timers.peek().map(|entry| entry.deadline);
            let sleep_target = next_deadline.unwrap_or_else(Instant::now);

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                command = self.rx.recv() => {
                    match command {
                        Some(Command::Submit(task)) => task.await,
                        Some(Command::Timed(task, delay)) => {
                            self.seq += 1;
                            self.timers.push(TimerEntry {
                                deadline: Instant::now() + delay,
                                seq: self.seq,
                                task,
                            });
                        }
                        None => break,
                    }
                }
                _ = sleep_until(sleep_target), if next_deadline.is_some() => {
                    self.run_due_timers().await;
                }
            }
        }

        let dropped = self.timers.len();
        if dropped > 0 {
            debug!(pending = dropped, "reactor shut down with pending timed tasks");
        }
        // Dropping the receiver makes every handle's send fail from here on;
        // queued commands and timer entries are discarded without running.
    }

    async fn run_due_timers(&mut self) {
        let now = Instant::now();
        while let Some(entry) = self.timers.peek() {
            if entry.deadline > now {
                break;
            }
            // peek() just confirmed the heap is non-empty
            if let Some(entry) = self.timers.pop() {
                trace!(seq = entry.seq, "running timed task");
                entry.task.await;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn spawn_reactor() -> (ReactorHandle, watch::Sender<bool>, tokio::task::JoinHandle<()>) {
        let (handle, reactor) = Reactor::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(reactor.run(shutdown_rx));
        (handle, shutdown_tx, join)
    }

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> BoxedTask) {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let log_for_task = log.clone();
        let make = move |tag: &'static str| -> BoxedTask {
            let log = log_for_task.clone();
            Box::pin(async move {
                log.lock().push(tag);
            })
        };
        (log, make)
    }

    #[tokio::test(start_paused = true)]
    async fn submitted_tasks_run_fifo() {
        let (handle, _shutdown, _join) = spawn_reactor();
        let (log, make) = recorder();

        handle.submit_task(make("first")).unwrap();
        handle.submit_task(make("second")).unwrap();
        handle.submit_task(make("third")).unwrap();

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_tasks_fire_by_deadline() {
        let (handle, _shutdown, _join) = spawn_reactor();
        let (log, make) = recorder();

        handle
            .add_timing_task(Duration::from_millis(100), make("late"))
            .unwrap();
        handle
            .add_timing_task(Duration::from_millis(50), make("early"))
            .unwrap();

        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(60)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(*log.lock(), vec!["early"]);

        tokio::time::advance(Duration::from_millis(50)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(*log.lock(), vec!["early", "late"]);
    }

    fn rearming(
        handle: ReactorHandle,
        counter: Arc<Mutex<u32>>,
        period: Duration,
    ) -> BoxedTask {
        Box::pin(async move {
            *counter.lock() += 1;
            let next = rearming(handle.clone(), counter.clone(), period);
            let _ = handle.add_timing_task(period, next);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn timed_task_can_rearm_itself() {
        let (handle, _shutdown, _join) = spawn_reactor();
        let counter = Arc::new(Mutex::new(0u32));

        handle
            .submit_task(rearming(
                handle.clone(),
                counter.clone(),
                Duration::from_millis(100),
            ))
            .unwrap();

        tokio::task::yield_now().await;
        assert_eq!(*counter.lock(), 1, "initial submission runs immediately");

        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(100)).await;
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
        }
        assert_eq!(*counter.lock(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_pending_tasks_without_running() {
        let (handle, shutdown, join) = spawn_reactor();
        let (log, make) = recorder();

        // Let the loop start before parking work behind the shutdown signal.
        tokio::task::yield_now().await;

        handle
            .add_timing_task(Duration::from_secs(10), make("never"))
            .unwrap();
        shutdown.send(true).unwrap();
        handle.submit_task(make("racing")).unwrap();

        join.await.unwrap();

        assert!(
            log.lock().is_empty(),
            "pending tasks must be dropped, not run"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn submissions_after_shutdown_are_refused() {
        let (handle, shutdown, join) = spawn_reactor();
        let (_log, make) = recorder();

        shutdown.send(true).unwrap();
        join.await.unwrap();

        assert_eq!(handle.submit_task(make("too-late")), Err(ReactorClosed));
        assert_eq!(
            handle.add_timing_task(Duration::from_millis(1), make("too-late")),
            Err(ReactorClosed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_all_handles_ends_the_loop() {
        let (handle, _shutdown, join) = spawn_reactor();
        drop(handle);
        join.await.unwrap();
    }
}
