//! Serialized build queue.
//!
//! Every world mutation of the engine funnels through one [`TaskQueue`]. Tasks
//! are handed to a single background worker over an unbounded channel and run
//! strictly in submission order, one at a time. Each task body runs on the
//! blocking pool (world I/O is assumed slow) and is awaited before the next
//! task starts, so at most one mutation touches the world at any instant.
//!
//! Submission never blocks and never fails synchronously: rejections,
//! cancellations and world errors are all reported through the returned
//! [`TaskFuture`].

mod task;

pub use task::{BuildJob, BuildSpeed, BuildTask, TaskId, TaskKind};

use crate::config::QueueConfig;
use crate::future::{TaskFuture, TaskOutcome};
use crate::types::ArenaId;
use crate::world::WorldHandle;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reason carried by restores rejected by the redundancy guard.
pub const REDUNDANT: &str = "redundant";

/// Reason carried by tasks cancelled because the queue shut down.
pub const SHUT_DOWN: &str = "queue shut down";

/// Reason carried by tasks removed through [`TaskQueue::cancel_pending`].
pub const CANCELLED_BY_CALLER: &str = "cancelled before start";

/// Handle to a submitted task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: TaskId,
    pub future: TaskFuture,
}

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Restores rejected by the redundancy guard (also counted as cancelled)
    pub redundant: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    redundant: AtomicU64,
}

struct QueuedTask {
    task: BuildTask,
    future: TaskFuture,
}

struct QueueShared {
    world: Arc<dyn WorldHandle>,
    performance_pause: Duration,
    pending: DashMap<TaskId, QueuedTask>,
    /// Restores pending or running, per arena
    restoring: DashMap<ArenaId, usize>,
    counters: Counters,
}

impl QueueShared {
    fn pause_for(&self, speed: BuildSpeed) -> Option<Duration> {
        match speed {
            BuildSpeed::Fast => None,
            BuildSpeed::Balanced => Some(Duration::ZERO),
            BuildSpeed::Performance => Some(self.performance_pause),
        }
    }

    async fn run(&self, id: TaskId, queued: QueuedTask) {
        let QueuedTask { task, future } = queued;
        let world = self.world.clone();
        let pause = self.pause_for(task.speed);
        let kind = task.kind();
        let arena = task.region.arena;
        let region = task.region.clone();

        debug!("Running {} task {} for {}", kind, id, region);
        let result = tokio::task::spawn_blocking(move || task.execute(world.as_ref(), pause)).await;

        let outcome = match result {
            Ok(Ok(output)) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                TaskOutcome::Succeeded(output)
            }
            Ok(Err(e)) => {
                warn!("Build task {} ({}) for {} failed: {}", id, kind, region, e);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                TaskOutcome::Failed(e.to_string())
            }
            Err(e) => {
                warn!("Build task {} ({}) for {} panicked: {}", id, kind, region, e);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                TaskOutcome::Failed(format!("build task panicked: {}", e))
            }
        };

        if kind == TaskKind::Restore {
            self.release_restore(arena);
        }
        future.resolve(outcome);
    }

    fn cancel(&self, id: TaskId, reason: &str) -> bool {
        let Some((_, queued)) = self.pending.remove(&id) else {
            return false;
        };

        if queued.task.kind() == TaskKind::Restore {
            self.release_restore(queued.task.region.arena);
        }
        self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
        debug!("Cancelled task {} for {}: {}", id, queued.task.region, reason);
        queued.future.resolve(TaskOutcome::Cancelled(reason.to_string()));
        true
    }

    fn release_restore(&self, arena: ArenaId) {
        if let Entry::Occupied(mut entry) = self.restoring.entry(arena) {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                entry.remove();
            }
        }
    }
}

/// FIFO queue with a single background worker.
pub struct TaskQueue {
    shared: Arc<QueueShared>,
    sender: Mutex<Option<mpsc::UnboundedSender<TaskId>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

impl TaskQueue {
    /// Creates the queue and spawns its worker on the current tokio runtime.
    pub fn new(world: Arc<dyn WorldHandle>, config: &QueueConfig) -> Self {
        let shared = Arc::new(QueueShared {
            world,
            performance_pause: Duration::from_millis(config.performance_pause_ms),
            pending: DashMap::new(),
            restoring: DashMap::new(),
            counters: Counters::default(),
        });
        let (sender, mut receiver) = mpsc::unbounded_channel::<TaskId>();

        let worker_shared = shared.clone();
        let worker = tokio::spawn(async move {
            while let Some(id) = receiver.recv().await {
                // Cancelled tasks are already gone from the pending table.
                let Some((_, queued)) = worker_shared.pending.remove(&id) else {
                    continue;
                };
                worker_shared.run(id, queued).await;
            }
            debug!("Build queue worker stopped");
        });

        Self {
            shared,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            next_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Queues `task` and returns immediately.
    ///
    /// A non-forced restore is rejected with `Cancelled("redundant")` while
    /// another restore for the same arena is pending or running.
    pub fn submit(&self, task: BuildTask) -> TaskHandle {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);

        if self.is_shut_down() {
            self.shared.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            return TaskHandle {
                id,
                future: TaskFuture::cancelled(SHUT_DOWN),
            };
        }

        if task.kind() == TaskKind::Restore && !self.reserve_restore(&task) {
            debug!("Rejected redundant restore {} for {}", id, task.region);
            self.shared.counters.redundant.fetch_add(1, Ordering::Relaxed);
            self.shared.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            return TaskHandle {
                id,
                future: TaskFuture::cancelled(REDUNDANT),
            };
        }

        let future = TaskFuture::pending();
        debug!("Queued {} task {} for {}", task.kind(), id, task.region);
        self.shared.pending.insert(
            id,
            QueuedTask {
                task,
                future: future.clone(),
            },
        );

        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(id).is_ok(),
            None => false,
        };
        if !sent {
            self.shared.cancel(id, SHUT_DOWN);
        }

        TaskHandle { id, future }
    }

    fn reserve_restore(&self, task: &BuildTask) -> bool {
        match self.shared.restoring.entry(task.region.arena) {
            Entry::Occupied(mut entry) => {
                if !task.force {
                    return false;
                }
                *entry.get_mut() += 1;
            }
            Entry::Vacant(entry) => {
                entry.insert(1);
            }
        }
        true
    }

    /// Removes a task that has not started yet and resolves it as cancelled.
    ///
    /// Returns `false` when the task is unknown, already running or finished.
    pub fn cancel_pending(&self, id: TaskId) -> bool {
        self.shared.cancel(id, CANCELLED_BY_CALLER)
    }

    /// Whether a restore for `arena` is pending or running.
    pub fn is_restoring(&self, arena: ArenaId) -> bool {
        self.shared.restoring.contains_key(&arena)
    }

    /// Number of tasks waiting for the worker.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> QueueStats {
        let counters = &self.shared.counters;
        QueueStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            cancelled: counters.cancelled.load(Ordering::Relaxed),
            redundant: counters.redundant.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting work and cancels every task that has not started.
    ///
    /// The task currently running, if any, finishes and resolves normally.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sender.lock().take();

        let ids: Vec<TaskId> = self.shared.pending.iter().map(|entry| *entry.key()).collect();
        let mut cancelled = 0;
        for id in ids {
            if self.shared.cancel(id, SHUT_DOWN) {
                cancelled += 1;
            }
        }
        info!("Build queue shut down, {} pending tasks cancelled", cancelled);
    }

    /// Shuts down and waits for the worker to exit.
    pub async fn join(&self) {
        self.shutdown();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Build queue worker ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
