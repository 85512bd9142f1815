//! Single-assignment completion handles for queued build work.
//!
//! A [`TaskFuture`] starts out pending and is resolved exactly once with a
//! [`TaskOutcome`]. Subscribers registered before resolution are invoked in
//! registration order when it happens; subscribers registered afterwards are
//! invoked immediately with the stored outcome. Callbacks always run outside
//! the future's internal lock, so they are free to register further callbacks
//! or resolve other futures.

use crate::snapshot::Snapshot;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;

/// Observable state of a [`TaskFuture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

/// Value produced by a successful build task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    /// A fresh snapshot of the task's volume
    Captured(Arc<Snapshot>),
    /// Number of cells written back from a snapshot
    Restored { cells: usize },
    /// Number of cells overwritten by a fill
    Filled { cells: usize },
}

impl TaskOutput {
    /// The captured snapshot, if this output came from a capture.
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            TaskOutput::Captured(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

/// Terminal result of a build task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Succeeded(TaskOutput),
    Failed(String),
    Cancelled(String),
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Succeeded(_) => TaskStatus::Succeeded,
            TaskOutcome::Failed(_) => TaskStatus::Failed,
            TaskOutcome::Cancelled(_) => TaskStatus::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded(_))
    }

    /// Failure or cancellation reason.
    pub fn reason(&self) -> Option<&str> {
        match self {
            TaskOutcome::Succeeded(_) => None,
            TaskOutcome::Failed(reason) | TaskOutcome::Cancelled(reason) => Some(reason),
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Succeeded(_) => write!(f, "succeeded"),
            TaskOutcome::Failed(reason) => write!(f, "failed: {}", reason),
            TaskOutcome::Cancelled(reason) => write!(f, "cancelled: {}", reason),
        }
    }
}

type SuccessFn = Box<dyn FnOnce(&TaskOutput) + Send>;
type ReasonFn = Box<dyn FnOnce(&str) + Send>;
type CompleteFn = Box<dyn FnOnce(&TaskOutcome) + Send>;

enum Subscriber {
    Success(SuccessFn),
    Fail(ReasonFn),
    Cancel(ReasonFn),
    Complete(CompleteFn),
}

impl Subscriber {
    fn fire(self, outcome: &TaskOutcome) {
        match (self, outcome) {
            (Subscriber::Success(callback), TaskOutcome::Succeeded(output)) => callback(output),
            (Subscriber::Fail(callback), TaskOutcome::Failed(reason)) => callback(reason),
            (Subscriber::Cancel(callback), TaskOutcome::Cancelled(reason)) => callback(reason),
            (Subscriber::Complete(callback), outcome) => callback(outcome),
            _ => {}
        }
    }
}

#[derive(Default)]
struct FutureState {
    outcome: Option<TaskOutcome>,
    subscribers: Vec<Subscriber>,
    /// Outcome is set but the resolving thread is still draining subscribers
    dispatching: bool,
}

#[derive(Default)]
struct FutureInner {
    state: Mutex<FutureState>,
    notify: Notify,
}

/// Shared completion handle. Clones observe the same outcome.
#[derive(Clone, Default)]
pub struct TaskFuture {
    inner: Arc<FutureInner>,
}

impl TaskFuture {
    /// Creates an unresolved future.
    pub fn pending() -> Self {
        Self::default()
    }

    /// Creates a future that has already succeeded.
    pub fn succeeded(output: TaskOutput) -> Self {
        Self::resolved(TaskOutcome::Succeeded(output))
    }

    /// Creates a future that has already failed.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::resolved(TaskOutcome::Failed(reason.into()))
    }

    /// Creates a future that has already been cancelled.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::resolved(TaskOutcome::Cancelled(reason.into()))
    }

    fn resolved(outcome: TaskOutcome) -> Self {
        let future = Self::pending();
        future.resolve(outcome);
        future
    }

    /// Resolves the future, firing every registered subscriber in order.
    ///
    /// Returns `false` (and changes nothing) when the future was already
    /// resolved.
    pub fn resolve(&self, outcome: TaskOutcome) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            state.dispatching = true;
        }

        // Subscribers added while dispatching queue up behind the current
        // batch and are drained here, keeping registration order.
        loop {
            let batch = {
                let mut state = self.inner.state.lock();
                if state.subscribers.is_empty() {
                    state.dispatching = false;
                    break;
                }
                std::mem::take(&mut state.subscribers)
            };
            for subscriber in batch {
                subscriber.fire(&outcome);
            }
        }
        self.inner.notify.notify_waiters();
        true
    }

    pub fn status(&self) -> TaskStatus {
        self.inner
            .state
            .lock()
            .outcome
            .as_ref()
            .map_or(TaskStatus::Pending, TaskOutcome::status)
    }

    /// The outcome, once resolved.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.inner.state.lock().outcome.clone()
    }

    pub fn is_done(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// True when both handles refer to the same underlying future.
    pub fn same_as(&self, other: &TaskFuture) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Runs `callback` with the task's output if it succeeds.
    pub fn on_success(&self, callback: impl FnOnce(&TaskOutput) + Send + 'static) -> &Self {
        self.subscribe(Subscriber::Success(Box::new(callback)))
    }

    /// Runs `callback` with the failure reason if the task fails.
    pub fn on_fail(&self, callback: impl FnOnce(&str) + Send + 'static) -> &Self {
        self.subscribe(Subscriber::Fail(Box::new(callback)))
    }

    /// Runs `callback` with the cancellation reason if the task is cancelled.
    pub fn on_cancel(&self, callback: impl FnOnce(&str) + Send + 'static) -> &Self {
        self.subscribe(Subscriber::Cancel(Box::new(callback)))
    }

    /// Runs `callback` for any outcome.
    pub fn on_complete(&self, callback: impl FnOnce(&TaskOutcome) + Send + 'static) -> &Self {
        self.subscribe(Subscriber::Complete(Box::new(callback)))
    }

    fn subscribe(&self, subscriber: Subscriber) -> &Self {
        let outcome = {
            let mut state = self.inner.state.lock();
            match state.outcome.clone() {
                Some(outcome) if !state.dispatching => outcome,
                _ => {
                    state.subscribers.push(subscriber);
                    return self;
                }
            }
        };

        subscriber.fire(&outcome);
        self
    }

    /// Waits asynchronously until the future resolves.
    pub async fn wait(&self) -> TaskOutcome {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for TaskFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TaskFuture")
            .field("outcome", &state.outcome)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}
