//! Pluggable scheduling of effect passes.
//!
//! The store never runs effects directly. After committing a state it hands
//! a task to a [`Scheduler`], which decides when the task runs: inline
//! ([`ImmediateScheduler`]), when the host drains a queue
//! ([`QueueScheduler`]), or on a tokio task ([`TokioScheduler`]). Every
//! scheduled task can be cancelled through its [`CancelHandle`]; a cancelled
//! task is skipped rather than run.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Cancels one scheduled task.
///
/// `Clone` is cheap; all clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Create a handle in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prevent the task from running if it has not started yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](CancelHandle::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Decides when a scheduled task runs.
///
/// # Contract
///
/// - Tasks scheduled on one scheduler run in the order they were scheduled.
/// - A task whose handle was cancelled before it started must not run.
pub trait Scheduler: Send + Sync {
    /// Schedule `task` and return a handle that cancels it.
    fn schedule(&self, task: Task) -> CancelHandle;
}

/// Runs every task inline, before `schedule` returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, task: Task) -> CancelHandle {
        task();
        CancelHandle::new()
    }
}

/// Holds tasks until the host calls [`run_pending`](QueueScheduler::run_pending).
///
/// Useful for hosts with their own event loop ("run at end of tick") and for
/// tests that need to observe state between commit and effects.
#[derive(Default)]
pub struct QueueScheduler {
    tasks: Mutex<VecDeque<(CancelHandle, Task)>>,
}

impl QueueScheduler {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks, cancelled ones included.
    pub fn pending(&self) -> usize {
        self.tasks.lock().expect("scheduler queue poisoned").len()
    }

    /// Run queued tasks until the queue is empty, including tasks scheduled
    /// by the tasks being run. Returns how many tasks actually ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // Pop under the lock, run outside it: tasks may schedule more.
            let next = self
                .tasks
                .lock()
                .expect("scheduler queue poisoned")
                .pop_front();
            let Some((handle, task)) = next else {
                return ran;
            };
            if !handle.is_cancelled() {
                task();
                ran += 1;
            }
        }
    }
}

impl Scheduler for QueueScheduler {
    fn schedule(&self, task: Task) -> CancelHandle {
        let handle = CancelHandle::new();
        self.tasks
            .lock()
            .expect("scheduler queue poisoned")
            .push_back((handle.clone(), task));
        handle
    }
}

impl std::fmt::Debug for QueueScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Runs tasks on a background tokio task, one at a time, in order.
///
/// Tasks flow through an unbounded `mpsc` channel to a single consumer, so
/// ordering holds even on a multi-threaded runtime. The consumer exits once
/// every `TokioScheduler` clone is dropped.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    sender: mpsc::UnboundedSender<(CancelHandle, Task)>,
}

impl TokioScheduler {
    /// Spawn the consumer on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new() -> Self {
        Self::with_handle(&tokio::runtime::Handle::current())
    }

    /// Spawn the consumer on the given runtime.
    pub fn with_handle(runtime: &tokio::runtime::Handle) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<(CancelHandle, Task)>();
        runtime.spawn(async move {
            while let Some((handle, task)) = receiver.recv().await {
                if handle.is_cancelled() {
                    tracing::trace!("skipping cancelled task");
                    continue;
                }
                task();
            }
            tracing::debug!("scheduler channel closed, consumer exiting");
        });
        Self { sender }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) -> CancelHandle {
        let handle = CancelHandle::new();
        if self.sender.send((handle.clone(), task)).is_err() {
            // Consumer is gone (runtime shut down); the task can never run.
            tracing::warn!("scheduler consumer stopped, dropping task");
            handle.cancel();
        }
        handle
    }
}
