//! Deferred work for the session's single thread of control.
//!
//! Cooperative yields are resumed from here on a later tick instead of
//! recursively, and host code completes delegated calls by posting an
//! outcome. Tasks run in submission order.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::mpsc;

use crate::suspension::Outcome;

/// Unit of deferred work.
#[derive(Debug)]
pub enum Task {
    /// Resume the registered suspension with a command.
    Resume { command: String },
    /// Feed an outcome produced by host code back into the session.
    Deliver(Outcome),
}

/// FIFO work queue.
///
/// The receiving half stays with the session; completions hold clones of
/// the sending half and may live on other tasks or threads.
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Task>,
    rx: mpsc::UnboundedReceiver<Task>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Queue a task for a later tick.
    pub fn submit(&self, task: Task) {
        // The receiver lives in `self`, so the channel cannot be closed.
        let _ = self.tx.send(task);
    }

    /// Queue a deferred resume.
    pub fn submit_resume(&self, command: impl Into<String>) {
        self.submit(Task::Resume {
            command: command.into(),
        });
    }

    /// Handle through which host code delivers its outcome.
    #[must_use]
    pub fn completion(&self) -> Completion {
        Completion {
            tx: Some(self.tx.clone()),
            posted: Arc::default(),
        }
    }

    /// Take the next task if one is ready.
    pub fn try_next(&mut self) -> Option<Task> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next task.
    pub async fn next(&mut self) -> Option<Task> {
        self.rx.recv().await
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

/// Resumption function handed to host code.
///
/// Completing posts the outcome to the session's scheduler. Dropping it
/// without completing posts a failure so the toplevel restarts instead of
/// waiting forever.
pub struct Completion {
    tx: Option<mpsc::UnboundedSender<Task>>,
    posted: Arc<AtomicBool>,
}

/// Observer of a [`Completion`], kept by the session.
#[derive(Debug, Clone)]
pub struct CompletionStatus(Arc<AtomicBool>);

impl CompletionStatus {
    /// Whether the host already posted an outcome (or dropped the call).
    #[must_use]
    pub fn is_posted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Completion {
    /// Observer that turns true once an outcome is posted.
    #[must_use]
    pub fn status(&self) -> CompletionStatus {
        CompletionStatus(Arc::clone(&self.posted))
    }

    /// Deliver the outcome of the delegated call.
    pub fn complete(mut self, outcome: Outcome) {
        if let Some(tx) = self.tx.take() {
            self.posted.store(true, Ordering::SeqCst);
            if tx.send(Task::Deliver(outcome)).is_err() {
                tracing::debug!("session gone before host call completed");
            }
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::warn!("host call dropped without completing");
            self.posted.store(true, Ordering::SeqCst);
            let _ = tx.send(Task::Deliver(Outcome::failed("host call dropped")));
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.tx.is_some())
            .finish()
    }
}
