//! Progress events emitted by pipeline tasks.
//!
//! Tasks never render anything. They push [`ProgressEvent`]s into a channel
//! and whoever holds the receiver decides what to show.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;

use super::TaskState;

/// One state change of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub task_id: usize,
    pub package: String,
    pub state: TaskState,
    pub percent: u8,
    pub message: String,
    /// Tasks in a terminal state when this event was emitted. Never decreases.
    pub completed: usize,
    pub total: usize,
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Channel pair for observing a run.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Shared emitter handed to every task of a run.
#[derive(Debug, Clone)]
pub(crate) struct ProgressSink {
    tx: Option<ProgressSender>,
    completed: Arc<AtomicUsize>,
    total: usize,
}

impl ProgressSink {
    pub(crate) fn new(tx: Option<ProgressSender>, total: usize) -> Self {
        Self { tx, completed: Arc::new(AtomicUsize::new(0)), total }
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, task_id: usize, package: &str, state: TaskState, message: String) {
        let completed = if state.is_terminal() {
            self.completed.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.completed.load(Ordering::SeqCst)
        };

        let Some(tx) = &self.tx else {
            return;
        };
        let event = ProgressEvent {
            task_id,
            package: package.to_string(),
            state,
            percent: state.percent(),
            message,
            completed,
            total: self.total,
        };
        if tx.send(event).is_err() {
            tracing::trace!(task_id, "progress receiver dropped");
        }
    }
}

/// Drain `rx`, logging each event. Returns the last completed count seen.
pub async fn log_progress(mut rx: ProgressReceiver) -> usize {
    let mut completed = 0;
    while let Some(event) = rx.recv().await {
        completed = completed.max(event.completed);
        if event.state.is_terminal() {
            tracing::info!(
                package = %event.package,
                state = ?event.state,
                completed = event.completed,
                total = event.total,
                "{}",
                event.message
            );
        } else {
            tracing::debug!(package = %event.package, state = ?event.state, percent = event.percent, "{}", event.message);
        }
    }
    completed
}
