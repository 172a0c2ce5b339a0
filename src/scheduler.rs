//! Deferred, cancellable tasks on the tokio runtime.
//!
//! The widget defers two kinds of work: the zero-delay entrance tick of a new
//! entry and the delayed start of a relay cycle. Each is spawned as its own
//! task guarded by a child [`CancellationToken`], so it can be cancelled on
//! its own or together with everything else the scheduler owns.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Owner of a family of deferred tasks.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    root: CancellationToken,
}

/// Handle to one scheduled task.
#[derive(Debug)]
pub struct TaskHandle {
    token: CancellationToken,
    join: JoinHandle<bool>,
}

impl TaskHandle {
    /// Cancel the task. A no-op once the task has finished.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token guarding this task, for callers that want to keep only the
    /// cancellation side.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the task to end. Returns `true` if it ran to completion and
    /// `false` if it was cancelled first.
    pub async fn finished(self) -> bool {
        self.join.await.unwrap_or(false)
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay` unless cancelled first.
    ///
    /// Cancellation also interrupts the task while it is running, at its next
    /// suspension point.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.root.child_token();
        let guard = token.clone();

        let join = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = guard.cancelled() => {
                    debug!(name: "scheduler.task.cancelled", delay = ?delay, "Scheduled task cancelled");
                    false
                }
                () = async {
                    tokio::time::sleep(delay).await;
                    task.await;
                } => true,
            }
        });

        TaskHandle { token, join }
    }

    /// Run `task` on the next scheduling tick.
    pub fn defer<F>(&self, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.schedule(Duration::ZERO, task)
    }

    /// Cancel every task scheduled so far and any scheduled later.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }
}
