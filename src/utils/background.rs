//! Tracked fire-and-forget tasks.
use std::{future::Future, panic::AssertUnwindSafe};

use futures_util::FutureExt;
use tokio_util::task::TaskTracker;

use crate::{metrics, utils::panic_message};

/// Set of outstanding background tasks.
///
/// A task is counted from the moment [`BackgroundTasks::spawn`] returns until
/// its body finishes, fails or panics. Failures and panics are logged and
/// never reach the caller.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        metrics::background_task_started();
        self.tracker.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => tracing::debug!(task = name, "Background task finished"),
                Ok(Err(e)) => tracing::error!(task = name, error = ?e, "Background task failed"),
                Err(panic) => tracing::error!(
                    task = name,
                    panic = %panic_message(panic.as_ref()),
                    "Background task panicked"
                ),
            }
            metrics::background_task_finished();
        });
    }

    /// Number of tasks that have not finished yet.
    pub fn active_count(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every spawned task has finished. Tasks spawned while
    /// waiting are waited for as well.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
