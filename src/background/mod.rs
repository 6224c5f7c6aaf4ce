//! Background work that must outlive the response.
//!
//! Edge hosts tear an invocation down once its response is handed back
//! unless they are told otherwise. [`BackgroundTasks`] is that "told
//! otherwise": work registered with [`BackgroundTasks::wait_until`] runs
//! detached from the response, and the host awaits [`BackgroundTasks::drain`]
//! before it tears the execution context down.

use std::future::Future;

use tokio_util::task::TaskTracker;
use tracing::debug;

/// A registry of detached tasks the host must wait for before teardown.
///
/// Cloning is cheap and every clone refers to the same registry.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use postcache::background::BackgroundTasks;
///
/// let tasks = BackgroundTasks::new();
/// let done = Arc::new(AtomicBool::new(false));
///
/// let flag = Arc::clone(&done);
/// tasks.wait_until(async move { flag.store(true, Ordering::SeqCst) });
///
/// tasks.drain().await;
/// assert!(done.load(Ordering::SeqCst));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` onto the current Tokio runtime and keeps the execution
    /// context alive until it finishes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn wait_until<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Number of registered tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for every registered task, including ones registered while
    /// waiting, then reopens the registry for further use.
    pub async fn drain(&self) {
        debug!(pending = self.tracker.len(), "draining background tasks");
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
