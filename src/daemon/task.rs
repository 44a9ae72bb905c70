//! Background loops with an explicit stop.

use std::future::Future;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a spawned background loop.
///
/// [`stop`](TaskHandle::stop) signals the loop and waits for it to finish.
/// Dropping the handle without stopping aborts the task, so a loop never
/// outlives its owner.
pub struct TaskHandle {
    name: &'static str,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Spawn `body` with a receiver that fires when the handle is stopped.
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(body(shutdown_rx));
        debug!("Started background task '{}'", name);
        Self {
            name,
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signal the loop to exit and wait for it.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!("Background task '{}' ended abnormally: {}", self.name, e);
            }
        }
        debug!("Stopped background task '{}'", self.name);
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
