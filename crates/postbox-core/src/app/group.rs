use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle over a set of background loops.
/// - every loop selects on a [`ShutdownSignal`] taken from the group
/// - dropping the group stops all loops as well
/// - `shutdown_and_join()` waits until every loop has returned
pub struct TaskGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl TaskGroup {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            joins: Vec::new(),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.shutdown_tx.subscribe(),
        }
    }

    pub fn spawn<F>(&mut self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.joins.push(tokio::spawn(fut));
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Ask every loop to stop. No new rows are taken; a row in its publish
    /// retry schedule is handed back, an in-flight handler call finishes.
    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Shutdown and wait for all loops.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            if let Err(e) = j.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`TaskGroup`]'s shutdown request.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested or the group is gone.
    pub async fn recv(&mut self) {
        // Err means the sender was dropped, which counts as shutdown too.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}
