use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{sync::broadcast, task::JoinHandle};
use zenith_common::{Signal, internal};

use crate::{Dispatcher, error::DeliveryError};

/// A fixed number of workers sharing one [`Dispatcher`]
///
/// Worker count only bounds how many jobs are in progress; how many sends
/// actually run at once is bounded by the transport pool, which is usually
/// much smaller.
#[derive(Debug)]
pub struct WorkerPool {
    shutdown: broadcast::Sender<Signal>,
    handles: Vec<JoinHandle<()>>,
    running: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawn `concurrency` workers, each listening on `shutdown`
    #[must_use]
    pub fn spawn(
        dispatcher: Arc<Dispatcher>,
        concurrency: usize,
        shutdown: &broadcast::Sender<Signal>,
    ) -> Self {
        let concurrency = concurrency.max(1);
        let running = Arc::new(AtomicUsize::new(0));

        internal!(level = INFO, "Spawning {concurrency} delivery workers");

        let handles = (0..concurrency)
            .map(|worker| {
                let dispatcher = Arc::clone(&dispatcher);
                let running = Arc::clone(&running);
                let receiver = shutdown.subscribe();

                running.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    dispatcher.run(worker, receiver).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        Self {
            shutdown: shutdown.clone(),
            handles,
            running,
        }
    }

    /// Workers that have not stopped yet
    #[must_use]
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Shared counter of running workers, for health checks
    #[must_use]
    pub fn running_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.running)
    }

    /// Tell every worker to stop and wait for in-flight jobs to finish
    ///
    /// Jobs still running when `timeout` passes keep their lease until it
    /// expires; after a restart they are simply handed out again.
    ///
    /// # Errors
    /// [`DeliveryError::ShutdownTimeout`] if the workers did not stop in time
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<(), DeliveryError> {
        internal!(
            level = INFO,
            "Stopping {} delivery workers, waiting up to {timeout:?}",
            self.handles.len()
        );

        // Workers may already have seen a process-wide signal
        let _ = self.shutdown.send(Signal::Shutdown);

        let handles = std::mem::take(&mut self.handles);
        let join_all = async {
            for (worker, handle) in handles.into_iter().enumerate() {
                if let Err(e) = handle.await {
                    internal!(level = ERROR, "Worker {worker} panicked: {e}");
                }
            }
        };

        if tokio::time::timeout(timeout, join_all).await.is_err() {
            internal!(
                level = WARN,
                "{} workers still busy after {timeout:?}, their jobs will be redelivered",
                self.running()
            );
            return Err(DeliveryError::ShutdownTimeout(timeout));
        }

        internal!(level = INFO, "All delivery workers stopped");
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.handles.iter().any(|handle| !handle.is_finished()) {
            internal!(
                level = WARN,
                "Worker pool dropped without shutdown_graceful, signalling workers to stop"
            );
            let _ = self.shutdown.send(Signal::Shutdown);
        }
    }
}
