use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::Serialize;
use zenith_common::internal;

/// Readiness of the engine's moving parts
#[derive(Debug)]
pub struct HealthChecker {
    /// The dispatch queue has been opened and its backlog loaded
    queue_ready: AtomicBool,

    /// The worker pool is running
    workers_ready: AtomicBool,

    /// Jobs waiting or in flight, as last observed
    queue_depth: AtomicUsize,

    max_queue_depth: usize,
}

impl HealthChecker {
    #[must_use]
    pub const fn new(max_queue_depth: usize) -> Self {
        Self {
            queue_ready: AtomicBool::new(false),
            workers_ready: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            max_queue_depth,
        }
    }

    pub fn set_queue_ready(&self, ready: bool) {
        self.queue_ready.store(ready, Ordering::Relaxed);
        internal!(level = DEBUG, ready, "Queue readiness updated");
    }

    pub fn set_workers_ready(&self, ready: bool) {
        self.workers_ready.store(ready, Ordering::Relaxed);
        internal!(level = DEBUG, ready, "Worker readiness updated");
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    /// Answering at all is proof of life
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        true
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status().ready
    }

    #[must_use]
    pub fn status(&self) -> HealthStatus {
        let queue_ready = self.queue_ready.load(Ordering::Relaxed);
        let workers_ready = self.workers_ready.load(Ordering::Relaxed);
        let queue_depth = self.queue_depth.load(Ordering::Relaxed);

        HealthStatus {
            alive: self.is_alive(),
            ready: queue_ready && workers_ready && queue_depth < self.max_queue_depth,
            queue_ready,
            workers_ready,
            queue_depth,
            max_queue_depth: self.max_queue_depth,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "One flag per component keeps the probe output readable"
)]
pub struct HealthStatus {
    pub alive: bool,
    pub ready: bool,
    pub queue_ready: bool,
    pub workers_ready: bool,
    pub queue_depth: usize,
    pub max_queue_depth: usize,
}
