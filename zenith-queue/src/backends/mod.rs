//! Persistence for the dispatch queue
//!
//! The queue itself keeps its working set in memory; a [`QueueStore`] records
//! enough to rebuild that set after a restart. Leases are deliberately not
//! persisted, so every unacknowledged job comes back as available.

mod file;
mod memory;

use async_trait::async_trait;

pub use file::FileQueueStore;
pub use memory::MemoryQueueStore;

use crate::{BatchId, QueuedJob, Result};

#[async_trait]
pub trait QueueStore: Send + Sync + std::fmt::Debug {
    /// Every job that has not been completed, with its latest retry state
    async fn load(&self) -> Result<Vec<QueuedJob>>;

    /// Persist a whole batch in one step
    ///
    /// Either all of `jobs` are durable when this returns `Ok`, or none of
    /// them will be seen by a later [`load`](Self::load).
    async fn commit_batch(&self, batch: BatchId, jobs: &[QueuedJob]) -> Result<()>;

    /// Persist a job's retry state after a failed attempt
    async fn update(&self, job: &QueuedJob) -> Result<()>;

    /// Mark a job as finished so it is never loaded again
    async fn complete(&self, job: &QueuedJob) -> Result<()>;

    /// Reclaim space held by fully completed batches, returning how many
    /// batches were removed
    async fn compact(&self) -> Result<usize>;
}
