use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::QueueStore;
use crate::{BatchId, JobId, QueuedJob, Result};

/// Queue persistence held in process memory
///
/// Nothing survives the process, but clones share their contents, so a test
/// can drop a queue and reopen another over the same store to observe what a
/// restart would restore.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueStore {
    jobs: Arc<RwLock<HashMap<JobId, QueuedJob>>>,
}

impl MemoryQueueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn load(&self) -> Result<Vec<QueuedJob>> {
        let mut jobs: Vec<_> = self.jobs.read().values().cloned().collect();
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }

    async fn commit_batch(&self, _batch: BatchId, jobs: &[QueuedJob]) -> Result<()> {
        let mut stored = self.jobs.write();
        for job in jobs {
            stored.insert(job.id, job.clone());
        }
        Ok(())
    }

    async fn update(&self, job: &QueuedJob) -> Result<()> {
        if let Some(stored) = self.jobs.write().get_mut(&job.id) {
            stored.clone_from(job);
        }
        Ok(())
    }

    async fn complete(&self, job: &QueuedJob) -> Result<()> {
        self.jobs.write().remove(&job.id);
        Ok(())
    }

    async fn compact(&self) -> Result<usize> {
        Ok(0)
    }
}
