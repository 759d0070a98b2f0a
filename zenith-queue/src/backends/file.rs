use std::{
    collections::HashSet,
    io::{Error, ErrorKind},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::fs;
use zenith_common::internal;

use super::QueueStore;
use crate::{BatchId, JobId, QueueError, QueuedJob, Result};

const BATCHES: &str = "batches";
const JOBS: &str = "jobs";
const TEMP_PREFIX: &str = ".tmp_";
const DELETED_SUFFIX: &str = ".deleted";

/// Queue persistence in a directory tree
///
/// ```text
/// {path}/batches/{batch}.batch   every job of one enqueue_batch call (bincode)
/// {path}/jobs/{job}.state        latest retry state of a job that has failed
/// {path}/jobs/{job}.done         tombstone for a finished job
/// ```
///
/// Batch and state files are written to a `.tmp_` sibling and renamed into
/// place, so a crash mid-write leaves either the old contents or the new ones,
/// never a torn file. Batch files are never rewritten; once every job in a
/// batch has a tombstone, [`compact`](QueueStore::compact) removes the batch
/// together with its tombstones.
#[derive(Debug, Clone)]
pub struct FileQueueStore {
    path: PathBuf,
}

impl Default for FileQueueStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/spool/zenith/queue"),
        }
    }
}

impl FileQueueStore {
    /// # Errors
    /// If the path is relative, contains `..`, or points into a system directory
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        Self::validate_path(&path)?;
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn validate_path(path: &Path) -> Result<()> {
        if path
            .components()
            .any(|component| component == std::path::Component::ParentDir)
        {
            return Err(QueueError::Validation(format!(
                "Queue path cannot contain '..' components: {}",
                path.display()
            )));
        }

        if !path.is_absolute() {
            return Err(QueueError::Validation(format!(
                "Queue path must be absolute: {}",
                path.display()
            )));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        if let Some(prefix) = sensitive_prefixes
            .iter()
            .find(|prefix| path.starts_with(prefix))
        {
            return Err(QueueError::Validation(format!(
                "Queue path cannot be in system directory {prefix}: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Create the directory layout and clear out leftovers of interrupted
    /// writes and deletes
    ///
    /// # Errors
    /// If the directories cannot be created, or the path exists and is not a
    /// directory
    pub fn init(&self) -> Result<()> {
        internal!("Initialising queue store at {}", self.path.display());

        if self.path.try_exists()? && !self.path.is_dir() {
            return Err(Error::new(
                ErrorKind::NotADirectory,
                format!(
                    "Expected {} to be a Directory, but it is not",
                    self.path.display()
                ),
            )
            .into());
        }

        let mut cleaned = 0;
        for dir in [self.batches_dir(), self.jobs_dir()] {
            std::fs::create_dir_all(&dir)?;

            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let filename = entry.file_name();
                let filename = filename.to_string_lossy();

                if filename.starts_with(TEMP_PREFIX) || filename.ends_with(DELETED_SUFFIX) {
                    std::fs::remove_file(entry.path())?;
                    cleaned += 1;
                }
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned files from the queue store"
            );
        }

        Ok(())
    }

    fn batches_dir(&self) -> PathBuf {
        self.path.join(BATCHES)
    }

    fn jobs_dir(&self) -> PathBuf {
        self.path.join(JOBS)
    }

    fn batch_path(&self, batch: BatchId) -> PathBuf {
        self.batches_dir().join(format!("{batch}.batch"))
    }

    fn state_path(&self, job: JobId) -> PathBuf {
        self.jobs_dir().join(format!("{job}.state"))
    }

    fn done_path(&self, job: JobId) -> PathBuf {
        self.jobs_dir().join(format!("{job}.done"))
    }

    async fn write_atomic(dir: &Path, filename: &str, contents: &[u8]) -> Result<()> {
        let temp = dir.join(format!("{TEMP_PREFIX}{filename}"));
        fs::write(&temp, contents).await?;
        fs::rename(&temp, dir.join(filename)).await?;
        Ok(())
    }

    async fn read_decoded<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let bytes = fs::read(path).await?;
        let (value, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
        Ok(value)
    }

    async fn remove_if_present(path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn read_batches(&self) -> Result<Vec<(BatchId, Vec<QueuedJob>)>> {
        let mut entries = fs::read_dir(self.batches_dir()).await?;
        let mut batches = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            if let Some(batch) = BatchId::from_filename(&filename.to_string_lossy(), "batch") {
                let jobs: Vec<QueuedJob> = Self::read_decoded(&entry.path()).await?;
                batches.push((batch, jobs));
            }
        }

        batches.sort_by_key(|(batch, _)| *batch);
        Ok(batches)
    }

    /// Tombstoned job ids, and the job ids carrying a retry state file
    async fn scan_jobs(&self) -> Result<(HashSet<JobId>, HashSet<JobId>)> {
        let mut entries = fs::read_dir(self.jobs_dir()).await?;
        let mut done = HashSet::new();
        let mut states = HashSet::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if let Some(job) = JobId::from_filename(&filename, "done") {
                done.insert(job);
            } else if let Some(job) = JobId::from_filename(&filename, "state") {
                states.insert(job);
            }
        }

        Ok((done, states))
    }
}

#[async_trait]
impl QueueStore for FileQueueStore {
    async fn load(&self) -> Result<Vec<QueuedJob>> {
        let (done, states) = self.scan_jobs().await?;
        let mut jobs = Vec::new();

        for (_, batch) in self.read_batches().await? {
            for job in batch {
                if done.contains(&job.id) {
                    continue;
                }

                if states.contains(&job.id) {
                    jobs.push(Self::read_decoded(&self.state_path(job.id)).await?);
                } else {
                    jobs.push(job);
                }
            }
        }

        jobs.sort_by_key(|job: &QueuedJob| job.id);

        internal!(
            level = DEBUG,
            "Loaded {} outstanding jobs from {}",
            jobs.len(),
            self.path.display()
        );

        Ok(jobs)
    }

    async fn commit_batch(&self, batch: BatchId, jobs: &[QueuedJob]) -> Result<()> {
        if fs::try_exists(self.batch_path(batch)).await? {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("Batch {batch} has already been committed"),
            )
            .into());
        }

        let encoded = bincode::serde::encode_to_vec(jobs, bincode::config::standard())?;
        Self::write_atomic(&self.batches_dir(), &format!("{batch}.batch"), &encoded).await?;

        internal!(
            level = DEBUG,
            "Committed batch {batch} with {} jobs",
            jobs.len()
        );

        Ok(())
    }

    async fn update(&self, job: &QueuedJob) -> Result<()> {
        let encoded = bincode::serde::encode_to_vec(job, bincode::config::standard())?;
        Self::write_atomic(&self.jobs_dir(), &format!("{}.state", job.id), &encoded).await
    }

    async fn complete(&self, job: &QueuedJob) -> Result<()> {
        fs::write(self.done_path(job.id), b"").await?;
        Self::remove_if_present(&self.state_path(job.id)).await
    }

    async fn compact(&self) -> Result<usize> {
        let (done, _) = self.scan_jobs().await?;
        let mut live = HashSet::new();
        let mut removed = 0;

        for (batch, jobs) in self.read_batches().await? {
            if jobs.iter().all(|job| done.contains(&job.id)) {
                let path = self.batch_path(batch);
                let deleted = path.with_extension(format!("batch{DELETED_SUFFIX}"));
                fs::rename(&path, &deleted).await?;
                fs::remove_file(&deleted).await?;
                removed += 1;
            } else {
                live.extend(jobs.iter().map(|job| job.id));
            }
        }

        // Tombstones and state files only matter while their batch exists
        let (done, states) = self.scan_jobs().await?;
        for job in done.iter().chain(states.iter()) {
            if !live.contains(job) {
                Self::remove_if_present(&self.done_path(*job)).await?;
                Self::remove_if_present(&self.state_path(*job)).await?;
            }
        }

        if removed > 0 {
            internal!(
                level = INFO,
                "Compacted {removed} completed batches from {}",
                self.path.display()
            );
        }

        Ok(removed)
    }
}
