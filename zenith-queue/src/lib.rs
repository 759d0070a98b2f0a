//! Dispatch queue
//!
//! A durable work queue of per-recipient [`SendJob`]s. Jobs are admitted in
//! batches that become visible all at once, handed out under a lease so only
//! one worker holds a job at a time, and re-queued with exponential backoff
//! when a worker reports a failure. Anything not acknowledged before a crash
//! reappears when the queue is reopened.

pub mod backends;
pub mod config;
pub mod error;
pub mod job;
pub mod queue;
pub mod retry;

pub use backends::{FileQueueStore, MemoryQueueStore, QueueStore};
pub use config::QueueConfig;
pub use error::{QueueError, Result, SerializationError};
pub use job::{BatchId, JobId, LeaseToken, QueuedJob, SendJob};
pub use queue::{DispatchQueue, DispatchQueueBuilder, Lease, NackOutcome, QueueStats};
pub use retry::RetryPolicy;
