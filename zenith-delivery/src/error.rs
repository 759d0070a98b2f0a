use thiserror::Error;
use zenith_common::{CampaignId, CampaignStatus, StoreError};
use zenith_queue::QueueError;

use crate::ledger::LedgerError;

/// Why a launch was refused or did not go through
///
/// On any error no job of the campaign is visible to workers.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Campaign not found: {0}")]
    NotFound(CampaignId),

    /// The campaign is SENDING or PAUSED
    #[error("Campaign {0} is already {1}")]
    AlreadyActive(CampaignId, CampaignStatus),

    #[error("Campaign {0} has already completed")]
    AlreadyCompleted(CampaignId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to enqueue campaign: {0}")]
    Queue(#[from] QueueError),
}

impl LaunchError {
    /// Whether the launch was refused because of the campaign's status
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyActive(..) | Self::AlreadyCompleted(_))
    }
}

/// Pause and resume failures
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Campaign not found: {0}")]
    NotFound(CampaignId),

    #[error("Campaign {id} is {actual}, expected {expected}")]
    InvalidStatus {
        id: CampaignId,
        actual: CampaignStatus,
        expected: CampaignStatus,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Failures while settling a leased job
///
/// These never reach an API caller: the worker logs them and the lease
/// eventually expires, so the job is retried.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Worker shutdown timed out after {0:?}")]
    ShutdownTimeout(std::time::Duration),
}

pub type Result<T, E = DeliveryError> = std::result::Result<T, E>;
