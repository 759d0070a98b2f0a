//! Storage collaborators
//!
//! Campaigns and subscribers live in an external relational store. The
//! engine only needs the handful of operations below, and every mutation the
//! dispatch path depends on (counter increments, status transitions, the
//! completion check) must be atomic per campaign.
//!
//! [`FileStore`] keeps rows on disk so campaign state survives a restart;
//! [`MemoryStore`] is for tests and throwaway local runs.

mod config;
mod file;
mod memory;

use std::io;

use async_trait::async_trait;
use thiserror::Error;

pub use config::{StoreBackend, Stores};
pub use file::FileStore;
pub use memory::{MemoryStore, Seed};

use crate::model::{
    Campaign, CampaignCounters, CampaignId, CampaignStatus, Counter, Subscriber, SubscriberId,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(SubscriberId),

    /// A compare-and-set transition found the campaign in another status
    #[error("Campaign {id} is {actual}")]
    StatusConflict {
        id: CampaignId,
        actual: CampaignStatus,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid seed file: {0}")]
    Seed(String),

    #[error("Failed to encode or decode a stored row: {0}")]
    Serialization(String),

    #[error("Invalid store path: {0}")]
    InvalidPath(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait CampaignStore: Send + Sync + std::fmt::Debug {
    async fn campaign(&self, id: &CampaignId) -> Result<Campaign>;

    /// All campaigns, ordered by id
    async fn campaigns(&self) -> Result<Vec<Campaign>>;

    async fn save_campaign(&self, campaign: Campaign) -> Result<()>;

    /// Move a launchable campaign to SENDING and record the size of the launch
    ///
    /// Returns the status the campaign was in, so the caller can roll back if
    /// enqueueing fails.
    ///
    /// # Errors
    /// [`StoreError::StatusConflict`] if the campaign is not DRAFT or SCHEDULED
    async fn begin_sending(&self, id: &CampaignId, enqueued: u64) -> Result<CampaignStatus>;

    /// Atomically move a campaign from any of `from` to `to`
    async fn transition(
        &self,
        id: &CampaignId,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<Campaign>;

    /// Atomically bump one counter, returning the counters after the bump
    async fn increment(&self, id: &CampaignId, counter: Counter) -> Result<CampaignCounters>;

    /// Move a SENDING campaign whose jobs have all reached a terminal outcome
    /// to COMPLETED
    ///
    /// The check and the transition are one atomic step, so when several
    /// workers finish the last jobs concurrently exactly one of them observes
    /// `true`.
    async fn complete_if_drained(&self, id: &CampaignId) -> Result<bool>;
}

#[async_trait]
pub trait SubscriberStore: Send + Sync + std::fmt::Debug {
    async fn subscriber(&self, id: &SubscriberId) -> Result<Subscriber>;

    /// All subscribers, ordered by id
    async fn subscribers(&self) -> Result<Vec<Subscriber>>;

    async fn save_subscriber(&self, subscriber: Subscriber) -> Result<()>;
}
