use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;

use super::{CampaignStore, Result, StoreError, SubscriberStore};
use crate::{
    internal,
    model::{
        Campaign, CampaignCounters, CampaignId, CampaignStatus, Counter, Subscriber, SubscriberId,
    },
};

/// Initial campaigns and subscribers, read from a RON file
///
/// ```ron
/// (
///     campaigns: [
///         (id: "spring", subject: "Spring sale", body: "<p>Hi</p>", status: DRAFT),
///     ],
///     subscribers: [
///         (id: "s1", email: "someone@example.com", status: ACTIVE),
///     ],
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,
}

impl Seed {
    /// Read a RON seed file
    ///
    /// # Errors
    /// If the file cannot be read or does not parse as a [`Seed`]
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let seed: Self = ron::from_str(&contents)
            .map_err(|e| StoreError::Seed(format!("{}: {e}", path.display())))?;

        internal!(
            level = INFO,
            "Read {} campaigns and {} subscribers from {}",
            seed.campaigns.len(),
            seed.subscribers.len(),
            path.display()
        );

        Ok(seed)
    }
}

/// In-memory campaign and subscriber store
///
/// Each campaign row lives in its own `DashMap` entry; every mutation runs
/// under that entry's write guard, which is what makes counter increments and
/// the completion check atomic per campaign.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    campaigns: Arc<DashMap<CampaignId, Campaign>>,
    subscribers: Arc<DashMap<SubscriberId, Subscriber>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_seed(seed: Seed) -> Self {
        let store = Self::new();
        for campaign in seed.campaigns {
            store.campaigns.insert(campaign.id.clone(), campaign);
        }
        for subscriber in seed.subscribers {
            store.subscribers.insert(subscriber.id.clone(), subscriber);
        }
        store
    }

}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn campaign(&self, id: &CampaignId) -> Result<Campaign> {
        self.campaigns
            .get(id)
            .map(|c| c.clone())
            .ok_or_else(|| StoreError::CampaignNotFound(id.clone()))
    }

    async fn campaigns(&self) -> Result<Vec<Campaign>> {
        let mut campaigns: Vec<_> = self.campaigns.iter().map(|c| c.clone()).collect();
        campaigns.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(campaigns)
    }

    async fn save_campaign(&self, campaign: Campaign) -> Result<()> {
        self.campaigns.insert(campaign.id.clone(), campaign);
        Ok(())
    }

    async fn begin_sending(&self, id: &CampaignId, enqueued: u64) -> Result<CampaignStatus> {
        let mut campaign = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| StoreError::CampaignNotFound(id.clone()))?;

        let previous = campaign.status;
        if !previous.is_launchable() {
            return Err(StoreError::StatusConflict {
                id: id.clone(),
                actual: previous,
            });
        }

        campaign.status = CampaignStatus::Sending;
        campaign.enqueued_count = enqueued;
        campaign.launched_at = Some(Utc::now());
        campaign.completed_at = None;

        Ok(previous)
    }

    async fn transition(
        &self,
        id: &CampaignId,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<Campaign> {
        let mut campaign = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| StoreError::CampaignNotFound(id.clone()))?;

        if !from.contains(&campaign.status) {
            return Err(StoreError::StatusConflict {
                id: id.clone(),
                actual: campaign.status,
            });
        }

        campaign.status = to;
        if to == CampaignStatus::Completed {
            campaign.completed_at = Some(Utc::now());
        }

        Ok(campaign.clone())
    }

    async fn increment(&self, id: &CampaignId, counter: Counter) -> Result<CampaignCounters> {
        let mut campaign = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| StoreError::CampaignNotFound(id.clone()))?;

        counter.bump(&mut campaign.counters);
        Ok(campaign.counters)
    }

    async fn complete_if_drained(&self, id: &CampaignId) -> Result<bool> {
        let mut campaign = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| StoreError::CampaignNotFound(id.clone()))?;

        if campaign.status != CampaignStatus::Sending || !campaign.is_drained() {
            return Ok(false);
        }

        campaign.status = CampaignStatus::Completed;
        campaign.completed_at = Some(Utc::now());
        Ok(true)
    }
}

#[async_trait]
impl SubscriberStore for MemoryStore {
    async fn subscriber(&self, id: &SubscriberId) -> Result<Subscriber> {
        self.subscribers
            .get(id)
            .map(|s| s.clone())
            .ok_or_else(|| StoreError::SubscriberNotFound(id.clone()))
    }

    async fn subscribers(&self) -> Result<Vec<Subscriber>> {
        let mut subscribers: Vec<_> = self.subscribers.iter().map(|s| s.clone()).collect();
        subscribers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(subscribers)
    }

    async fn save_subscriber(&self, subscriber: Subscriber) -> Result<()> {
        self.subscribers.insert(subscriber.id.clone(), subscriber);
        Ok(())
    }
}
