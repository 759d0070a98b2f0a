use std::sync::Arc;

use zenith_common::{
    CampaignId, CampaignStatus, CampaignStore, StoreError, TrackingKey, internal,
};
use zenith_queue::{DispatchQueue, SendJob};

use crate::{AudienceResolver, error::LaunchError};

/// Result of a successful launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub campaign_id: CampaignId,
    /// Jobs enqueued, one per recipient
    pub enqueued: usize,
}

/// Turns a campaign into one queued [`SendJob`] per recipient
#[derive(Debug, Clone)]
pub struct LaunchOrchestrator {
    campaigns: Arc<dyn CampaignStore>,
    audience: AudienceResolver,
    queue: Arc<DispatchQueue>,
}

impl LaunchOrchestrator {
    #[must_use]
    pub fn new(
        campaigns: Arc<dyn CampaignStore>,
        audience: AudienceResolver,
        queue: Arc<DispatchQueue>,
    ) -> Self {
        Self {
            campaigns,
            audience,
            queue,
        }
    }

    /// Launch a DRAFT or SCHEDULED campaign
    ///
    /// The campaign is moved to SENDING with a compare-and-set before any
    /// job is queued, so two concurrent launches cannot both enqueue. If the
    /// batch then fails to enqueue, the campaign goes back to the status it
    /// had and nothing is visible to workers. An empty audience completes the
    /// campaign straight away.
    ///
    /// # Errors
    /// [`LaunchError::NotFound`], [`LaunchError::AlreadyActive`] and
    /// [`LaunchError::AlreadyCompleted`] for precondition failures, otherwise
    /// whatever the store or the queue reported
    pub async fn launch(&self, id: &CampaignId) -> Result<LaunchReport, LaunchError> {
        let campaign = self.campaigns.campaign(id).await.map_err(from_store)?;
        if !campaign.status.is_launchable() {
            return Err(conflict(id, campaign.status));
        }

        let recipients = self.audience.resolve(&campaign).await?;
        let jobs: Vec<SendJob> = recipients
            .into_iter()
            .map(|subscriber| SendJob {
                campaign_id: campaign.id.clone(),
                subscriber_id: subscriber.id,
                email: subscriber.email,
                subject: campaign.subject.clone(),
                body: campaign.body.clone(),
                tracking_key: TrackingKey::generate(),
            })
            .collect();
        let enqueued = jobs.len();

        let previous = self
            .campaigns
            .begin_sending(id, u64::try_from(enqueued).unwrap_or(u64::MAX))
            .await
            .map_err(from_store)?;

        if jobs.is_empty() {
            self.campaigns.complete_if_drained(id).await?;
            internal!(
                level = INFO,
                campaign_id = %id,
                "Launched with an empty audience, campaign completed"
            );
            return Ok(LaunchReport {
                campaign_id: id.clone(),
                enqueued,
            });
        }

        if let Err(e) = self.queue.enqueue_batch(jobs).await {
            internal!(
                level = ERROR,
                campaign_id = %id,
                error = %e,
                "Failed to enqueue launch batch, reverting to {previous}"
            );

            if let Err(revert) = self
                .campaigns
                .transition(id, &[CampaignStatus::Sending], previous)
                .await
            {
                internal!(
                    level = ERROR,
                    campaign_id = %id,
                    error = %revert,
                    "Failed to revert campaign status"
                );
            }

            return Err(e.into());
        }

        internal!(
            level = INFO,
            campaign_id = %id,
            "Launched campaign with {enqueued} jobs"
        );

        Ok(LaunchReport {
            campaign_id: id.clone(),
            enqueued,
        })
    }
}

fn conflict(id: &CampaignId, status: CampaignStatus) -> LaunchError {
    if status == CampaignStatus::Completed {
        LaunchError::AlreadyCompleted(id.clone())
    } else {
        LaunchError::AlreadyActive(id.clone(), status)
    }
}

fn from_store(error: StoreError) -> LaunchError {
    match error {
        StoreError::CampaignNotFound(id) => LaunchError::NotFound(id),
        StoreError::StatusConflict { id, actual } => conflict(&id, actual),
        other => LaunchError::Store(other),
    }
}
