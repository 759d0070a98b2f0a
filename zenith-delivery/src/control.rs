//! Pausing and resuming campaigns

use std::sync::Arc;

use zenith_common::{Campaign, CampaignId, CampaignStatus, CampaignStore, StoreError, internal};
use zenith_queue::DispatchQueue;

use crate::error::ControlError;

/// SENDING to PAUSED; the queue stops handing out the campaign's jobs
///
/// Jobs already leased run to completion and are counted as usual.
///
/// # Errors
/// [`ControlError::NotFound`], or [`ControlError::InvalidStatus`] if the
/// campaign is not SENDING
pub async fn pause(
    campaigns: &Arc<dyn CampaignStore>,
    queue: &DispatchQueue,
    id: &CampaignId,
) -> Result<Campaign, ControlError> {
    let campaign = campaigns
        .transition(id, &[CampaignStatus::Sending], CampaignStatus::Paused)
        .await
        .map_err(|e| from_store(e, CampaignStatus::Sending))?;

    queue.pause(id);
    internal!(level = INFO, campaign_id = %id, "Campaign paused");

    Ok(campaign)
}

/// PAUSED to SENDING; held jobs become available again
///
/// Completion is checked straight away, since the last in-flight jobs may
/// have finished while the campaign was paused.
///
/// # Errors
/// [`ControlError::NotFound`], or [`ControlError::InvalidStatus`] if the
/// campaign is not PAUSED
pub async fn resume(
    campaigns: &Arc<dyn CampaignStore>,
    queue: &DispatchQueue,
    id: &CampaignId,
) -> Result<Campaign, ControlError> {
    campaigns
        .transition(id, &[CampaignStatus::Paused], CampaignStatus::Sending)
        .await
        .map_err(|e| from_store(e, CampaignStatus::Paused))?;

    queue.resume(id);
    if campaigns.complete_if_drained(id).await? {
        internal!(level = INFO, campaign_id = %id, "Campaign completed on resume");
    } else {
        internal!(level = INFO, campaign_id = %id, "Campaign resumed");
    }

    Ok(campaigns.campaign(id).await?)
}

/// Re-apply pauses to a freshly opened queue and finish campaigns whose
/// last job was settled just before a crash
///
/// # Errors
/// If the campaign store cannot be read
pub async fn recover(
    campaigns: &Arc<dyn CampaignStore>,
    queue: &DispatchQueue,
) -> Result<(), StoreError> {
    for campaign in campaigns.campaigns().await? {
        match campaign.status {
            CampaignStatus::Paused => {
                queue.pause(&campaign.id);
            }
            CampaignStatus::Sending => {
                if campaigns.complete_if_drained(&campaign.id).await? {
                    internal!(
                        level = INFO,
                        campaign_id = %campaign.id,
                        "Campaign completed during recovery"
                    );
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn from_store(error: StoreError, expected: CampaignStatus) -> ControlError {
    match error {
        StoreError::CampaignNotFound(id) => ControlError::NotFound(id),
        StoreError::StatusConflict { id, actual } => ControlError::InvalidStatus {
            id,
            actual,
            expected,
        },
        other => ControlError::Store(other),
    }
}
