//! Open tracking
//!
//! A pixel load is reported by tracking key. The key resolves through its
//! SENT ledger record; every open is recorded, and the key is counted once.
//! An open whose count failed leaves the key uncounted, so a later open
//! counts it.

use std::sync::Arc;

use zenith_common::{CampaignStore, Counter, DeliveryStatus, TrackingKey, internal};

use crate::{DeliveryError, ledger::Ledger};

/// What recording an open did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// First open for the key; `openCount` was incremented
    First,
    /// The key had been opened before; recorded, not counted
    Repeat,
    /// Well-formed key without a SENT record
    Untracked,
    /// Not a tracking key at all
    Malformed,
    /// The ledger or the store failed; nothing is guaranteed to be recorded
    Failed,
}

/// Record a pixel load for `raw_key`
///
/// Never fails: anything that goes wrong is logged and reported through the
/// outcome, since the caller must answer with the pixel regardless.
pub async fn record_open(
    ledger: &Arc<dyn Ledger>,
    campaigns: &Arc<dyn CampaignStore>,
    raw_key: &str,
) -> OpenOutcome {
    let key = match TrackingKey::parse(raw_key) {
        Ok(key) => key,
        Err(e) => {
            internal!(level = DEBUG, error = %e, "Ignoring open");
            return OpenOutcome::Malformed;
        }
    };

    match try_record_open(ledger, campaigns, key).await {
        Ok(outcome) => outcome,
        Err(e) => {
            internal!(
                level = ERROR,
                tracking_key = %key,
                error = %e,
                "Failed to record open"
            );
            OpenOutcome::Failed
        }
    }
}

async fn try_record_open(
    ledger: &Arc<dyn Ledger>,
    campaigns: &Arc<dyn CampaignStore>,
    key: TrackingKey,
) -> Result<OpenOutcome, DeliveryError> {
    let Some(sent) = ledger.sent(&key).await? else {
        internal!(level = DEBUG, tracking_key = %key, "Open for a key that was never sent");
        return Ok(OpenOutcome::Untracked);
    };

    ledger.append(sent.opened()).await?;

    if !ledger.claim_count(&key, DeliveryStatus::Opened).await? {
        internal!(
            level = TRACE,
            campaign_id = %sent.campaign_id,
            tracking_key = %key,
            "Repeat open"
        );
        return Ok(OpenOutcome::Repeat);
    }

    if let Err(e) = campaigns.increment(&sent.campaign_id, Counter::Opened).await {
        ledger.release_count(&key, DeliveryStatus::Opened).await?;
        return Err(e.into());
    }
    internal!(
        level = DEBUG,
        campaign_id = %sent.campaign_id,
        tracking_key = %key,
        "First open"
    );

    Ok(OpenOutcome::First)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use zenith_common::{Campaign, CampaignId, DeliveryRecord, MemoryStore, SubscriberId};

    use super::*;
    use crate::MemoryLedger;

    async fn setup() -> (MemoryStore, MemoryLedger, Arc<dyn Ledger>, Arc<dyn CampaignStore>) {
        let store = MemoryStore::new();
        store
            .save_campaign(Campaign::draft("c1", "Subject", "<p>Body</p>"))
            .await
            .unwrap();
        let ledger = MemoryLedger::new();
        (
            store.clone(),
            ledger.clone(),
            Arc::new(ledger),
            Arc::new(store),
        )
    }

    fn record(key: TrackingKey, status: DeliveryStatus) -> DeliveryRecord {
        DeliveryRecord::new(key, CampaignId::from("c1"), SubscriberId::from("s1"), status)
    }

    #[tokio::test]
    async fn test_first_open_counts_once() {
        let (store, memory, ledger, campaigns) = setup().await;
        let key = TrackingKey::generate();
        ledger.append(record(key, DeliveryStatus::Sent)).await.unwrap();

        let raw = key.to_string();
        assert_eq!(record_open(&ledger, &campaigns, &raw).await, OpenOutcome::First);
        assert_eq!(record_open(&ledger, &campaigns, &raw).await, OpenOutcome::Repeat);

        let campaign = store.campaign(&CampaignId::from("c1")).await.unwrap();
        assert_eq!(campaign.counters.open_count, 1);
        assert_eq!(memory.len(), 3, "both opens are in the ledger");
    }

    #[tokio::test]
    async fn test_malformed_key_mutates_nothing() {
        let (store, memory, ledger, campaigns) = setup().await;

        for raw in ["c1-s1", "", "../../etc/passwd", "01ARZ3NDEKTSV4RRFFQ69G5FA!"] {
            assert_eq!(
                record_open(&ledger, &campaigns, raw).await,
                OpenOutcome::Malformed
            );
        }

        assert!(memory.is_empty());
        let campaign = store.campaign(&CampaignId::from("c1")).await.unwrap();
        assert_eq!(campaign.counters.open_count, 0);
    }

    #[tokio::test]
    async fn test_unsent_and_failed_keys_are_untracked() {
        let (store, _memory, ledger, campaigns) = setup().await;

        let unknown = TrackingKey::generate().to_string();
        assert_eq!(
            record_open(&ledger, &campaigns, &unknown).await,
            OpenOutcome::Untracked
        );

        let failed = TrackingKey::generate();
        ledger
            .append(record(failed, DeliveryStatus::Failed))
            .await
            .unwrap();
        assert_eq!(
            record_open(&ledger, &campaigns, &failed.to_string()).await,
            OpenOutcome::Untracked
        );

        let campaign = store.campaign(&CampaignId::from("c1")).await.unwrap();
        assert_eq!(campaign.counters.open_count, 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed_and_counted_later() {
        let (_store, _memory, ledger, _campaigns) = setup().await;
        let key = TrackingKey::generate();
        // SENT record for a campaign the store does not know
        ledger
            .append(DeliveryRecord::new(
                key,
                CampaignId::from("gone"),
                SubscriberId::from("s1"),
                DeliveryStatus::Sent,
            ))
            .await
            .unwrap();

        let store = MemoryStore::new();
        let campaigns: Arc<dyn CampaignStore> = Arc::new(store.clone());
        assert_eq!(
            record_open(&ledger, &campaigns, &key.to_string()).await,
            OpenOutcome::Failed
        );

        store
            .save_campaign(Campaign::draft("gone", "Subject", "<p>Body</p>"))
            .await
            .unwrap();
        assert_eq!(
            record_open(&ledger, &campaigns, &key.to_string()).await,
            OpenOutcome::First
        );
        assert_eq!(
            record_open(&ledger, &campaigns, &key.to_string()).await,
            OpenOutcome::Repeat
        );

        let campaign = store.campaign(&CampaignId::from("gone")).await.unwrap();
        assert_eq!(campaign.counters.open_count, 1);
    }
}
