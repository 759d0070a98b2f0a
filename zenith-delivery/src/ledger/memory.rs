use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use zenith_common::{DeliveryRecord, DeliveryStatus, TrackingKey};

use super::{AppendOutcome, Ledger, Result};

/// Ledger held in memory, one entry per tracking key
///
/// The per-key entry guard serialises appends for a key, so the
/// insert-if-absent check and the insert are a single step.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    records: Arc<DashMap<TrackingKey, Vec<DeliveryRecord>>>,
    counted: Arc<DashSet<(TrackingKey, DeliveryStatus)>>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.iter().map(|entry| entry.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record, grouped by key in no particular order
    #[must_use]
    pub fn records(&self) -> Vec<DeliveryRecord> {
        self.records
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn append(&self, record: DeliveryRecord) -> Result<AppendOutcome> {
        let mut entry = self.records.entry(record.tracking_key).or_default();

        if record.status.is_terminal() && entry.iter().any(|r| r.status.is_terminal()) {
            return Ok(AppendOutcome::Duplicate);
        }

        let first_of_status = !entry.iter().any(|r| r.status == record.status);
        entry.push(record);

        Ok(AppendOutcome::Recorded { first_of_status })
    }

    async fn claim_count(&self, key: &TrackingKey, status: DeliveryStatus) -> Result<bool> {
        Ok(self.counted.insert((*key, status)))
    }

    async fn release_count(&self, key: &TrackingKey, status: DeliveryStatus) -> Result<()> {
        self.counted.remove(&(*key, status));
        Ok(())
    }

    async fn find_by_key(&self, key: &TrackingKey) -> Result<Vec<DeliveryRecord>> {
        Ok(self
            .records
            .get(key)
            .map(|records| records.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use zenith_common::{CampaignId, SubscriberId};

    use super::*;

    fn record(key: TrackingKey, status: DeliveryStatus) -> DeliveryRecord {
        DeliveryRecord::new(key, CampaignId::from("c1"), SubscriberId::from("s1"), status)
    }

    #[tokio::test]
    async fn test_terminal_records_are_insert_if_absent() {
        let ledger = MemoryLedger::new();
        let key = TrackingKey::generate();

        assert!(
            ledger
                .append(record(key, DeliveryStatus::Sent))
                .await
                .unwrap()
                .is_first()
        );
        assert_eq!(
            ledger.append(record(key, DeliveryStatus::Sent)).await.unwrap(),
            AppendOutcome::Duplicate
        );
        assert_eq!(
            ledger
                .append(record(key, DeliveryStatus::Failed))
                .await
                .unwrap(),
            AppendOutcome::Duplicate
        );

        assert_eq!(ledger.len(), 1);
        assert_eq!(
            ledger.terminal(&key).await.unwrap().unwrap().status,
            DeliveryStatus::Sent
        );
    }

    #[tokio::test]
    async fn test_opens_are_all_kept() {
        let ledger = MemoryLedger::new();
        let key = TrackingKey::generate();
        let sent = record(key, DeliveryStatus::Sent);
        ledger.append(sent.clone()).await.unwrap();

        assert_eq!(
            ledger.append(sent.opened()).await.unwrap(),
            AppendOutcome::Recorded {
                first_of_status: true
            }
        );
        assert_eq!(
            ledger.append(sent.opened()).await.unwrap(),
            AppendOutcome::Recorded {
                first_of_status: false
            }
        );

        let statuses: Vec<_> = ledger
            .find_by_key(&key)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                DeliveryStatus::Sent,
                DeliveryStatus::Opened,
                DeliveryStatus::Opened
            ]
        );
    }

    #[tokio::test]
    async fn test_sent_ignores_failed() {
        let ledger = MemoryLedger::new();
        let key = TrackingKey::generate();
        ledger
            .append(record(key, DeliveryStatus::Failed))
            .await
            .unwrap();

        assert!(ledger.sent(&key).await.unwrap().is_none());
        assert!(ledger.terminal(&key).await.unwrap().is_some());
        assert!(
            ledger
                .find_by_key(&TrackingKey::generate())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_count_claim_is_single_until_released() {
        let ledger = MemoryLedger::new();
        let key = TrackingKey::generate();

        assert!(ledger.claim_count(&key, DeliveryStatus::Sent).await.unwrap());
        assert!(!ledger.claim_count(&key, DeliveryStatus::Sent).await.unwrap());
        assert!(ledger.claim_count(&key, DeliveryStatus::Opened).await.unwrap());

        ledger.release_count(&key, DeliveryStatus::Sent).await.unwrap();
        assert!(ledger.claim_count(&key, DeliveryStatus::Sent).await.unwrap());
    }
}
