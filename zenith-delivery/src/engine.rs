use std::sync::Arc;

use tokio::sync::broadcast;
use zenith_common::{
    Campaign, CampaignId, CampaignStore, DeliveryRecord, Signal, StoreError, SubscriberStore,
    TrackingKey,
};
use zenith_queue::DispatchQueue;
use zenith_transport::TransportPool;

use crate::{
    AudienceResolver, Dispatcher, LaunchOrchestrator, LaunchReport, OpenOutcome, WorkerPool,
    control,
    error::{ControlError, LaunchError},
    ledger::{Ledger, LedgerError},
    opens,
};

/// The collaborators an [`Engine`] is assembled from
#[derive(Debug)]
pub struct EngineParts {
    pub campaigns: Arc<dyn CampaignStore>,
    pub subscribers: Arc<dyn SubscriberStore>,
    pub queue: Arc<DispatchQueue>,
    pub ledger: Arc<dyn Ledger>,
    pub transport: TransportPool,
    /// Base URL the tracking pixel is served from
    pub public_url: String,
}

/// The dispatch engine as seen from the outside
///
/// Cheap to clone; every clone shares the same queue, ledger and transport.
#[derive(Debug, Clone)]
pub struct Engine {
    campaigns: Arc<dyn CampaignStore>,
    queue: Arc<DispatchQueue>,
    ledger: Arc<dyn Ledger>,
    launcher: LaunchOrchestrator,
    dispatcher: Arc<Dispatcher>,
}

impl Engine {
    #[must_use]
    pub fn new(parts: EngineParts) -> Self {
        let EngineParts {
            campaigns,
            subscribers,
            queue,
            ledger,
            transport,
            public_url,
        } = parts;

        let launcher = LaunchOrchestrator::new(
            Arc::clone(&campaigns),
            AudienceResolver::new(subscribers),
            Arc::clone(&queue),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&campaigns),
            Arc::clone(&queue),
            Arc::clone(&ledger),
            transport,
            public_url,
        ));

        Self {
            campaigns,
            queue,
            ledger,
            launcher,
            dispatcher,
        }
    }

    #[must_use]
    pub const fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }

    #[must_use]
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// See [`LaunchOrchestrator::launch`]
    ///
    /// # Errors
    /// If the campaign cannot be launched
    pub async fn launch(&self, id: &CampaignId) -> Result<LaunchReport, LaunchError> {
        self.launcher.launch(id).await
    }

    /// See [`control::pause`]
    ///
    /// # Errors
    /// If the campaign is missing or not SENDING
    pub async fn pause(&self, id: &CampaignId) -> Result<Campaign, ControlError> {
        control::pause(&self.campaigns, &self.queue, id).await
    }

    /// See [`control::resume`]
    ///
    /// # Errors
    /// If the campaign is missing or not PAUSED
    pub async fn resume(&self, id: &CampaignId) -> Result<Campaign, ControlError> {
        control::resume(&self.campaigns, &self.queue, id).await
    }

    /// Record a tracking-pixel load; never fails
    pub async fn record_open(&self, raw_key: &str) -> OpenOutcome {
        opens::record_open(&self.ledger, &self.campaigns, raw_key).await
    }

    /// # Errors
    /// If the campaign is missing or the store cannot be read
    pub async fn campaign(&self, id: &CampaignId) -> Result<Campaign, StoreError> {
        self.campaigns.campaign(id).await
    }

    /// # Errors
    /// If the store cannot be read
    pub async fn campaigns(&self) -> Result<Vec<Campaign>, StoreError> {
        self.campaigns.campaigns().await
    }

    /// Ledger records for a tracking key, oldest first
    ///
    /// # Errors
    /// If the ledger cannot be read
    pub async fn deliveries(&self, key: &TrackingKey) -> Result<Vec<DeliveryRecord>, LedgerError> {
        self.ledger.find_by_key(key).await
    }

    /// Bring a freshly opened queue in line with the campaign store
    ///
    /// # Errors
    /// If the store cannot be read
    pub async fn recover(&self) -> Result<(), StoreError> {
        control::recover(&self.campaigns, &self.queue).await
    }

    /// Start `concurrency` workers, stopped by `shutdown`
    #[must_use]
    pub fn spawn_workers(
        &self,
        concurrency: usize,
        shutdown: &broadcast::Sender<Signal>,
    ) -> WorkerPool {
        WorkerPool::spawn(self.dispatcher(), concurrency, shutdown)
    }
}
