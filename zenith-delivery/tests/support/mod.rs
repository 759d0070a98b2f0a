//! Shared fixtures for the dispatch tests
#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use zenith_common::{
    Campaign, CampaignCounters, CampaignId, CampaignStatus, CampaignStore, Counter, MemoryStore,
    Signal, StoreError, Subscriber, SubscriberStore, TrackingKey,
};
use zenith_delivery::{Engine, EngineParts, Ledger, MemoryLedger};
use zenith_queue::{DispatchQueue, QueueStore, RetryPolicy};
use zenith_transport::{OutboundMessage, SendReceipt, Transport, TransportError, TransportPool};

pub const PUBLIC_URL: &str = "http://zenith.test";

/// How the transport treats one recipient
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Deliver,
    /// Fail transiently this many times, then deliver
    FailTimes(usize),
    FailAlways,
    Reject,
}

/// Transport whose behaviour is scripted per recipient, recording every
/// attempt and the peak number of concurrent sends
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    attempts: Mutex<HashMap<String, usize>>,
    delivered: Mutex<Vec<OutboundMessage>>,
    delay: Duration,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn script(&self, email: &str, script: Script) {
        self.scripts.lock().insert(email.to_string(), script);
    }

    pub fn attempts(&self, email: &str) -> usize {
        self.attempts.lock().get(email).copied().unwrap_or_default()
    }

    pub fn total_attempts(&self) -> usize {
        self.attempts.lock().values().sum()
    }

    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered.lock().clone()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, TransportError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let attempt = {
            let mut attempts = self.attempts.lock();
            let count = attempts.entry(message.to.clone()).or_default();
            *count += 1;
            *count
        };
        let script = self
            .scripts
            .lock()
            .get(&message.to)
            .copied()
            .unwrap_or(Script::Deliver);

        self.current.fetch_sub(1, Ordering::SeqCst);

        match script {
            Script::FailAlways => Err(TransportError::Transient(
                "451 Try again later".to_string(),
            )),
            Script::FailTimes(n) if attempt <= n => Err(TransportError::Transient(
                "421 Service not available".to_string(),
            )),
            Script::Reject => Err(TransportError::Permanent(
                "550 No such user".to_string(),
            )),
            Script::Deliver | Script::FailTimes(_) => {
                self.delivered.lock().push(message.clone());
                Ok(SendReceipt {
                    message_id: format!("<{attempt}.{}@zenith.test>", message.to),
                    response: Some("250 OK".to_string()),
                })
            }
        }
    }
}

/// A fast retry policy so exhausted jobs settle within a test
pub fn quick_retries() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 10,
        max_delay_ms: 40,
        jitter_factor: 0.0,
    }
}

pub async fn open_queue(store: Arc<dyn QueueStore>) -> Arc<DispatchQueue> {
    open_queue_with_lease(store, Duration::from_secs(120)).await
}

pub async fn open_queue_with_lease(store: Arc<dyn QueueStore>, lease: Duration) -> Arc<DispatchQueue> {
    Arc::new(
        DispatchQueue::builder()
            .store(store)
            .retry_policy(quick_retries())
            .lease_duration(lease)
            .poll_interval(Duration::from_millis(10))
            .open()
            .await
            .unwrap(),
    )
}

/// A campaign `c1` and the given subscribers
pub async fn seeded_store(subscribers: Vec<Subscriber>) -> MemoryStore {
    let store = MemoryStore::new();
    store
        .save_campaign(Campaign::draft("c1", "Spring sale", "<p>Hello</p>"))
        .await
        .unwrap();
    for subscriber in subscribers {
        store.save_subscriber(subscriber).await.unwrap();
    }
    store
}

pub fn engine(
    store: &MemoryStore,
    queue: Arc<DispatchQueue>,
    ledger: Arc<dyn Ledger>,
    transport: Arc<ScriptedTransport>,
    transport_capacity: usize,
) -> Engine {
    Engine::new(EngineParts {
        campaigns: Arc::new(store.clone()),
        subscribers: Arc::new(store.clone()),
        queue,
        ledger,
        transport: TransportPool::new(transport, transport_capacity, Duration::from_secs(5)),
        public_url: PUBLIC_URL.to_string(),
    })
}

/// Everything a scenario needs, backed by memory
pub struct Harness {
    pub store: MemoryStore,
    pub ledger: MemoryLedger,
    pub transport: Arc<ScriptedTransport>,
    pub engine: Engine,
    pub shutdown: broadcast::Sender<Signal>,
}

impl Harness {
    pub async fn new(subscribers: Vec<Subscriber>, transport: ScriptedTransport, capacity: usize) -> Self {
        Self::with_lease(subscribers, transport, capacity, Duration::from_secs(120)).await
    }

    pub async fn with_lease(
        subscribers: Vec<Subscriber>,
        transport: ScriptedTransport,
        capacity: usize,
        lease: Duration,
    ) -> Self {
        let store = seeded_store(subscribers).await;
        let ledger = MemoryLedger::new();
        let transport = Arc::new(transport);
        let queue =
            open_queue_with_lease(Arc::new(zenith_queue::MemoryQueueStore::new()), lease).await;
        let engine = engine(
            &store,
            queue,
            Arc::new(ledger.clone()),
            Arc::clone(&transport),
            capacity,
        );
        let (shutdown, _) = broadcast::channel(1);

        Self {
            store,
            ledger,
            transport,
            engine,
            shutdown,
        }
    }

    pub async fn campaign(&self) -> Campaign {
        self.store.campaign(&CampaignId::from("c1")).await.unwrap()
    }
}

/// Poll until the campaign reaches `status`
pub async fn wait_for_status(store: &MemoryStore, id: &CampaignId, status: CampaignStatus) -> Campaign {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let campaign = store.campaign(id).await.unwrap();
            if campaign.status == status {
                return campaign;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("campaign {id} never reached {status}"))
}

/// The tracking key embedded in a delivered message's pixel URL
pub fn pixel_key(message: &OutboundMessage) -> TrackingKey {
    let marker = format!("{PUBLIC_URL}/track/open/");
    let start = message.html_body.find(&marker).unwrap() + marker.len();
    TrackingKey::parse(&message.html_body[start..start + 26]).unwrap()
}

/// Campaign store whose first `failures` counter increments fail
#[derive(Debug)]
pub struct FlakyCounters {
    inner: MemoryStore,
    failures: AtomicUsize,
}

impl FlakyCounters {
    pub fn new(inner: MemoryStore, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl CampaignStore for FlakyCounters {
    async fn campaign(&self, id: &CampaignId) -> Result<Campaign, StoreError> {
        self.inner.campaign(id).await
    }

    async fn campaigns(&self) -> Result<Vec<Campaign>, StoreError> {
        self.inner.campaigns().await
    }

    async fn save_campaign(&self, campaign: Campaign) -> Result<(), StoreError> {
        self.inner.save_campaign(campaign).await
    }

    async fn begin_sending(
        &self,
        id: &CampaignId,
        enqueued: u64,
    ) -> Result<CampaignStatus, StoreError> {
        self.inner.begin_sending(id, enqueued).await
    }

    async fn transition(
        &self,
        id: &CampaignId,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<Campaign, StoreError> {
        self.inner.transition(id, from, to).await
    }

    async fn increment(
        &self,
        id: &CampaignId,
        counter: Counter,
    ) -> Result<CampaignCounters, StoreError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Io(std::io::Error::other(
                "counter update rejected",
            )));
        }
        self.inner.increment(id, counter).await
    }

    async fn complete_if_drained(&self, id: &CampaignId) -> Result<bool, StoreError> {
        self.inner.complete_if_drained(id).await
    }
}
