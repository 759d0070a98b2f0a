//! Shared building blocks for the zenith dispatch engine
//!
//! - [`model`]: campaigns, subscribers and delivery records
//! - [`tracking`]: opaque tracking keys embedded in delivered messages
//! - [`store`]: the storage collaborator traits with file and in-memory backends
//! - [`logging`]: subscriber setup and the `internal!`/`incoming!`/`outgoing!` macros

pub mod logging;
pub mod model;
pub mod store;
pub mod tracking;

pub use model::{
    Campaign, CampaignCounters, CampaignId, CampaignStatus, Counter, DeliveryRecord,
    DeliveryStatus, Subscriber, SubscriberId, SubscriberStatus,
};
pub use store::{
    CampaignStore, FileStore, MemoryStore, Seed, StoreBackend, StoreError, Stores, SubscriberStore,
};
pub use tracing;
pub use tracking::{TrackingKey, TrackingKeyError};

/// Process-wide lifecycle signal broadcast to every long-running task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}

/// Milliseconds since the Unix epoch for the current wall clock
///
/// Used for anything that has to survive a restart (retry schedules,
/// enqueue times), where an `Instant` would be meaningless.
#[must_use]
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
