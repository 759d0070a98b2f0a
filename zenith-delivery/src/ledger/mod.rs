//! Delivery ledger
//!
//! An append-only log of [`DeliveryRecord`]s keyed by tracking key. Writes
//! are idempotent: a second terminal record (SENT or FAILED) for a key is
//! reported as a [`AppendOutcome::Duplicate`] and not stored, which is what
//! lets an at-least-once queue redeliver a job without sending it twice.
//! Counter updates are guarded separately by count claims.

mod config;
mod file;
mod memory;

use std::io;

use async_trait::async_trait;
use thiserror::Error;
use zenith_common::{DeliveryRecord, DeliveryStatus, TrackingKey};

pub use config::LedgerConfig;
pub use file::FileLedger;
pub use memory::MemoryLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to encode ledger record: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Failed to decode ledger record: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// What [`Ledger::append`] did with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record was stored
    ///
    /// `first_of_status` is set when no earlier record of the same status
    /// exists for the key.
    Recorded { first_of_status: bool },

    /// A terminal record already exists for the key; nothing was stored
    Duplicate,
}

impl AppendOutcome {
    /// Whether this was the first record of its status for the key
    #[must_use]
    pub const fn is_first(self) -> bool {
        matches!(
            self,
            Self::Recorded {
                first_of_status: true
            }
        )
    }
}

#[async_trait]
pub trait Ledger: Send + Sync + std::fmt::Debug {
    /// Append a record, never overwriting an existing one
    ///
    /// Terminal records are insert-if-absent across both terminal statuses:
    /// at most one SENT-or-FAILED record exists per key.
    async fn append(&self, record: DeliveryRecord) -> Result<AppendOutcome>;

    /// Claim the right to count `status` for `key` on a campaign counter
    ///
    /// Returns `true` for exactly one caller per key and status until the
    /// claim is released. Counting is driven by the claim rather than by
    /// [`AppendOutcome::is_first`], so a count that failed after its record
    /// was appended is still made by whoever handles the key next.
    async fn claim_count(&self, key: &TrackingKey, status: DeliveryStatus) -> Result<bool>;

    /// Give back a claim whose counter update failed
    async fn release_count(&self, key: &TrackingKey, status: DeliveryStatus) -> Result<()>;

    /// Every record for `key`, oldest first
    async fn find_by_key(&self, key: &TrackingKey) -> Result<Vec<DeliveryRecord>>;

    /// The SENT or FAILED record for `key`, if one was written
    async fn terminal(&self, key: &TrackingKey) -> Result<Option<DeliveryRecord>> {
        Ok(self
            .find_by_key(key)
            .await?
            .into_iter()
            .find(|record| record.status.is_terminal()))
    }

    /// The SENT record for `key`, if one was written
    async fn sent(&self, key: &TrackingKey) -> Result<Option<DeliveryRecord>> {
        Ok(self
            .terminal(key)
            .await?
            .filter(|record| record.status == DeliveryStatus::Sent))
    }
}
