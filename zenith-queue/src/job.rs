use std::fmt;

use serde::{Deserialize, Serialize};
use zenith_common::{CampaignId, SubscriberId, TrackingKey};

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            id: ulid::Ulid,
        }

        impl $name {
            #[must_use]
            pub fn generate() -> Self {
                Self {
                    id: ulid::Ulid::new(),
                }
            }

            #[must_use]
            pub const fn ulid(&self) -> ulid::Ulid {
                self.id
            }

            /// Parse an id from a file name such as `01ARZ3NDEKTSV4RRFFQ69G5FAV.batch`
            ///
            /// Rejects anything with path separators or traversal components,
            /// and anything whose stem is not a ULID.
            pub(crate) fn from_filename(filename: &str, extension: &str) -> Option<Self> {
                if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
                    return None;
                }

                let stem = filename.strip_suffix(extension)?.strip_suffix('.')?;
                let id = ulid::Ulid::from_string(stem).ok()?;

                Some(Self { id })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.id)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.id.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                ulid::Ulid::from_string(&s)
                    .map(|id| Self { id })
                    .map_err(serde::de::Error::custom)
            }
        }
    };
}

ulid_id!(
    /// Identifier of a queued job, ordered by admission time
    JobId
);

ulid_id!(
    /// Identifier of a batch admitted by a single `enqueue_batch` call
    BatchId
);

ulid_id!(
    /// Proof of holding a job; settled exactly once by `ack` or `nack`
    LeaseToken
);

/// One message to one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendJob {
    pub campaign_id: CampaignId,
    pub subscriber_id: SubscriberId,
    pub email: String,
    pub subject: String,
    /// Campaign body, before the tracking pixel is appended
    pub body: String,
    pub tracking_key: TrackingKey,
}

/// A [`SendJob`] together with its queue bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub batch: BatchId,
    pub job: SendJob,
    /// Failed attempts so far
    pub attempts: u32,
    /// Wall-clock milliseconds before which the job is not handed out
    pub available_at_ms: u64,
    pub enqueued_at_ms: u64,
    pub last_error: Option<String>,
}

impl QueuedJob {
    #[must_use]
    pub fn new(batch: BatchId, job: SendJob, now_ms: u64) -> Self {
        Self {
            id: JobId::generate(),
            batch,
            job,
            attempts: 0,
            available_at_ms: now_ms,
            enqueued_at_ms: now_ms,
            last_error: None,
        }
    }

    /// The 1-based number of the attempt a worker holding this job is making
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempts + 1
    }
}
