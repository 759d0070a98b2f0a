//! Domain model shared by the dispatch engine and its collaborators

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracking::TrackingKey;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a campaign, as issued by the relational store
    CampaignId
);

string_id!(
    /// Identifier of a subscriber, as issued by the relational store
    SubscriberId
);

/// Lifecycle of a campaign
///
/// ```text
/// DRAFT/SCHEDULED --launch--> SENDING --all jobs terminal--> COMPLETED
///                               ^   |
///                        resume |   | pause
///                               |   v
///                              PAUSED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Completed,
    Paused,
}

impl CampaignStatus {
    /// Only DRAFT and SCHEDULED campaigns may be launched
    #[must_use]
    pub const fn is_launchable(self) -> bool {
        matches!(self, Self::Draft | Self::Scheduled)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "DRAFT",
            Self::Scheduled => "SCHEDULED",
            Self::Sending => "SENDING",
            Self::Completed => "COMPLETED",
            Self::Paused => "PAUSED",
        };
        f.write_str(s)
    }
}

/// Aggregate delivery counters of a campaign
///
/// All three only ever grow, and only through
/// [`CampaignStore::increment`](crate::store::CampaignStore::increment).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCounters {
    pub sent_count: u64,
    pub failed_count: u64,
    pub open_count: u64,
}

impl CampaignCounters {
    /// Jobs that have reached a terminal outcome
    #[must_use]
    pub const fn processed(&self) -> u64 {
        self.sent_count + self.failed_count
    }
}

/// One of the campaign counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Sent,
    Failed,
    Opened,
}

impl Counter {
    pub(crate) fn bump(self, counters: &mut CampaignCounters) {
        match self {
            Self::Sent => counters.sent_count += 1,
            Self::Failed => counters.failed_count += 1,
            Self::Opened => counters.open_count += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: CampaignId,
    #[serde(default)]
    pub name: String,
    pub subject: String,
    /// HTML body, sent as-is with the tracking pixel appended
    pub body: String,
    pub status: CampaignStatus,
    /// Restricts the audience to subscribers carrying this tag
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub counters: CampaignCounters,
    /// Number of jobs enqueued by the most recent launch
    #[serde(default)]
    pub enqueued_count: u64,
    #[serde(default)]
    pub launched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// A fresh draft with zeroed counters
    #[must_use]
    pub fn draft(id: impl Into<CampaignId>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            subject: subject.into(),
            body: body.into(),
            status: CampaignStatus::Draft,
            audience: None,
            counters: CampaignCounters::default(),
            enqueued_count: 0,
            launched_at: None,
            completed_at: None,
        }
    }

    /// Whether every enqueued job has reached a terminal outcome
    #[must_use]
    pub const fn is_drained(&self) -> bool {
        self.counters.processed() >= self.enqueued_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriberStatus {
    Active,
    Unsubscribed,
    Bounced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: SubscriberId,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub status: SubscriberStatus,
}

impl Subscriber {
    #[must_use]
    pub fn active(id: impl Into<SubscriberId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            tags: Vec::new(),
            status: SubscriberStatus::Active,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: SubscriberStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self.status, SubscriberStatus::Active)
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Status carried by a ledger entry
///
/// `Sent` and `Failed` are terminal and mutually exclusive per tracking key.
/// `Opened` is additive and may only follow `Sent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Sent,
    Opened,
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sent => "SENT",
            Self::Opened => "OPENED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Append-only ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub tracking_key: TrackingKey,
    pub campaign_id: CampaignId,
    pub subscriber_id: SubscriberId,
    pub status: DeliveryStatus,
    pub recorded_at: DateTime<Utc>,
    /// Message id handed back by the transport
    #[serde(default)]
    pub provider_message_id: Option<String>,
    /// Number of send attempts made when the record was written
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl DeliveryRecord {
    #[must_use]
    pub fn new(
        tracking_key: TrackingKey,
        campaign_id: CampaignId,
        subscriber_id: SubscriberId,
        status: DeliveryStatus,
    ) -> Self {
        Self {
            tracking_key,
            campaign_id,
            subscriber_id,
            status,
            recorded_at: Utc::now(),
            provider_message_id: None,
            attempts: 0,
            error: None,
        }
    }

    #[must_use]
    pub fn with_provider_message_id(mut self, id: impl Into<String>) -> Self {
        self.provider_message_id = Some(id.into());
        self
    }

    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// The OPENED entry that follows this record
    #[must_use]
    pub fn opened(&self) -> Self {
        Self::new(
            self.tracking_key,
            self.campaign_id.clone(),
            self.subscriber_id.clone(),
            DeliveryStatus::Opened,
        )
    }
}
