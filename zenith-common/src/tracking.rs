//! Tracking keys
//!
//! A tracking key is an opaque, unguessable ULID issued once per
//! (campaign, subscriber) job. It carries no structure of its own: the SENT
//! ledger entry written for the key is the row that resolves it back to the
//! campaign and subscriber, so identifiers containing any character at all
//! round-trip without ambiguity.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Length of the canonical Crockford base32 form of a ULID
const ENCODED_LEN: usize = 26;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackingKeyError {
    #[error("Malformed tracking key {0:?}: expected {ENCODED_LEN} characters, got {1}")]
    Length(String, usize),

    #[error("Malformed tracking key {0:?}: {1}")]
    Encoding(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackingKey {
    id: ulid::Ulid,
}

impl TrackingKey {
    /// Issue a fresh key
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self { id }
    }

    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }

    /// Parse the key found in a pixel URL
    ///
    /// Only the canonical 26-character form is accepted. Anything that could
    /// smuggle path components (`/`, `\`, `..`) fails the length or alphabet
    /// check before it gets anywhere near a storage backend.
    ///
    /// # Errors
    /// If `raw` is not a canonical ULID
    pub fn parse(raw: &str) -> Result<Self, TrackingKeyError> {
        if raw.len() != ENCODED_LEN {
            return Err(TrackingKeyError::Length(raw.to_string(), raw.len()));
        }

        ulid::Ulid::from_string(raw)
            .map(Self::new)
            .map_err(|e| TrackingKeyError::Encoding(raw.to_string(), e.to_string()))
    }
}

impl fmt::Display for TrackingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl FromStr for TrackingKey {
    type Err = TrackingKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for TrackingKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for TrackingKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
