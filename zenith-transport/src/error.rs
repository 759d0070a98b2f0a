use std::time::Duration;

use thiserror::Error;

use crate::smtp::ClientError;

/// Outcome of a failed send, classified for the retry policy
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Worth retrying: 4xx replies, network trouble, a closed pool
    #[error("Transient transport failure: {0}")]
    Transient(String),

    /// Not worth retrying: 5xx replies
    #[error("Permanent transport failure: {0}")]
    Permanent(String),

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !self.is_permanent()
    }

    /// Classify an SMTP reply code
    #[must_use]
    pub fn from_reply(stage: &str, code: u16, message: &str) -> Self {
        let description = format!("{stage} rejected with {code} {message}");
        if (500..600).contains(&code) {
            Self::Permanent(description)
        } else {
            Self::Transient(description)
        }
    }
}

/// Connection and protocol failures are all assumed to be transient
impl From<ClientError> for TransportError {
    fn from(error: ClientError) -> Self {
        Self::Transient(error.to_string())
    }
}
