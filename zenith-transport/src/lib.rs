//! Mail transport
//!
//! [`Transport`] is the seam between the dispatch engine and whatever
//! actually delivers mail. [`TransportPool`] wraps one transport with a fixed
//! number of send slots and a per-send timeout; it is the engine's main
//! backpressure point.

pub mod config;
pub mod error;
pub mod log;
pub mod message;
pub mod pool;
pub mod smtp;

use async_trait::async_trait;

pub use config::{SmtpConfig, TransportConfig};
pub use error::TransportError;
pub use log::LogTransport;
pub use message::{OutboundMessage, Sender};
pub use pool::{SendSlot, TransportPool};
pub use smtp::SmtpTransport;

/// What the transport hands back for an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// The `Message-ID` the message was sent with
    pub message_id: String,
    /// Final reply from the remote end, if there was one
    pub response: Option<String>,
}

#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Deliver one message
    ///
    /// # Errors
    /// [`TransportError::Permanent`] when retrying cannot help (the remote
    /// end rejected the recipient or the message outright), otherwise
    /// [`TransportError::Transient`]
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, TransportError>;
}
