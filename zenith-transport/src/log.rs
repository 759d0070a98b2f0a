use async_trait::async_trait;
use zenith_common::outgoing;

use crate::{OutboundMessage, SendReceipt, Sender, Transport, TransportError};

/// Accepts every message and only logs it
///
/// For local runs where nothing should leave the machine.
#[derive(Debug, Clone, Default)]
pub struct LogTransport {
    sender: Sender,
}

impl LogTransport {
    #[must_use]
    pub const fn new(sender: Sender) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, TransportError> {
        let message_id = self.sender.generate_message_id();

        outgoing!(
            level = INFO,
            "Would send {message_id} from {} to {} ({} bytes): {}",
            self.sender.address,
            message.to,
            message.html_body.len(),
            message.subject
        );

        Ok(SendReceipt {
            message_id,
            response: None,
        })
    }
}
