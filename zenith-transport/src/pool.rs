use std::{sync::Arc, time::Duration};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{OutboundMessage, SendReceipt, Transport, TransportError};

/// A transport shared by every worker, with a fixed number of send slots
///
/// Workers beyond `capacity` wait for a slot instead of opening more
/// connections. The timeout covers the send itself, not the wait.
#[derive(Debug, Clone)]
pub struct TransportPool {
    transport: Arc<dyn Transport>,
    slots: Arc<Semaphore>,
    capacity: usize,
    send_timeout: Duration,
}

impl TransportPool {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, capacity: usize, send_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            transport,
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            send_timeout,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently reserved, whether or not a send is under way
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Wait for a free slot and hold it until the returned [`SendSlot`] is
    /// dropped
    ///
    /// # Errors
    /// [`TransportError::Transient`] if the pool has been closed
    pub async fn reserve(&self) -> Result<SendSlot, TransportError> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| TransportError::Transient("Transport pool is closed".to_string()))?;

        Ok(SendSlot {
            transport: Arc::clone(&self.transport),
            send_timeout: self.send_timeout,
            _permit: permit,
        })
    }

    /// Wait for a free slot, then send within the configured timeout
    ///
    /// # Errors
    /// Whatever the transport reports, or [`TransportError::Timeout`]
    pub async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, TransportError> {
        self.reserve().await?.send(message).await
    }

    /// Stop handing out slots; sends already holding one finish normally
    pub fn close(&self) {
        self.slots.close();
    }
}

/// One reserved send slot of a [`TransportPool`]
#[derive(Debug)]
pub struct SendSlot {
    transport: Arc<dyn Transport>,
    send_timeout: Duration,
    _permit: OwnedSemaphorePermit,
}

impl SendSlot {
    /// Send within the pool's timeout, releasing the slot afterwards
    ///
    /// # Errors
    /// Whatever the transport reports, or [`TransportError::Timeout`]
    pub async fn send(self, message: &OutboundMessage) -> Result<SendReceipt, TransportError> {
        tokio::time::timeout(self.send_timeout, self.transport.send(message))
            .await
            .map_err(|_| TransportError::Timeout(self.send_timeout))?
    }
}
