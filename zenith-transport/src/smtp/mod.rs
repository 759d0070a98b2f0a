//! SMTP submission transport

mod client;
mod response;

use std::{io, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use zenith_common::outgoing;

pub use client::SmtpClient;
pub use response::{Reply, ReplyLine};

use crate::{OutboundMessage, SendReceipt, Sender, Transport, TransportError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse SMTP reply: {0}")]
    Parse(String),

    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Sends every message over its own SMTP session to a single relay
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    address: String,
    helo: String,
    sender: Sender,
    connect_timeout: Duration,
}

impl SmtpTransport {
    #[must_use]
    pub fn new(host: &str, port: u16, helo: impl Into<String>, sender: Sender) -> Self {
        Self {
            address: format!("{host}:{port}"),
            helo: helo.into(),
            sender,
            connect_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub const fn sender(&self) -> &Sender {
        &self.sender
    }

    async fn session(
        &self,
        client: &mut SmtpClient,
        message: &OutboundMessage,
        message_id: &str,
    ) -> std::result::Result<Reply, TransportError> {
        expect_success("Greeting", client.read_greeting().await?)?;

        let ehlo = client.ehlo(&self.helo).await?;
        if !ehlo.is_success() {
            expect_success("HELO", client.helo(&self.helo).await?)?;
        }

        expect_success("MAIL FROM", client.mail_from(&self.sender.address).await?)?;
        expect_success("RCPT TO", client.rcpt_to(&message.to).await?)?;

        let data = client.data().await?;
        if !data.is_intermediate() {
            return Err(TransportError::from_reply("DATA", data.code, &data.text()));
        }

        let rendered = message.render(&self.sender, message_id, Utc::now());
        expect_success("Message", client.send_data(&rendered).await?)
    }
}

fn expect_success(stage: &str, reply: Reply) -> std::result::Result<Reply, TransportError> {
    if reply.is_success() {
        Ok(reply)
    } else {
        Err(TransportError::from_reply(stage, reply.code, &reply.text()))
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, message: &OutboundMessage) -> std::result::Result<SendReceipt, TransportError> {
        let message_id = self.sender.generate_message_id();
        let mut client = SmtpClient::connect(&self.address, self.connect_timeout).await?;

        let outcome = self.session(&mut client, message, &message_id).await;

        // The message is already accepted or rejected by now
        if let Err(e) = client.quit().await {
            outgoing!(level = DEBUG, "QUIT to {} failed: {e}", self.address);
        }

        let reply = outcome?;
        outgoing!(
            level = DEBUG,
            "Relay {} accepted {message_id}: {} {}",
            self.address,
            reply.code,
            reply.text()
        );

        Ok(SendReceipt {
            message_id,
            response: Some(format!("{} {}", reply.code, reply.text())),
        })
    }
}
