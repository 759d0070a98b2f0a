//! Minimal SMTP client for submitting one message per connection

use std::time::Duration;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use zenith_common::outgoing;

use super::{ClientError, Result, response::Reply};

const BUFFER_SIZE: usize = 8192;

/// Largest reply we are prepared to buffer
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug)]
pub struct SmtpClient {
    stream: TcpStream,
    buffer: Vec<u8>,
    filled: usize,
}

impl SmtpClient {
    /// # Errors
    /// If the connection cannot be established within `connect_timeout`
    pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout(addr.to_string()))??;

        Ok(Self {
            stream,
            buffer: vec![0u8; BUFFER_SIZE],
            filled: 0,
        })
    }

    pub async fn read_greeting(&mut self) -> Result<Reply> {
        self.read_reply().await
    }

    /// Send one command line and wait for the reply
    pub async fn command(&mut self, command: &str) -> Result<Reply> {
        outgoing!(level = TRACE, "{command}");
        self.stream
            .write_all(format!("{command}\r\n").as_bytes())
            .await?;
        self.read_reply().await
    }

    pub async fn ehlo(&mut self, domain: &str) -> Result<Reply> {
        self.command(&format!("EHLO {domain}")).await
    }

    pub async fn helo(&mut self, domain: &str) -> Result<Reply> {
        self.command(&format!("HELO {domain}")).await
    }

    pub async fn mail_from(&mut self, from: &str) -> Result<Reply> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    pub async fn rcpt_to(&mut self, to: &str) -> Result<Reply> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    pub async fn data(&mut self) -> Result<Reply> {
        self.command("DATA").await
    }

    /// Send the message content and the terminating `.` line
    ///
    /// Lines starting with `.` are dot-stuffed, bare LFs become CRLF.
    pub async fn send_data(&mut self, data: &str) -> Result<Reply> {
        let mut payload = String::with_capacity(data.len() + 16);
        for line in data.lines() {
            if line.starts_with('.') {
                payload.push('.');
            }
            payload.push_str(line);
            payload.push_str("\r\n");
        }
        payload.push_str(".\r\n");

        outgoing!(level = TRACE, "<{} bytes of message data>", payload.len());
        self.stream.write_all(payload.as_bytes()).await?;
        self.read_reply().await
    }

    pub async fn quit(&mut self) -> Result<Reply> {
        self.command("QUIT").await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            if let Some((reply, consumed)) = Reply::parse(&self.buffer[..self.filled])? {
                self.buffer.copy_within(consumed..self.filled, 0);
                self.filled -= consumed;

                outgoing!(level = TRACE, "{} {}", reply.code, reply.text());
                return Ok(reply);
            }

            if self.filled == self.buffer.len() {
                let grown = self.buffer.len() * 2;
                if grown > MAX_BUFFER_SIZE {
                    return Err(ClientError::Parse(format!(
                        "Reply too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(grown, 0);
            }

            let read = self.stream.read(&mut self.buffer[self.filled..]).await?;
            if read == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            self.filled += read;
        }
    }
}
