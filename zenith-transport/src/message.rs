//! Outbound message composition

use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Envelope sender and `From` header
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Sender {
    pub address: String,
    pub name: String,
}

impl Default for Sender {
    fn default() -> Self {
        Self {
            address: "no-reply@localhost".to_string(),
            name: "Zenith".to_string(),
        }
    }
}

impl Sender {
    /// Domain part of the address, used for generated `Message-ID`s
    #[must_use]
    pub fn domain(&self) -> &str {
        self.address
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty())
            .unwrap_or("localhost")
    }

    /// A fresh globally unique `Message-ID`, angle brackets included
    #[must_use]
    pub fn generate_message_id(&self) -> String {
        format!("<{}@{}>", ulid::Ulid::new(), self.domain())
    }

    fn mailbox(&self) -> String {
        if self.name.is_empty() {
            format!("<{}>", self.address)
        } else {
            format!(
                "\"{}\" <{}>",
                sanitise(&self.name).replace('"', "'"),
                self.address
            )
        }
    }
}

/// One HTML message to one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    /// Extra headers, written in order after the standard ones
    pub headers: Vec<(String, String)>,
}

impl OutboundMessage {
    #[must_use]
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html_body: html_body.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Render the full RFC 5322 message, CRLF line endings throughout
    ///
    /// Header values have CR and LF stripped so nothing from a campaign or a
    /// subscriber record can inject extra headers.
    #[must_use]
    pub fn render(&self, sender: &Sender, message_id: &str, date: DateTime<Utc>) -> String {
        let mut message = String::with_capacity(self.html_body.len() + 512);

        let _ = write!(message, "From: {}\r\n", sender.mailbox());
        let _ = write!(message, "To: <{}>\r\n", sanitise(&self.to));
        let _ = write!(message, "Subject: {}\r\n", sanitise(&self.subject));
        let _ = write!(message, "Date: {}\r\n", date.to_rfc2822());
        let _ = write!(message, "Message-ID: {message_id}\r\n");
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/html; charset=utf-8\r\n");
        message.push_str("Content-Transfer-Encoding: 8bit\r\n");

        for (name, value) in &self.headers {
            let _ = write!(message, "{}: {}\r\n", sanitise(name), sanitise(value));
        }

        message.push_str("\r\n");

        for line in self.html_body.lines() {
            message.push_str(line);
            message.push_str("\r\n");
        }

        message
    }
}

fn sanitise(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}
