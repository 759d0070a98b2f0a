//! SMTP reply parsing

use super::{ClientError, Result};

/// One line of a (possibly multi-line) reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    pub code: u16,
    /// `false` for `250-...` continuation lines
    pub is_last: bool,
    pub text: String,
}

/// A complete SMTP reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All lines joined with spaces
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    #[must_use]
    pub const fn is_transient_failure(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    #[must_use]
    pub const fn is_permanent_failure(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// # Errors
    /// If the line does not start with a three digit code followed by a
    /// space, a dash, or nothing
    pub fn parse_line(line: &str) -> Result<ReplyLine> {
        let code = line
            .get(..3)
            .ok_or_else(|| ClientError::Parse(format!("Reply line too short: '{line}'")))?;
        let code = code
            .parse::<u16>()
            .map_err(|_| ClientError::Parse(format!("Invalid reply code: '{code}'")))?;

        let is_last = match line.as_bytes().get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(other) => {
                return Err(ClientError::Parse(format!(
                    "Invalid separator character: '{}'",
                    char::from(*other)
                )));
            }
        };

        Ok(ReplyLine {
            code,
            is_last,
            text: line.get(4..).unwrap_or_default().to_string(),
        })
    }

    /// Parse one complete reply from the front of `buffer`
    ///
    /// Returns the reply and the number of bytes it occupied, or `None` if
    /// the buffer does not yet hold a complete reply.
    ///
    /// # Errors
    /// If a line is malformed, or the lines of a multi-line reply disagree on
    /// the code
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut lines = Vec::new();
        let mut consumed = 0;
        let mut code = None;

        while let Some(end) = buffer[consumed..].iter().position(|b| *b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let line = Self::parse_line(std::str::from_utf8(raw)?)?;
            match code {
                Some(expected) if expected != line.code => {
                    return Err(ClientError::Parse(format!(
                        "Reply code mismatch in multi-line reply: expected {expected}, got {}",
                        line.code
                    )));
                }
                Some(_) => {}
                None => code = Some(line.code),
            }

            lines.push(line.text);

            if line.is_last {
                return Ok(code.map(|code| (Self::new(code, lines), consumed)));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_single_line() {
        assert_eq!(
            Reply::parse_line("220 mail.example.com ESMTP").unwrap(),
            ReplyLine {
                code: 220,
                is_last: true,
                text: "mail.example.com ESMTP".to_string(),
            }
        );
        assert!(Reply::parse_line("250").unwrap().is_last);
    }

    #[test]
    fn test_parse_continuation() {
        let line = Reply::parse_line("250-PIPELINING").unwrap();
        assert!(!line.is_last);
        assert_eq!(line.text, "PIPELINING");
    }

    #[test]
    fn test_parse_line_errors() {
        assert!(Reply::parse_line("25").is_err());
        assert!(Reply::parse_line("abc hello").is_err());
        assert!(Reply::parse_line("250+hello").is_err());
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let buffer = b"250-mail.example.com\r\n250-SIZE 10000\r\n250 8BITMIME\r\n354 next";
        let (reply, consumed) = Reply::parse(buffer).unwrap().unwrap();

        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines, vec!["mail.example.com", "SIZE 10000", "8BITMIME"]);
        assert_eq!(consumed, buffer.len() - "354 next".len());
        assert!(reply.is_success());
    }

    #[test]
    fn test_parse_incomplete_reply() {
        assert_eq!(Reply::parse(b"250-mail.example.com\r\n250 SI").unwrap(), None);
        assert_eq!(Reply::parse(b"").unwrap(), None);
    }

    #[test]
    fn test_parse_code_mismatch() {
        assert!(Reply::parse(b"250-first\r\n251 second\r\n").is_err());
    }

    #[test]
    fn test_reply_classes() {
        assert!(Reply::new(354, vec![]).is_intermediate());
        assert!(Reply::new(421, vec![]).is_transient_failure());
        assert!(Reply::new(550, vec![]).is_permanent_failure());
        assert!(!Reply::new(550, vec![]).is_success());
    }
}
