//! Captured message types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MailhogError, Result};

/// Unique identifier of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for MessageId {
    type Err = MailhogError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| MailhogError::Validation(format!("malformed message id '{s}'")))
    }
}

/// Parsed message headers: canonical name to values in order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, Vec<String>>);

impl Headers {
    /// Parse the header block of a raw message.
    ///
    /// Returns the headers and the byte offset where the body starts. A
    /// message without a parseable header block has no headers and a body
    /// starting at offset 0.
    pub fn parse(raw: &[u8]) -> (Self, usize) {
        match mailparse::parse_headers(raw) {
            Ok((parsed, body_offset)) => {
                let mut headers = Headers::default();
                for header in &parsed {
                    headers.append(&header.get_key(), header.get_value());
                }
                (headers, body_offset)
            }
            Err(_) => (Headers::default(), 0),
        }
    }

    /// Append a value for `name`.
    pub fn append(&mut self, name: &str, value: String) {
        self.0
            .entry(canonical_header_name(name))
            .or_default()
            .push(value);
    }

    /// All values of a header (case-insensitive name).
    pub fn get_all(&self, name: &str) -> &[String] {
        self.0
            .get(&canonical_header_name(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First value of a header (case-insensitive name).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Canonical form of a header name: `content-type` becomes `Content-Type`.
pub fn canonical_header_name(name: &str) -> String {
    name.trim()
        .split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// A captured message. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Envelope sender (empty for the null reverse-path).
    pub from: String,
    /// Envelope recipients in RCPT order.
    pub to: Vec<String>,
    /// Raw content: headers and body with CRLF line endings.
    pub raw: Vec<u8>,
    /// Parsed headers.
    pub headers: Headers,
    /// Time the message was received.
    pub received_at: DateTime<Utc>,
    /// Size of the raw content in bytes.
    pub size: usize,
    body_offset: usize,
}

impl Message {
    /// Create a newly received message with a fresh id.
    pub fn new(from: impl Into<String>, to: Vec<String>, raw: Vec<u8>) -> Self {
        Self::from_parts(MessageId::new(), from.into(), to, raw, Utc::now())
    }

    /// Rebuild a message from its stored parts.
    pub fn from_parts(
        id: MessageId,
        from: String,
        to: Vec<String>,
        raw: Vec<u8>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let (headers, body_offset) = Headers::parse(&raw);
        let size = raw.len();
        Self {
            id,
            from,
            to,
            raw,
            headers,
            received_at,
            size,
            body_offset,
        }
    }

    /// Body bytes (everything after the header block).
    pub fn body(&self) -> &[u8] {
        &self.raw[self.body_offset.min(self.raw.len())..]
    }

    /// Subject header, if present.
    pub fn subject(&self) -> Option<&str> {
        self.headers.get("Subject")
    }

    /// Short description used by listings and events.
    pub fn summary(&self) -> MessageSummary {
        MessageSummary {
            id: self.id,
            from: self.from.clone(),
            to: self.to.clone(),
            subject: self.subject().map(str::to_string),
            header_from: self.headers.get("From").map(str::to_string),
            header_to: self.headers.get_all("To").to_vec(),
            received_at: self.received_at,
            size: self.size,
        }
    }

    /// Leaf MIME parts of the message, in document order.
    pub fn mime_parts(&self) -> Result<Vec<MimePart>> {
        let parsed = mailparse::parse_mail(&self.raw)
            .map_err(|e| MailhogError::Validation(format!("unparseable MIME structure: {e}")))?;

        let mut leaves = Vec::new();
        collect_leaves(&parsed, &mut leaves);

        leaves
            .into_iter()
            .enumerate()
            .map(|(index, part)| {
                let body = part
                    .get_body_raw()
                    .map_err(|e| MailhogError::Validation(format!("part {index}: {e}")))?;
                let content_type = part.ctype.mimetype.clone();
                let text = if content_type.starts_with("text/") {
                    part.get_body().ok()
                } else {
                    None
                };
                let filename = part
                    .get_content_disposition()
                    .params
                    .get("filename")
                    .or_else(|| part.ctype.params.get("name"))
                    .cloned();
                Ok(MimePart {
                    index,
                    content_type,
                    filename,
                    size: body.len(),
                    body,
                    text,
                })
            })
            .collect()
    }

    /// Check whether the message matches a case-insensitive search.
    ///
    /// `needle` must already be lowercase.
    pub fn matches(&self, kind: SearchKind, needle: &str) -> bool {
        let contains = |s: &str| s.to_lowercase().contains(needle);
        match kind {
            SearchKind::From => {
                contains(&self.from) || self.headers.get_all("From").iter().any(|v| contains(v))
            }
            SearchKind::To => {
                self.to.iter().any(|r| contains(r))
                    || self.headers.get_all("To").iter().any(|v| contains(v))
                    || self.headers.get_all("Cc").iter().any(|v| contains(v))
            }
            SearchKind::Containing => contains(&String::from_utf8_lossy(&self.raw)),
        }
    }
}

fn collect_leaves<'a>(part: &'a mailparse::ParsedMail<'a>, out: &mut Vec<&'a mailparse::ParsedMail<'a>>) {
    if part.subparts.is_empty() {
        out.push(part);
    } else {
        for sub in &part.subparts {
            collect_leaves(sub, out);
        }
    }
}

/// Listing view of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    /// Message id.
    pub id: MessageId,
    /// Envelope sender.
    pub from: String,
    /// Envelope recipients.
    pub to: Vec<String>,
    /// Subject header.
    pub subject: Option<String>,
    /// From header.
    pub header_from: Option<String>,
    /// To header values.
    pub header_to: Vec<String>,
    /// Time the message was received.
    pub received_at: DateTime<Utc>,
    /// Size in bytes.
    pub size: usize,
}

/// A decoded leaf MIME part.
#[derive(Debug, Clone)]
pub struct MimePart {
    /// Position among the leaf parts.
    pub index: usize,
    /// MIME type, e.g. `text/plain`.
    pub content_type: String,
    /// Attachment filename, if any.
    pub filename: Option<String>,
    /// Decoded size in bytes.
    pub size: usize,
    /// Transfer-decoded body.
    pub body: Vec<u8>,
    /// Charset-decoded text for `text/*` parts.
    pub text: Option<String>,
}

/// What a search query is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// Envelope sender or From header.
    From,
    /// Envelope recipients or To/Cc headers.
    To,
    /// Raw message content.
    Containing,
}

impl FromStr for SearchKind {
    type Err = MailhogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "from" => Ok(SearchKind::From),
            "to" => Ok(SearchKind::To),
            "containing" => Ok(SearchKind::Containing),
            other => Err(MailhogError::Validation(format!(
                "unknown search kind '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &[u8] = b"Subject: hi\r\nFrom: Alice <a@x.com>\r\nTo: b@y.com\r\n\r\nhello\r\n";

    #[test]
    fn test_message_id_roundtrip_through_string() {
        let id = MessageId::new();
        let parsed: MessageId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_message_id_rejects_garbage() {
        let result = "not-an-id".parse::<MessageId>();
        assert!(matches!(result, Err(MailhogError::Validation(_))));
    }

    #[test]
    fn test_canonical_header_name() {
        assert_eq!(canonical_header_name("subject"), "Subject");
        assert_eq!(canonical_header_name("CONTENT-TYPE"), "Content-Type");
        assert_eq!(canonical_header_name("message-id"), "Message-Id");
        assert_eq!(canonical_header_name("X-Mailer"), "X-Mailer");
    }

    #[test]
    fn test_headers_parse_and_body_offset() {
        let message = Message::new("a@x.com", vec!["b@y.com".to_string()], SIMPLE.to_vec());

        assert_eq!(message.subject(), Some("hi"));
        assert_eq!(message.headers.get("from"), Some("Alice <a@x.com>"));
        assert_eq!(message.body(), b"hello\r\n");
        assert_eq!(message.size, SIMPLE.len());
    }

    #[test]
    fn test_repeated_headers_keep_order() {
        let raw = b"Received: one\r\nreceived: two\r\nRECEIVED: three\r\n\r\nbody\r\n";
        let message = Message::new("", vec!["b@y.com".to_string()], raw.to_vec());

        assert_eq!(
            message.headers.get_all("Received"),
            &["one".to_string(), "two".to_string(), "three".to_string()]
        );
        assert_eq!(message.headers.len(), 1);
    }

    #[test]
    fn test_from_parts_reproduces_headers() {
        let original = Message::new("a@x.com", vec!["b@y.com".to_string()], SIMPLE.to_vec());
        let rebuilt = Message::from_parts(
            original.id,
            original.from.clone(),
            original.to.clone(),
            original.raw.clone(),
            original.received_at,
        );
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_summary() {
        let message = Message::new("a@x.com", vec!["b@y.com".to_string()], SIMPLE.to_vec());
        let summary = message.summary();

        assert_eq!(summary.id, message.id);
        assert_eq!(summary.from, "a@x.com");
        assert_eq!(summary.to, vec!["b@y.com"]);
        assert_eq!(summary.subject.as_deref(), Some("hi"));
        assert_eq!(summary.header_from.as_deref(), Some("Alice <a@x.com>"));
        assert_eq!(summary.header_to, vec!["b@y.com"]);
    }

    #[test]
    fn test_matches() {
        let message = Message::new("a@x.com", vec!["b@y.com".to_string()], SIMPLE.to_vec());

        assert!(message.matches(SearchKind::From, "alice"));
        assert!(message.matches(SearchKind::From, "a@x"));
        assert!(!message.matches(SearchKind::From, "b@y"));
        assert!(message.matches(SearchKind::To, "b@y.com"));
        assert!(!message.matches(SearchKind::To, "a@x"));
        assert!(message.matches(SearchKind::Containing, "hello"));
        assert!(!message.matches(SearchKind::Containing, "goodbye"));
    }

    #[test]
    fn test_search_kind_from_str() {
        assert_eq!("from".parse::<SearchKind>().unwrap(), SearchKind::From);
        assert_eq!("TO".parse::<SearchKind>().unwrap(), SearchKind::To);
        assert_eq!(
            "containing".parse::<SearchKind>().unwrap(),
            SearchKind::Containing
        );
        assert!("subject".parse::<SearchKind>().is_err());
    }

    #[test]
    fn test_mime_parts_multipart() {
        let raw = concat!(
            "Subject: parts\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n",
            "\r\n",
            "--XYZ\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "plain text\r\n",
            "--XYZ\r\n",
            "Content-Type: application/octet-stream\r\n",
            "Content-Disposition: attachment; filename=\"data.bin\"\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "AAEC\r\n",
            "--XYZ--\r\n",
        );
        let message = Message::new("a@x.com", vec!["b@y.com".to_string()], raw.as_bytes().to_vec());

        let parts = message.mime_parts().unwrap();
        assert_eq!(parts.len(), 2);

        assert_eq!(parts[0].index, 0);
        assert_eq!(parts[0].content_type, "text/plain");
        assert!(parts[0].text.as_deref().unwrap().starts_with("plain text"));

        assert_eq!(parts[1].content_type, "application/octet-stream");
        assert_eq!(parts[1].filename.as_deref(), Some("data.bin"));
        assert_eq!(parts[1].body, vec![0u8, 1, 2]);
        assert!(parts[1].text.is_none());
    }

    #[test]
    fn test_mime_parts_single_part() {
        let message = Message::new("a@x.com", vec!["b@y.com".to_string()], SIMPLE.to_vec());
        let parts = message.mime_parts().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].content_type, "text/plain");
    }
}
