//! SMTP replies.

use std::fmt;

/// A reply sent to the client: a code and one or more text lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three digit reply code.
    pub code: u16,
    /// Text lines; never empty.
    pub lines: Vec<String>,
}

impl Reply {
    /// Single line reply.
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    /// Multiline reply.
    pub fn multiline(code: u16, lines: Vec<String>) -> Self {
        if lines.is_empty() {
            return Self::new(code, "");
        }
        Self { code, lines }
    }

    /// `220` service greeting.
    pub fn greeting(hostname: &str) -> Self {
        Self::new(220, format!("{hostname} ESMTP mailhog"))
    }

    /// `250 Ok`.
    pub fn ok() -> Self {
        Self::new(250, "Ok")
    }

    /// Reply to HELO.
    pub fn helo(hostname: &str, client_domain: &str) -> Self {
        Self::new(250, format!("{hostname} Hello {client_domain}"))
    }

    /// Reply to EHLO, listing the supported extensions.
    pub fn ehlo(hostname: &str, client_domain: &str, max_size: usize) -> Self {
        Self::multiline(
            250,
            vec![
                format!("{hostname} Hello {client_domain}"),
                "PIPELINING".to_string(),
                "8BITMIME".to_string(),
                format!("SIZE {max_size}"),
            ],
        )
    }

    /// `354` intermediate reply to DATA.
    pub fn start_data() -> Self {
        Self::new(354, "End data with <CR><LF>.<CR><LF>")
    }

    /// Reply to a committed message.
    pub fn queued(id: impl fmt::Display) -> Self {
        Self::new(250, format!("Ok: queued as {id}"))
    }

    /// `221` reply to QUIT.
    pub fn bye() -> Self {
        Self::new(221, "Bye")
    }

    /// `421` service closing.
    pub fn closing(hostname: &str) -> Self {
        Self::new(
            421,
            format!("{hostname} Service not available, closing transmission channel"),
        )
    }

    /// Check if this is a positive completion reply (2xx).
    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Wire form, CRLF terminated.
    pub fn format(&self) -> String {
        let last = self.lines.len().saturating_sub(1);
        self.lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let sep = if i == last { ' ' } else { '-' };
                format!("{}{}{}\r\n", self.code, sep, line)
            })
            .collect()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.lines.join(" / "))
    }
}
