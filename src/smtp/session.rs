//! SMTP session state machine.
//!
//! [`Session`] performs no I/O: the connection driver feeds it parsed
//! commands and DATA lines and writes back the replies it returns.

use super::command::Command;
use super::error::SmtpError;
use super::reply::Reply;

/// Protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Awaiting HELO/EHLO.
    Greet,
    /// Awaiting MAIL FROM.
    Mail,
    /// Sender set, awaiting RCPT TO or DATA.
    Rcpt,
    /// Collecting message content.
    Data,
    /// Transaction committed or discarded; behaves like `Mail`.
    Done,
}

/// Per-session limits.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Maximum message size in bytes.
    pub max_message_size: usize,
    /// Maximum recipients per transaction.
    pub max_recipients: usize,
}

/// A completed transaction, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Reverse-path; empty for the null sender.
    pub from: String,
    /// Forward-paths in RCPT order.
    pub to: Vec<String>,
    /// Dot-unstuffed content with CRLF line endings.
    pub raw: Vec<u8>,
}

/// Result of feeding one line to a session in DATA state.
#[derive(Debug, PartialEq, Eq)]
pub enum DataLine {
    /// More content expected.
    More,
    /// Terminator received; the transaction is ready to store.
    Complete(Envelope),
    /// Terminator received after the size limit was exceeded.
    TooLarge(Reply),
}

/// State of one SMTP connection.
#[derive(Debug)]
pub struct Session {
    hostname: String,
    limits: SessionLimits,
    state: SessionState,
    client_domain: Option<String>,
    from: Option<String>,
    to: Vec<String>,
    data: Vec<u8>,
    oversized: bool,
}

impl Session {
    /// Create a session for a new connection.
    pub fn new(hostname: impl Into<String>, limits: SessionLimits) -> Self {
        Self {
            hostname: hostname.into(),
            limits,
            state: SessionState::Greet,
            client_domain: None,
            from: None,
            to: Vec::new(),
            data: Vec::new(),
            oversized: false,
        }
    }

    /// Greeting sent when the connection opens.
    pub fn greeting(&self) -> Reply {
        Reply::greeting(&self.hostname)
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Domain given in HELO/EHLO.
    pub fn client_domain(&self) -> Option<&str> {
        self.client_domain.as_deref()
    }

    /// Current sender.
    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref()
    }

    /// Current recipients.
    pub fn recipients(&self) -> &[String] {
        &self.to
    }

    /// Apply a command.
    ///
    /// On error the session is left exactly as it was.
    pub fn handle(&mut self, command: Command) -> Result<Reply, SmtpError> {
        match command {
            Command::Helo(domain) => {
                let reply = Reply::helo(&self.hostname, &domain);
                self.greeted(domain);
                Ok(reply)
            }
            Command::Ehlo(domain) => {
                let reply = Reply::ehlo(&self.hostname, &domain, self.limits.max_message_size);
                self.greeted(domain);
                Ok(reply)
            }
            Command::Mail { from, size } => self.mail(from, size),
            Command::Rcpt(to) => self.rcpt(to),
            Command::Data => self.data(),
            Command::Rset => {
                self.reset_transaction();
                Ok(Reply::ok())
            }
            Command::Noop => Ok(Reply::ok()),
            Command::Quit => Ok(Reply::bye()),
            Command::Vrfy => Ok(Reply::new(
                252,
                "Cannot VRFY user, but will accept message and attempt delivery",
            )),
            Command::Help => Ok(Reply::new(
                214,
                "Commands: HELO EHLO MAIL RCPT DATA RSET NOOP QUIT VRFY HELP",
            )),
        }
    }

    fn greeted(&mut self, domain: String) {
        self.client_domain = Some(domain);
        self.reset_transaction();
    }

    fn mail(&mut self, from: String, size: Option<usize>) -> Result<Reply, SmtpError> {
        match self.state {
            SessionState::Mail | SessionState::Done => {}
            SessionState::Greet => {
                return Err(SmtpError::BadSequence("send HELO/EHLO first".to_string()))
            }
            SessionState::Rcpt | SessionState::Data => {
                return Err(SmtpError::BadSequence("nested MAIL command".to_string()))
            }
        }
        if size.is_some_and(|size| size > self.limits.max_message_size) {
            return Err(SmtpError::MessageTooLarge {
                max: self.limits.max_message_size,
            });
        }

        self.from = Some(from);
        self.to.clear();
        self.state = SessionState::Rcpt;
        Ok(Reply::ok())
    }

    fn rcpt(&mut self, to: String) -> Result<Reply, SmtpError> {
        if self.state != SessionState::Rcpt {
            return Err(SmtpError::BadSequence("need MAIL before RCPT".to_string()));
        }
        if self.to.len() >= self.limits.max_recipients {
            return Err(SmtpError::TooManyRecipients {
                max: self.limits.max_recipients,
            });
        }

        self.to.push(to);
        Ok(Reply::ok())
    }

    fn data(&mut self) -> Result<Reply, SmtpError> {
        if self.state != SessionState::Rcpt || self.to.is_empty() {
            return Err(SmtpError::BadSequence("need RCPT before DATA".to_string()));
        }

        self.data.clear();
        self.oversized = false;
        self.state = SessionState::Data;
        Ok(Reply::start_data())
    }

    /// Record that a DATA line was too long to buffer.
    pub fn mark_oversized(&mut self) {
        self.oversized = true;
        self.data = Vec::new();
    }

    /// Feed one DATA line, with or without its line ending.
    pub fn push_data_line(&mut self, line: &[u8]) -> DataLine {
        let line = line
            .strip_suffix(b"\n")
            .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
            .unwrap_or(line);

        if line == b"." {
            return self.finish_data();
        }
        if self.oversized {
            return DataLine::More;
        }

        let line = if line.starts_with(b"..") {
            &line[1..]
        } else {
            line
        };

        if self.data.len() + line.len() + 2 > self.limits.max_message_size {
            self.mark_oversized();
            return DataLine::More;
        }
        self.data.extend_from_slice(line);
        self.data.extend_from_slice(b"\r\n");
        DataLine::More
    }

    fn finish_data(&mut self) -> DataLine {
        let oversized = self.oversized;
        let envelope = Envelope {
            from: self.from.take().unwrap_or_default(),
            to: std::mem::take(&mut self.to),
            raw: std::mem::take(&mut self.data),
        };
        self.oversized = false;
        self.state = SessionState::Done;

        if oversized {
            DataLine::TooLarge(
                SmtpError::MessageTooLarge {
                    max: self.limits.max_message_size,
                }
                .reply(),
            )
        } else {
            DataLine::Complete(envelope)
        }
    }

    fn reset_transaction(&mut self) {
        self.from = None;
        self.to.clear();
        self.data = Vec::new();
        self.oversized = false;
        self.state = if self.client_domain.is_some() {
            SessionState::Mail
        } else {
            SessionState::Greet
        };
    }
}
