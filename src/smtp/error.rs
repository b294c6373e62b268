//! SMTP protocol errors.

use thiserror::Error;

use super::reply::Reply;

/// Protocol size limits (RFC 5321 section 4.5.3.1).
pub struct SmtpLimits;

impl SmtpLimits {
    /// Maximum length of a local part.
    pub const LOCAL_PART_MAX_LENGTH: usize = 64;
    /// Maximum length of a domain.
    pub const DOMAIN_MAX_LENGTH: usize = 255;
    /// Maximum length of a reverse-path or forward-path.
    pub const PATH_MAX_LENGTH: usize = 256;
    /// Maximum length of a command line including CRLF.
    pub const COMMAND_LINE_MAX_LENGTH: usize = 512;
}

/// A rejected command. The session stays open and its state is unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmtpError {
    #[error("command unrecognized")]
    UnrecognizedCommand,

    #[error("line too long (max {max} bytes)")]
    LineTooLong { max: usize },

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("bad sequence of commands: {0}")]
    BadSequence(String),

    #[error("path too long (max {max} characters)")]
    PathTooLong { max: usize },

    #[error("local part too long (max {max} characters)")]
    LocalPartTooLong { max: usize },

    #[error("domain too long (max {max} characters)")]
    DomainTooLong { max: usize },

    #[error("too many recipients (max {max})")]
    TooManyRecipients { max: usize },

    #[error("message exceeds fixed maximum size of {max} bytes")]
    MessageTooLarge { max: usize },

    #[error("transaction failed: {0}")]
    Rejected(String),

    #[error("local error in processing")]
    StorageFailed,
}

impl SmtpError {
    /// Reply code for this error.
    pub fn code(&self) -> u16 {
        match self {
            SmtpError::UnrecognizedCommand => 500,
            SmtpError::LineTooLong { .. } => 500,
            SmtpError::Syntax(_) => 501,
            SmtpError::BadSequence(_) => 503,
            SmtpError::PathTooLong { .. } => 501,
            SmtpError::LocalPartTooLong { .. } => 501,
            SmtpError::DomainTooLong { .. } => 501,
            SmtpError::TooManyRecipients { .. } => 452,
            SmtpError::MessageTooLarge { .. } => 552,
            SmtpError::Rejected(_) => 550,
            SmtpError::StorageFailed => 451,
        }
    }

    /// Reply sent to the client for this error.
    pub fn reply(&self) -> Reply {
        let text = match self {
            SmtpError::UnrecognizedCommand => "Syntax error, command unrecognized".to_string(),
            SmtpError::LineTooLong { .. } => "Line too long".to_string(),
            other => {
                let text = other.to_string();
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => text,
                }
            }
        };
        Reply::new(self.code(), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(SmtpError::UnrecognizedCommand.code(), 500);
        assert_eq!(SmtpError::LineTooLong { max: 512 }.code(), 500);
        assert_eq!(SmtpError::Syntax("x".into()).code(), 501);
        assert_eq!(SmtpError::BadSequence("x".into()).code(), 503);
        assert_eq!(SmtpError::TooManyRecipients { max: 1 }.code(), 452);
        assert_eq!(SmtpError::MessageTooLarge { max: 1 }.code(), 552);
        assert_eq!(SmtpError::Rejected("x".into()).code(), 550);
        assert_eq!(SmtpError::StorageFailed.code(), 451);
    }

    #[test]
    fn test_reply_text() {
        assert_eq!(
            SmtpError::BadSequence("need MAIL before RCPT".into())
                .reply()
                .format(),
            "503 Bad sequence of commands: need MAIL before RCPT\r\n"
        );
        assert_eq!(
            SmtpError::UnrecognizedCommand.reply().format(),
            "500 Syntax error, command unrecognized\r\n"
        );
    }
}
