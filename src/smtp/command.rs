//! SMTP command parsing.

use super::error::{SmtpError, SmtpLimits};

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo(String),
    Ehlo(String),
    /// Reverse-path (empty for `<>`) and the declared SIZE parameter.
    Mail { from: String, size: Option<usize> },
    Rcpt(String),
    Data,
    Rset,
    Noop,
    Quit,
    Vrfy,
    Help,
}

impl Command {
    /// Parse a command line. Trailing CR/LF is ignored.
    pub fn parse(line: &str) -> Result<Self, SmtpError> {
        if line.len() > SmtpLimits::COMMAND_LINE_MAX_LENGTH {
            return Err(SmtpError::LineTooLong {
                max: SmtpLimits::COMMAND_LINE_MAX_LENGTH,
            });
        }

        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, args) = match line.split_once(' ') {
            Some((verb, args)) => (verb, args.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Ok(Command::Helo(domain_arg("HELO", args)?)),
            "EHLO" => Ok(Command::Ehlo(domain_arg("EHLO", args)?)),
            "MAIL" => parse_mail(args),
            "RCPT" => parse_rcpt(args),
            "DATA" => no_args("DATA", args, Command::Data),
            "RSET" => no_args("RSET", args, Command::Rset),
            "QUIT" => no_args("QUIT", args, Command::Quit),
            "NOOP" => Ok(Command::Noop),
            "VRFY" => Ok(Command::Vrfy),
            "HELP" => Ok(Command::Help),
            _ => Err(SmtpError::UnrecognizedCommand),
        }
    }
}

fn domain_arg(verb: &str, args: &str) -> Result<String, SmtpError> {
    match args.split_whitespace().next() {
        Some(domain) => Ok(domain.to_string()),
        None => Err(SmtpError::Syntax(format!("{verb} requires a domain"))),
    }
}

fn no_args(verb: &str, args: &str, command: Command) -> Result<Command, SmtpError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(SmtpError::Syntax(format!("{verb} takes no arguments")))
    }
}

fn parse_mail(args: &str) -> Result<Command, SmtpError> {
    let rest = strip_keyword(args, "FROM:")
        .ok_or_else(|| SmtpError::Syntax("expected MAIL FROM:<address>".to_string()))?;
    let (path, params) = split_path(rest)?;

    let mut size = None;
    for param in params.split_whitespace() {
        let (key, value) = param.split_once('=').unwrap_or((param, ""));
        if key.eq_ignore_ascii_case("SIZE") {
            size = Some(
                value
                    .parse()
                    .map_err(|_| SmtpError::Syntax(format!("invalid SIZE parameter '{value}'")))?,
            );
        }
    }

    let from = if path.is_empty() {
        String::new()
    } else {
        validate_mailbox(path)?
    };
    Ok(Command::Mail { from, size })
}

fn parse_rcpt(args: &str) -> Result<Command, SmtpError> {
    let rest = strip_keyword(args, "TO:")
        .ok_or_else(|| SmtpError::Syntax("expected RCPT TO:<address>".to_string()))?;
    let (path, _params) = split_path(rest)?;

    if path.eq_ignore_ascii_case("postmaster") {
        return Ok(Command::Rcpt(path.to_string()));
    }
    if path.is_empty() {
        return Err(SmtpError::Syntax("empty forward-path".to_string()));
    }
    Ok(Command::Rcpt(validate_mailbox(path)?))
}

/// Strip a case-insensitive keyword such as `FROM:`, allowing a space after the colon.
fn strip_keyword<'a>(args: &'a str, keyword: &str) -> Option<&'a str> {
    let head = args.get(..keyword.len())?;
    if head.eq_ignore_ascii_case(keyword) {
        Some(args[keyword.len()..].trim_start())
    } else {
        None
    }
}

/// Split `<path> params` into the path inside the brackets and the rest.
fn split_path(rest: &str) -> Result<(&str, &str), SmtpError> {
    let inner = rest
        .strip_prefix('<')
        .ok_or_else(|| SmtpError::Syntax("address must be enclosed in <>".to_string()))?;
    let end = inner
        .find('>')
        .ok_or_else(|| SmtpError::Syntax("address must be enclosed in <>".to_string()))?;

    let path = &inner[..end];
    if path.len() > SmtpLimits::PATH_MAX_LENGTH {
        return Err(SmtpError::PathTooLong {
            max: SmtpLimits::PATH_MAX_LENGTH,
        });
    }
    Ok((path, inner[end + 1..].trim()))
}

/// Validate a mailbox, dropping any source route (`@a,@b:user@host`).
fn validate_mailbox(path: &str) -> Result<String, SmtpError> {
    let mailbox = if path.starts_with('@') {
        path.split_once(':')
            .map(|(_, mailbox)| mailbox)
            .ok_or_else(|| SmtpError::Syntax(format!("invalid source route '{path}'")))?
    } else {
        path
    };

    let (local, domain) = mailbox
        .rsplit_once('@')
        .ok_or_else(|| SmtpError::Syntax(format!("invalid address '{mailbox}'")))?;

    if local.is_empty() || domain.is_empty() || mailbox.chars().any(char::is_whitespace) {
        return Err(SmtpError::Syntax(format!("invalid address '{mailbox}'")));
    }
    if local.len() > SmtpLimits::LOCAL_PART_MAX_LENGTH {
        return Err(SmtpError::LocalPartTooLong {
            max: SmtpLimits::LOCAL_PART_MAX_LENGTH,
        });
    }
    if domain.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
        return Err(SmtpError::DomainTooLong {
            max: SmtpLimits::DOMAIN_MAX_LENGTH,
        });
    }
    Ok(mailbox.to_string())
}
