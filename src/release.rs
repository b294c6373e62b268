//! Release of stored messages to a real SMTP server.
//!
//! A release replays the stored envelope and raw content to an upstream
//! server in a single attempt. The stored message is never changed.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use lettre::address::{Address, Envelope};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::extension::ClientId;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::storage::Message;

/// Release failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    /// The sender or a recipient cannot be used upstream.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The authentication mechanism is not PLAIN or LOGIN.
    #[error("unsupported authentication mechanism '{0}'")]
    UnsupportedMechanism(String),

    /// The upstream server could not be reached or the session broke.
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    /// The upstream server refused the message.
    #[error("rejected by upstream: {0}")]
    Rejected(String),
}

fn default_port() -> u16 {
    25
}

/// An upstream SMTP server messages can be released to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingServer {
    /// Preset name.
    #[serde(default)]
    pub name: String,
    /// Server host.
    pub host: String,
    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username for authentication.
    #[serde(default)]
    pub username: Option<String>,
    /// Password for authentication. Never serialized.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// `PLAIN` or `LOGIN`; PLAIN when unset.
    #[serde(default)]
    pub mechanism: Option<String>,
    /// Sole recipient replacing the stored recipients.
    #[serde(default)]
    pub email: Option<String>,
    /// Whether the target should be kept as a preset.
    #[serde(default)]
    pub save: bool,
}

impl OutgoingServer {
    /// Server at `host:port` without credentials.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            name: String::new(),
            host: host.into(),
            port,
            username: None,
            password: None,
            mechanism: None,
            email: None,
            save: false,
        }
    }

    fn mechanisms(&self) -> Result<Vec<Mechanism>, ForwardError> {
        match self.mechanism.as_deref().map(str::to_ascii_uppercase).as_deref() {
            None | Some("") | Some("PLAIN") => Ok(vec![Mechanism::Plain]),
            Some("LOGIN") => Ok(vec![Mechanism::Login]),
            Some(other) => Err(ForwardError::UnsupportedMechanism(other.to_string())),
        }
    }
}

/// Result of a successful release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseReport {
    /// Upstream `host:port`.
    pub server: String,
    /// Recipients the message was delivered to.
    pub recipients: Vec<String>,
}

/// Named release presets.
#[derive(Debug, Default)]
pub struct OutgoingRegistry {
    servers: RwLock<BTreeMap<String, OutgoingServer>>,
}

impl OutgoingRegistry {
    /// Registry holding the servers from `config`.
    pub fn from_config(config: &Config) -> Self {
        let servers = config
            .outgoing
            .iter()
            .map(|(name, server)| (name.clone(), server.clone()))
            .collect();
        Self {
            servers: RwLock::new(servers),
        }
    }

    /// Look up a preset.
    pub fn get(&self, name: &str) -> Option<OutgoingServer> {
        self.servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All presets, sorted by name.
    pub fn list(&self) -> Vec<OutgoingServer> {
        self.servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Add or replace a preset under its name.
    pub fn insert(&self, server: OutgoingServer) {
        info!(name = %server.name, "Saved outgoing server");
        self.servers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(server.name.clone(), server);
    }
}

/// Sends stored messages to upstream servers.
#[derive(Debug, Clone)]
pub struct Releaser {
    hello_name: String,
    timeout: Duration,
}

impl Releaser {
    /// Create a releaser announcing `hello_name` in EHLO.
    pub fn new(hello_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            hello_name: hello_name.into(),
            timeout,
        }
    }

    /// Releaser configured from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.smtp.hostname.clone(),
            Duration::from_secs(config.release.timeout_secs),
        )
    }

    /// Relay `message` to `target`.
    pub async fn release(
        &self,
        message: &Message,
        target: &OutgoingServer,
    ) -> Result<ReleaseReport, ForwardError> {
        let envelope = envelope_for(message, target)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&target.host)
            .port(target.port)
            .timeout(Some(self.timeout))
            .hello_name(ClientId::Domain(self.hello_name.clone()));
        if let Some(username) = &target.username {
            builder = builder
                .credentials(Credentials::new(
                    username.clone(),
                    target.password.clone().unwrap_or_default(),
                ))
                .authentication(target.mechanisms()?);
        }
        let transport = builder.build();

        // The transport appends CRLF.CRLF itself.
        let body = message
            .raw
            .strip_suffix(b"\r\n")
            .unwrap_or(&message.raw);

        let server = format!("{}:{}", target.host, target.port);
        match transport.send_raw(&envelope, body).await {
            Ok(_) => {
                let recipients: Vec<String> =
                    envelope.to().iter().map(ToString::to_string).collect();
                info!(id = %message.id, server = %server, "Message released");
                Ok(ReleaseReport { server, recipients })
            }
            Err(e) => {
                warn!(id = %message.id, server = %server, "Release failed: {}", e);
                if e.is_permanent() || e.is_transient() {
                    Err(ForwardError::Rejected(e.to_string()))
                } else {
                    Err(ForwardError::Unreachable(e.to_string()))
                }
            }
        }
    }
}

/// Envelope for relaying `message` to `target`.
fn envelope_for(message: &Message, target: &OutgoingServer) -> Result<Envelope, ForwardError> {
    let parse = |addr: &str| {
        addr.parse::<Address>()
            .map_err(|e| ForwardError::InvalidAddress(format!("{addr}: {e}")))
    };

    let from = if message.from.is_empty() {
        None
    } else {
        Some(parse(&message.from)?)
    };

    let to = match target.email.as_deref().filter(|e| !e.is_empty()) {
        Some(email) => vec![parse(email)?],
        None => message
            .to
            .iter()
            .map(|r| parse(r))
            .collect::<Result<Vec<_>, _>>()?,
    };

    Envelope::new(from, to).map_err(|e| ForwardError::InvalidAddress(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(from: &str, to: &[&str]) -> Message {
        Message::new(
            from,
            to.iter().map(|s| s.to_string()).collect(),
            b"Subject: release\r\n\r\nbody\r\n".to_vec(),
        )
    }

    #[test]
    fn test_envelope_uses_stored_recipients() {
        let m = message("a@x.com", &["b@y.com", "c@y.com"]);
        let envelope = envelope_for(&m, &OutgoingServer::new("localhost", 25)).unwrap();

        assert_eq!(envelope.from().map(ToString::to_string).as_deref(), Some("a@x.com"));
        let to: Vec<String> = envelope.to().iter().map(ToString::to_string).collect();
        assert_eq!(to, vec!["b@y.com", "c@y.com"]);
    }

    #[test]
    fn test_envelope_override_recipient() {
        let m = message("a@x.com", &["b@y.com", "c@y.com"]);
        let target = OutgoingServer {
            email: Some("me@real.com".to_string()),
            ..OutgoingServer::new("localhost", 25)
        };
        let envelope = envelope_for(&m, &target).unwrap();

        let to: Vec<String> = envelope.to().iter().map(ToString::to_string).collect();
        assert_eq!(to, vec!["me@real.com"]);
    }

    #[test]
    fn test_envelope_null_sender() {
        let m = message("", &["b@y.com"]);
        let envelope = envelope_for(&m, &OutgoingServer::new("localhost", 25)).unwrap();
        assert!(envelope.from().is_none());
    }

    #[test]
    fn test_envelope_rejects_bare_postmaster() {
        let m = message("a@x.com", &["postmaster"]);
        let result = envelope_for(&m, &OutgoingServer::new("localhost", 25));
        assert!(matches!(result, Err(ForwardError::InvalidAddress(_))));
    }

    #[test]
    fn test_mechanisms() {
        let mut server = OutgoingServer::new("localhost", 25);
        assert_eq!(server.mechanisms().unwrap(), vec![Mechanism::Plain]);
        server.mechanism = Some("login".to_string());
        assert_eq!(server.mechanisms().unwrap(), vec![Mechanism::Login]);
        server.mechanism = Some("CRAM-MD5".to_string());
        assert!(matches!(
            server.mechanisms(),
            Err(ForwardError::UnsupportedMechanism(_))
        ));
    }

    #[test]
    fn test_password_not_serialized() {
        let server = OutgoingServer {
            name: "relay".to_string(),
            username: Some("user".to_string()),
            password: Some("secret".to_string()),
            ..OutgoingServer::new("smtp.example.com", 587)
        };
        let json = serde_json::to_string(&server).unwrap();
        assert!(json.contains("\"username\":\"user\""));
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_registry() {
        let mut config = Config::default();
        config.outgoing.insert(
            "b".to_string(),
            OutgoingServer {
                name: "b".to_string(),
                ..OutgoingServer::new("b.example", 25)
            },
        );
        let registry = OutgoingRegistry::from_config(&config);
        registry.insert(OutgoingServer {
            name: "a".to_string(),
            ..OutgoingServer::new("a.example", 2525)
        });

        let names: Vec<String> = registry.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().port, 2525);
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_release_to_closed_port_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let releaser = Releaser::new("test.local", Duration::from_secs(5));
        let result = releaser
            .release(
                &message("a@x.com", &["b@y.com"]),
                &OutgoingServer::new("127.0.0.1", port),
            )
            .await;
        assert!(matches!(result, Err(ForwardError::Unreachable(_))));
    }
}
